//! Chooses which external ids a run should process. Four shapes, matching
//! the command surface: a recency window, brand-new Store ids not yet
//! seen, a full paginated sweep, and games missing a detail record.

use crate::contracts::ExternalId;
use crate::exclusion_bitmap::ExclusionBitmap;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub enum Candidates {
    RefreshWindow { limit: u32 },
    NewStoreIds { known: Vec<ExternalId> },
    FullRefresh { page_size: u32 },
    BackfillMissingDetails { limit: u32 },
}

pub struct CandidateSelector<'a> {
    pool: &'a PgPool,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn select(&self, request: Candidates) -> Result<Vec<ExternalId>, sqlx::Error> {
        match request {
            Candidates::RefreshWindow { limit } => self.refresh_window(limit).await,
            Candidates::NewStoreIds { known } => self.new_store_ids(known).await,
            Candidates::FullRefresh { page_size } => self.full_refresh(page_size).await,
            Candidates::BackfillMissingDetails { limit } => {
                self.backfill_missing_details(limit).await
            }
        }
    }

    /// Rows worth re-fetching: still `coming_soon`, or releasing within
    /// [-7d, +90d] of now, least-recently-refreshed first, most popular as
    /// the tiebreak, capped at the caller-supplied `limit` (spec §4.7). No
    /// `updated_at` filter: the window is defined purely by release-date
    /// proximity, not by when the row last changed.
    async fn refresh_window(&self, limit: u32) -> Result<Vec<ExternalId>, sqlx::Error> {
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT store_id, meta_id FROM games
             WHERE coming_soon = true
                OR release_date BETWEEN (now() - interval '7 days')::date
                                     AND (now() + interval '90 days')::date
             ORDER BY steam_last_refresh_at ASC NULLS FIRST, popularity DESC NULLS LAST
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(store_id, meta_id)| store_id.or(meta_id))
            .map(ExternalId)
            .collect())
    }

    /// Candidate Store ids the catalog has never seen, with previously
    /// confirmed excluded products filtered out so we don't keep refetching
    /// known soundtracks/SDKs forever.
    async fn new_store_ids(&self, all_known_upstream: Vec<ExternalId>) -> Result<Vec<ExternalId>, sqlx::Error> {
        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT store_id FROM games WHERE store_id IS NOT NULL")
                .fetch_all(self.pool)
                .await?;
        let existing_set: std::collections::HashSet<String> =
            existing.into_iter().map(|(id,)| id).collect();

        let bitmap = ExclusionBitmap::load(self.pool).await?;
        let mut candidate_ids: Vec<String> = all_known_upstream
            .into_iter()
            .map(|id| id.0)
            .filter(|id| !existing_set.contains(id))
            .collect();
        // Descending numeric id order (spec §4.7): newest upstream releases
        // typically carry the highest Store app ids.
        candidate_ids.sort_by(|a, b| {
            match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(a), Ok(b)) => b.cmp(&a),
                _ => b.cmp(a),
            }
        });
        Ok(bitmap
            .subtract(candidate_ids)
            .into_iter()
            .map(ExternalId)
            .collect())
    }

    async fn full_refresh(&self, page_size: u32) -> Result<Vec<ExternalId>, sqlx::Error> {
        let mut out = Vec::new();
        let mut after_id = 0i64;
        loop {
            let rows: Vec<(i64, Option<String>, Option<String>)> = sqlx::query_as(
                "SELECT id, store_id, meta_id FROM games WHERE id > $1 ORDER BY id LIMIT $2",
            )
            .bind(after_id)
            .bind(page_size as i64)
            .fetch_all(self.pool)
            .await?;
            if rows.is_empty() {
                break;
            }
            after_id = rows.last().map(|(id, _, _)| *id).unwrap_or(after_id);
            out.extend(
                rows.into_iter()
                    .filter_map(|(_, store_id, meta_id)| store_id.or(meta_id))
                    .map(ExternalId),
            );
        }
        Ok(out)
    }

    /// Popularity >= 40, not DLC, and missing either a detail row or a
    /// release row (spec §4.7).
    async fn backfill_missing_details(&self, limit: u32) -> Result<Vec<ExternalId>, sqlx::Error> {
        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT g.store_id, g.meta_id FROM games g
             LEFT JOIN game_details d ON d.game_id = g.id
             LEFT JOIN game_releases r ON r.game_id = g.id
             WHERE (d.game_id IS NULL OR r.game_id IS NULL)
               AND g.game_type = 'game'
               AND g.popularity >= 40
             GROUP BY g.id
             ORDER BY g.popularity DESC NULLS LAST
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(store_id, meta_id)| store_id.or(meta_id))
            .map(ExternalId)
            .collect())
    }
}
