//! `game_details` upsert. Only created for non-DLC games whose popularity
//! clears the detail-worthy threshold — low-popularity long-tail catalog
//! entries get a `games` row but no detail record.

use crate::contracts::ProcessedGame;
use sqlx::{Postgres, Transaction};

pub const DETAIL_POPULARITY_THRESHOLD: f64 = 40.0;

/// `is_dlc` is the persisted row's classification (post find-or-create),
/// not just this candidate's own signal — once a game is known to be DLC
/// from either source, details/releases are skipped on every subsequent
/// ingest (spec §4.6 step 3).
pub fn should_persist_detail(is_dlc: bool, candidate: &ProcessedGame) -> bool {
    !is_dlc && candidate.popularity.unwrap_or(0.0) >= DETAIL_POPULARITY_THRESHOLD
}

pub async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    candidate: &ProcessedGame,
) -> Result<(), sqlx::Error> {
    let Some(detail) = &candidate.detail else {
        return Ok(());
    };
    let screenshots = serde_json::Value::Array(
        detail
            .screenshots
            .iter()
            .map(|url| serde_json::Value::String(url.clone()))
            .collect(),
    );
    sqlx::query(
        "INSERT INTO game_details (
            game_id, synopsis, cover_url, header_image, website, video_url,
            screenshots, genres, tags, support_languages, metacritic,
            opencritic, reviews_summary, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
         ON CONFLICT (game_id) DO UPDATE SET
            synopsis = COALESCE(EXCLUDED.synopsis, game_details.synopsis),
            cover_url = COALESCE(EXCLUDED.cover_url, game_details.cover_url),
            header_image = COALESCE(EXCLUDED.header_image, game_details.header_image),
            website = COALESCE(EXCLUDED.website, game_details.website),
            video_url = COALESCE(EXCLUDED.video_url, game_details.video_url),
            screenshots = COALESCE(NULLIF(EXCLUDED.screenshots, '[]'::jsonb), game_details.screenshots),
            genres = COALESCE(NULLIF(EXCLUDED.genres, '{}'), game_details.genres),
            tags = COALESCE(NULLIF(EXCLUDED.tags, '{}'), game_details.tags),
            support_languages = COALESCE(NULLIF(EXCLUDED.support_languages, '{}'), game_details.support_languages),
            metacritic = COALESCE(EXCLUDED.metacritic, game_details.metacritic),
            opencritic = COALESCE(EXCLUDED.opencritic, game_details.opencritic),
            reviews_summary = COALESCE(EXCLUDED.reviews_summary, game_details.reviews_summary),
            updated_at = now()",
    )
    .bind(game_id)
    .bind(&detail.synopsis)
    .bind(&detail.cover_url)
    .bind(&detail.header_image)
    .bind(&detail.website)
    .bind(&detail.video_url)
    .bind(screenshots)
    .bind(&detail.genres)
    .bind(&detail.tags)
    .bind(&detail.support_languages)
    .bind(detail.metacritic)
    .bind(detail.opencritic)
    .bind(&detail.reviews_summary)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
