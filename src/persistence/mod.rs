//! Transactional upsert of one normalized candidate into `games` /
//! `game_details` / `game_releases` / `companies` / `game_company_roles`.
//!
//! One read-committed transaction per record, grounded on the teacher's
//! `ensure_*` find-or-create family in `ingest_providers.rs` and its
//! 23505/40001 retry idiom. A failure on one record never rolls back
//! sibling records in the same batch — each call opens and commits its
//! own transaction.

pub mod companies;
pub mod details;
pub mod failure;
pub mod games;
pub mod merge;
pub mod releases;

use crate::contracts::{Game, ProcessedGame};
use crate::slug_policy::{resolve_unique_slug, SlugExists};
use failure::{is_deadlock, SaveFailureReason};
use sqlx::PgPool;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(i64),
    Updated(i64),
    /// The matching engine flagged this candidate for manual review
    /// (§4.4 `pending`); nothing was written to `games`.
    Deferred,
}

/// What `save_one` should do with a candidate, decided by the caller
/// (`batch_runner`) from the matching engine's verdict and the direct
/// identifier/slug lookup — distinct from `MatchingVerdict` because a
/// `Reject` verdict against one candidate game still means "create a new
/// row", not "skip" (spec §4.4/§8 scenario 1: a rejected sequel still gets
/// its own `games` row).
#[derive(Debug, Clone, Copy)]
pub enum SaveDecision {
    /// No existing row matches this candidate at all: insert fresh.
    Create,
    /// Link/update the existing row with this id (direct identifier match,
    /// or the matching engine's `auto` verdict).
    Link(i64),
    /// Matching engine verdict was `pending`: defer to manual review.
    Defer,
}

const MAX_DEADLOCK_RETRIES: u32 = 2;

pub struct PersistenceOrchestrator {
    pool: PgPool,
}

/// Checks slug uniqueness against one of `games`' two independently unique
/// slug columns (spec §4.5: slug and original_slug are resolved
/// independently, each globally unique).
struct PoolSlugCheck<'a> {
    pool: &'a PgPool,
    column: &'static str,
}

#[async_trait::async_trait]
impl<'a> SlugExists for PoolSlugCheck<'a> {
    async fn slug_taken(&self, candidate: &str) -> anyhow::Result<bool> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM games WHERE {} = $1)", self.column);
        let exists: bool = sqlx::query_scalar(&query)
            .bind(candidate)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }
}

impl PersistenceOrchestrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Save one candidate per the caller's `SaveDecision`. `Defer` never
    /// touches `games` — the caller records it for manual review instead.
    #[instrument(skip(self, candidate))]
    pub async fn save_one(
        &self,
        candidate: &ProcessedGame,
        decision: SaveDecision,
    ) -> Result<SaveOutcome, SaveFailureReason> {
        let matched_game_id = match decision {
            SaveDecision::Defer => return Ok(SaveOutcome::Deferred),
            SaveDecision::Create => None,
            SaveDecision::Link(id) => Some(id),
        };

        let mut attempt = 0;
        loop {
            match self.save_one_inner(candidate, matched_game_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(sqlx::Error::Database(db_err)) if attempt < MAX_DEADLOCK_RETRIES => {
                    let sqlx_err = sqlx::Error::Database(db_err);
                    if is_deadlock(&sqlx_err) {
                        attempt += 1;
                        tracing::warn!(attempt, "deadlock detected, retrying save");
                        continue;
                    }
                    return Err(SaveFailureReason::from_sqlx(&sqlx_err));
                }
                Err(e) => return Err(SaveFailureReason::from_sqlx(&e)),
            }
        }
    }

    async fn save_one_inner(
        &self,
        candidate: &ProcessedGame,
        matched_game_id: Option<i64>,
    ) -> Result<SaveOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<Game> = if let Some(id) = matched_game_id {
            sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
        } else {
            games::find_for_candidate(&mut tx, candidate).await?
        };

        let is_new = existing.is_none();
        let game = match existing {
            Some(existing) => games::patch(&mut tx, &existing, candidate).await?,
            None => {
                let slug = {
                    let checker = PoolSlugCheck { pool: &self.pool, column: "slug" };
                    resolve_unique_slug(&candidate.slug_candidate, &checker)
                        .await
                        .unwrap_or_else(|_| candidate.slug_candidate.clone())
                };
                // Resolved independently of `slug` per §4.5 — each must be
                // globally unique, but they may legitimately coincide.
                let original_slug = {
                    let checker = PoolSlugCheck { pool: &self.pool, column: "original_slug" };
                    resolve_unique_slug(&candidate.original_slug_candidate, &checker)
                        .await
                        .unwrap_or_else(|_| candidate.original_slug_candidate.clone())
                };
                games::insert(&mut tx, &slug, &original_slug, candidate).await?
            }
        };

        // DLC rows never get a details or releases entry, regardless of
        // which side first observed the game_type (spec §4.6 step 3).
        if !game.is_dlc {
            releases::upsert(&mut tx, game.id, candidate).await?;
            if details::should_persist_detail(game.is_dlc, candidate) {
                details::upsert(&mut tx, game.id, candidate).await?;
            }
        }
        companies::ensure_companies_for_candidate(&mut tx, game.id, &candidate.companies).await?;

        tx.commit().await?;

        Ok(if is_new {
            SaveOutcome::Created(game.id)
        } else {
            SaveOutcome::Updated(game.id)
        })
    }

    /// Batch entry point: save every candidate independently. A failure on
    /// one item never aborts the others (they're separate transactions).
    pub async fn save_many(
        &self,
        items: Vec<(ProcessedGame, SaveDecision)>,
    ) -> Vec<Result<SaveOutcome, SaveFailureReason>> {
        let mut out = Vec::with_capacity(items.len());
        for (candidate, decision) in items {
            out.push(self.save_one(&candidate, decision).await);
        }
        out
    }
}

