//! `pipeline_runs` / `pipeline_items` bookkeeping. Run rows are
//! best-effort (logged, not fatal, on failure); item rows are written
//! inside the same transaction as the record they describe so they never
//! diverge from what was actually persisted.

use crate::contracts::{ExternalId, PipelineItemOutcome, RunState, Source};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

pub struct RunRegistry {
    pool: PgPool,
}

impl RunRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_run(&self, command: &str) -> Uuid {
        let run_id = Uuid::new_v4();
        if let Err(err) = sqlx::query(
            "INSERT INTO pipeline_runs (id, command, state, started_at, items_seen, items_saved, items_failed)
             VALUES ($1, $2, 'preparing', now(), 0, 0, 0)",
        )
        .bind(run_id)
        .bind(command)
        .execute(&self.pool)
        .await
        {
            warn!(%err, "failed to record pipeline run start");
        }
        run_id
    }

    pub async fn transition(&self, run_id: Uuid, state: RunState) {
        let state_str = match state {
            RunState::Preparing => "preparing",
            RunState::Fetching => "fetching",
            RunState::Persisting => "persisting",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        if let Err(err) = sqlx::query("UPDATE pipeline_runs SET state = $1 WHERE id = $2")
            .bind(state_str)
            .bind(run_id)
            .execute(&self.pool)
            .await
        {
            warn!(%err, state = state_str, "failed to transition pipeline run state");
        }
    }

    pub async fn finalize_run(&self, run_id: Uuid, state: RunState, seen: i64, saved: i64, failed: i64) {
        let state_str = match state {
            RunState::Completed => "completed",
            _ => "failed",
        };
        if let Err(err) = sqlx::query(
            "UPDATE pipeline_runs
             SET state = $1, finished_at = now(), items_seen = $2, items_saved = $3, items_failed = $4
             WHERE id = $5",
        )
        .bind(state_str)
        .bind(seen)
        .bind(saved)
        .bind(failed)
        .bind(run_id)
        .execute(&self.pool)
        .await
        {
            warn!(%err, "failed to finalize pipeline run");
        }
    }

    /// Record one item's outcome inside the caller's transaction so it
    /// commits atomically with the `games` write (or rolls back with it).
    pub async fn record_item_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        run_id: Uuid,
        source: Source,
        external_id: &ExternalId,
        outcome: PipelineItemOutcome,
        game_id: Option<i64>,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let outcome_str = match outcome {
            PipelineItemOutcome::Saved => "saved",
            PipelineItemOutcome::Pending => "pending",
            PipelineItemOutcome::Rejected => "rejected",
            PipelineItemOutcome::Failed => "failed",
        };
        sqlx::query(
            "INSERT INTO pipeline_items (run_id, source, external_id, outcome, game_id, detail, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())",
        )
        .bind(run_id)
        .bind(source.as_str())
        .bind(&external_id.0)
        .bind(outcome_str)
        .bind(game_id)
        .bind(detail)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
