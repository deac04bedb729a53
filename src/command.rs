//! The five operator-facing pipeline commands and their outcomes.

use crate::contracts::{ExternalId, RunState, Source};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Which field an operator-supplied id on [`Command::Single`] refers to.
/// Distinct from `sources`, which picks which upstream(s) to actually call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    StoreAppId,
    MetaId,
}

/// How a catalog-wide command should decide its working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Only rows the selector judges stale/incomplete.
    Incremental,
    /// Every row, regardless of freshness.
    Full,
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Refresh up to `limit` rows the candidate selector judges due for a
    /// recheck (still `coming_soon` or releasing soon).
    RefreshWindow { limit: u32 },
    /// Ingest Store ids not yet present in the catalog.
    IngestNew { mode: RunMode, limit: Option<u32> },
    /// Process exactly one external id, against one or more sources.
    Single {
        id_kind: IdKind,
        external_id: ExternalId,
        sources: Vec<Source>,
    },
    /// Walk the entire upstream catalog, paginated.
    FullRefresh { mode: RunMode, page_size: u32 },
    /// Backfill `game_details`/`game_releases` for games missing one.
    BackfillDetails { limit: u32, concurrency: usize },
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::RefreshWindow { .. } => "refresh-window",
            Command::IngestNew { .. } => "ingest-new",
            Command::Single { .. } => "single",
            Command::FullRefresh { .. } => "full-refresh",
            Command::BackfillDetails { .. } => "backfill-details",
        }
    }

    /// Per-run worker concurrency override, if this command carries one.
    pub fn concurrency_override(&self) -> Option<usize> {
        match self {
            Command::BackfillDetails { concurrency, .. } => Some(*concurrency),
            _ => None,
        }
    }
}

/// One failed item, surfaced on [`CommandOutcome`] for callers who don't want
/// to go read the JSONL report for a quick summary.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub source: Source,
    pub external_id: String,
    pub reason: String,
}

/// Inline failures are capped; the full list always lives in the run's
/// failure-detail report (`ReportWriter`).
pub const MAX_INLINE_FAILURES: usize = 50;

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub run_id: Uuid,
    pub final_state: RunState,
    pub items_seen: i64,
    pub items_saved: i64,
    pub items_created: i64,
    pub items_updated: i64,
    pub items_failed: i64,
    pub failures: Vec<CommandFailure>,
    pub report_path: Option<std::path::PathBuf>,
    pub finished_at: DateTime<Utc>,
}
