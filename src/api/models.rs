// API request/response models (DTOs)

use crate::contracts::{RunState, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// `POST /api/v1/ingest/refresh-window` body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshWindowRequest {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /api/v1/ingest/ingest-new` body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IngestNewRequest {
    #[serde(default)]
    pub mode: Option<RunModeArg>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /api/v1/ingest/single` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct SingleRequest {
    pub id_kind: IdKindArg,
    pub external_id: String,
    /// Sources to call; defaults to both when omitted/empty.
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /api/v1/ingest/full-refresh` body. `page_size` falls back to the
/// runner's configured default when omitted.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FullRefreshRequest {
    #[serde(default)]
    pub mode: Option<RunModeArg>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
}

/// `POST /api/v1/ingest/backfill-details` body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackfillDetailsRequest {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Wire-level mirror of `command::RunMode` for API requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunModeArg {
    Incremental,
    Full,
}

impl From<RunModeArg> for crate::command::RunMode {
    fn from(value: RunModeArg) -> Self {
        match value {
            RunModeArg::Incremental => crate::command::RunMode::Incremental,
            RunModeArg::Full => crate::command::RunMode::Full,
        }
    }
}

/// Wire-level mirror of `command::IdKind` for API requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKindArg {
    StoreAppId,
    MetaId,
}

impl From<IdKindArg> for crate::command::IdKind {
    fn from(value: IdKindArg) -> Self {
        match value {
            IdKindArg::StoreAppId => crate::command::IdKind::StoreAppId,
            IdKindArg::MetaId => crate::command::IdKind::MetaId,
        }
    }
}

/// Returned immediately once a command has been accepted; the run itself
/// keeps going on a background task and is tracked via `/ingest/runs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestTriggeredResponse {
    pub command: String,
    pub status: String,
}

/// One row of `pipeline_runs`, as surfaced over the API.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunSummary {
    pub id: Uuid,
    pub command: String,
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_seen: i64,
    pub items_saved: i64,
    pub items_failed: i64,
}

pub fn run_state_label(state: RunState) -> &'static str {
    match state {
        RunState::Preparing => "preparing",
        RunState::Fetching => "fetching",
        RunState::Persisting => "persisting",
        RunState::Finalizing => "finalizing",
        RunState::Completed => "completed",
        RunState::Failed => "failed",
    }
}

/// Error details for debugging
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
