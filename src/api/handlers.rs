// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::api::server::AppState;
use crate::command::{Command, IdKind, RunMode};
use crate::contracts::{ExternalId, Source};
use actix_web::{web, HttpResponse, Result};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_REFRESH_WINDOW_LIMIT: u32 = 500;
const DEFAULT_FULL_REFRESH_PAGE_SIZE: u32 = 500;
const DEFAULT_BACKFILL_LIMIT: u32 = 200;
const DEFAULT_BACKFILL_CONCURRENCY: usize = 4;

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    // Quick database connectivity check
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&state.db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Spawn a command on a detached task. The caller gets back an immediate
/// 202; the run's actual progress is tracked via `pipeline_runs` and
/// surfaced through `/ingest/runs`.
fn spawn_command(state: &AppState, command: Command, dry_run: bool) -> HttpResponse {
    let label = command.label().to_string();
    let runner = state.runner.clone();
    tokio::spawn(async move {
        if let Err(err) = runner.run(command, CancellationToken::new(), dry_run).await {
            tracing::error!(%err, "pipeline run failed");
        }
    });

    let response = ApiResponse::success(IngestTriggeredResponse {
        command: label,
        status: "queued".to_string(),
    });
    HttpResponse::Accepted().json(response)
}

/// Trigger `Command::RefreshWindow`
pub async fn refresh_window(
    state: web::Data<AppState>,
    payload: web::Json<RefreshWindowRequest>,
) -> Result<HttpResponse> {
    let limit = payload.limit.unwrap_or(DEFAULT_REFRESH_WINDOW_LIMIT);
    tracing::info!(limit, dry_run = payload.dry_run, "refresh-window requested");
    Ok(spawn_command(
        &state,
        Command::RefreshWindow { limit },
        payload.dry_run,
    ))
}

/// Trigger `Command::IngestNew`
pub async fn ingest_new(
    state: web::Data<AppState>,
    payload: web::Json<IngestNewRequest>,
) -> Result<HttpResponse> {
    let mode: RunMode = payload.mode.unwrap_or(RunModeArg::Incremental).into();
    tracing::info!(?mode, limit = ?payload.limit, dry_run = payload.dry_run, "ingest-new requested");
    Ok(spawn_command(
        &state,
        Command::IngestNew {
            mode,
            limit: payload.limit,
        },
        payload.dry_run,
    ))
}

/// Trigger `Command::Single`
pub async fn ingest_single(
    state: web::Data<AppState>,
    payload: web::Json<SingleRequest>,
) -> Result<HttpResponse> {
    let id_kind: IdKind = payload.id_kind.into();
    let sources = if payload.sources.is_empty() {
        vec![Source::Store, Source::Meta]
    } else {
        payload.sources.clone()
    };
    tracing::info!(?id_kind, external_id = %payload.external_id, ?sources, dry_run = payload.dry_run, "single requested");
    Ok(spawn_command(
        &state,
        Command::Single {
            id_kind,
            external_id: ExternalId(payload.external_id.clone()),
            sources,
        },
        payload.dry_run,
    ))
}

/// Trigger `Command::FullRefresh`
pub async fn full_refresh(
    state: web::Data<AppState>,
    payload: web::Json<FullRefreshRequest>,
) -> Result<HttpResponse> {
    let mode: RunMode = payload.mode.unwrap_or(RunModeArg::Incremental).into();
    let page_size = payload.page_size.unwrap_or(DEFAULT_FULL_REFRESH_PAGE_SIZE);
    tracing::info!(?mode, page_size, dry_run = payload.dry_run, "full-refresh requested");
    Ok(spawn_command(
        &state,
        Command::FullRefresh { mode, page_size },
        payload.dry_run,
    ))
}

/// Trigger `Command::BackfillDetails`
pub async fn backfill_details(
    state: web::Data<AppState>,
    payload: web::Json<BackfillDetailsRequest>,
) -> Result<HttpResponse> {
    let limit = payload.limit.unwrap_or(DEFAULT_BACKFILL_LIMIT);
    let concurrency = payload.concurrency.unwrap_or(DEFAULT_BACKFILL_CONCURRENCY);
    tracing::info!(limit, concurrency, dry_run = payload.dry_run, "backfill-details requested");
    Ok(spawn_command(
        &state,
        Command::BackfillDetails { limit, concurrency },
        payload.dry_run,
    ))
}

/// Most recent pipeline runs, newest first.
pub async fn list_runs(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows: Vec<RunSummary> = sqlx::query_as(
        "SELECT id, command, state, started_at, finished_at, items_seen, items_saved, items_failed
         FROM pipeline_runs ORDER BY started_at DESC LIMIT 50",
    )
    .fetch_all(&state.db.pool)
    .await
    .unwrap_or_default();

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_run(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let row: Option<RunSummary> = sqlx::query_as(
        "SELECT id, command, state, started_at, finished_at, items_seen, items_saved, items_failed
         FROM pipeline_runs WHERE id = $1",
    )
    .bind(run_id)
    .fetch_optional(&state.db.pool)
    .await
    .unwrap_or(None);

    match row {
        Some(run) => Ok(HttpResponse::Ok().json(ApiResponse::success(run))),
        None => Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error("run not found"))),
    }
}
