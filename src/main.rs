//! Long-running ingestion service: ticks `Command::RefreshWindow` on a
//! fixed interval and, optionally, serves the same command surface over
//! HTTP. Grounded on the teacher's `main.rs` autostart/ticker/shutdown
//! wiring (drift-free `tokio::time::interval`, `Arc<Notify>`/ctrl-c
//! shutdown), generalized from its PS-Store-specific tick to the
//! source-agnostic `BatchRunner`.

use anyhow::{Context, Result};
use catalog_reconciler::api::ApiServer;
use catalog_reconciler::batch_runner::BatchRunner;
use catalog_reconciler::config::PipelineConfig;
use catalog_reconciler::persistence::PersistenceOrchestrator;
use catalog_reconciler::rate_limiter::{FixedWindowLimiter, MinDelaySpacer};
use catalog_reconciler::run_registry::RunRegistry;
use catalog_reconciler::source::meta::MetaClient;
use catalog_reconciler::source::store::StoreClient;
use catalog_reconciler::source::SourceClient;
use catalog_reconciler::util::db::Db;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    catalog_reconciler::env_boot::ensure_dotenv();
    catalog_reconciler::telemetry::init_tracing("info,sqlx=warn")?;

    let config = PipelineConfig::from_env().context("loading pipeline configuration")?;

    // Long-running service: never auto-migrate on startup (run `gc` or a
    // migration tool against the schema ahead of time).
    let db = Db::connect_no_migrate(&config.database_url, config.max_db_connections)
        .await
        .context("Db::connect_no_migrate failed")?;
    info!(max_conns = config.max_db_connections, "database connected");

    let cancel = CancellationToken::new();

    let store_limiter = FixedWindowLimiter::new(
        "store",
        config.store_rate_limit_n,
        config.store_window(),
    );
    let store_client: Arc<dyn SourceClient> = Arc::new(StoreClient::with_cancel(
        config.store_base_url.clone(),
        store_limiter,
        cancel.clone(),
    ));

    let meta_spacer = MinDelaySpacer::new(config.meta_min_delay());
    let meta_client: Arc<dyn SourceClient> = Arc::new(MetaClient::with_cancel(
        config.meta_base_url.clone(),
        config.meta_api_key.clone(),
        meta_spacer,
        cancel.clone(),
    ));

    let persistence = Arc::new(PersistenceOrchestrator::new(db.pool.clone()));
    let run_registry = Arc::new(RunRegistry::new(db.pool.clone()));

    let runner = Arc::new(BatchRunner::new(
        db.pool.clone(),
        store_client,
        meta_client,
        persistence,
        run_registry,
        config.log_base_dir.clone(),
        config.batch_concurrency,
        config.fetch_batch_size,
        config.save_batch_size,
    ));

    let mut tasks = JoinSet::new();

    // Optional HTTP surface, same command set, for operators who'd rather
    // trigger runs from a scheduler than cron this binary directly.
    if std::env::var("API_SECRET").is_ok() {
        let db_for_api = db.clone();
        let runner_for_api = runner.clone();
        tasks.spawn(async move {
            match ApiServer::from_env() {
                Ok(server) => {
                    if let Err(err) = server.run(db_for_api, runner_for_api).await {
                        error!(%err, "API server exited with an error");
                    }
                }
                Err(err) => warn!(%err, "API_SECRET set but server config invalid; HTTP surface disabled"),
            }
        });
    } else {
        info!("API_SECRET not set; HTTP surface disabled, running scheduler only");
    }

    // Drift-free refresh-window ticker.
    let tick_secs = env_u64("PIPELINE_REFRESH_INTERVAL_SECS", 300);
    let refresh_limit = env_u64("PIPELINE_REFRESH_LIMIT", 500) as u32;
    {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(tick_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let command = catalog_reconciler::command::Command::RefreshWindow {
                    limit: refresh_limit,
                };
                match runner.run(command, cancel.child_token(), false).await {
                    Ok(outcome) => info!(
                        run_id = %outcome.run_id,
                        seen = outcome.items_seen,
                        saved = outcome.items_saved,
                        failed = outcome.items_failed,
                        "scheduled refresh-window tick complete"
                    ),
                    Err(err) => error!(%err, "scheduled refresh-window tick failed"),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");
    cancel.cancel();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    Ok(())
}
