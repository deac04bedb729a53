//! Admin CLI: runs exactly one pipeline command to completion, then exits.
//! Grounded on the teacher's `gc.rs` entry point, trimmed from its ~40
//! provider-specific subcommands down to the five generic pipeline
//! commands `catalog_reconciler::command::Command` exposes.

use anyhow::{Context, Result};
use catalog_reconciler::batch_runner::BatchRunner;
use catalog_reconciler::cli::Cli;
use catalog_reconciler::config::PipelineConfig;
use catalog_reconciler::persistence::PersistenceOrchestrator;
use catalog_reconciler::rate_limiter::{FixedWindowLimiter, MinDelaySpacer};
use catalog_reconciler::run_registry::RunRegistry;
use catalog_reconciler::source::meta::MetaClient;
use catalog_reconciler::source::store::StoreClient;
use catalog_reconciler::source::SourceClient;
use catalog_reconciler::util::db::Db;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    catalog_reconciler::env_boot::ensure_dotenv();
    catalog_reconciler::telemetry::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let config = PipelineConfig::from_env().context("loading pipeline configuration")?;

    let db = Db::connect_no_migrate(&config.database_url, config.max_db_connections)
        .await
        .context("connecting to database")?;

    let store_limiter = FixedWindowLimiter::new(
        "store",
        config.store_rate_limit_n,
        config.store_window(),
    );
    let store_client: Arc<dyn SourceClient> =
        Arc::new(StoreClient::new(config.store_base_url.clone(), store_limiter));

    let meta_spacer = MinDelaySpacer::new(config.meta_min_delay());
    let meta_client: Arc<dyn SourceClient> = Arc::new(MetaClient::new(
        config.meta_base_url.clone(),
        config.meta_api_key.clone(),
        meta_spacer,
    ));

    let persistence = Arc::new(PersistenceOrchestrator::new(db.pool.clone()));
    let run_registry = Arc::new(RunRegistry::new(db.pool.clone()));

    let runner = BatchRunner::new(
        db.pool.clone(),
        store_client,
        meta_client,
        persistence,
        run_registry,
        config.log_base_dir.clone(),
        config.batch_concurrency,
        config.fetch_batch_size,
        config.save_batch_size,
    );

    let dry_run = cli.dry_run;
    let command = cli.command.into_command();
    info!(command = command.label(), dry_run, "running pipeline command");

    let outcome = runner
        .run(command, CancellationToken::new(), dry_run)
        .await?;

    info!(
        run_id = %outcome.run_id,
        state = ?outcome.final_state,
        seen = outcome.items_seen,
        saved = outcome.items_saved,
        failed = outcome.items_failed,
        report = ?outcome.report_path,
        "run finished"
    );

    if outcome.items_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
