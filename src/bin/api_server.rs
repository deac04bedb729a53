// HTTP API server binary: exposes the five pipeline commands over REST.

use anyhow::Result;
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

#[actix_web::main]
async fn main() -> Result<()> {
    catalog_reconciler::env_boot::ensure_dotenv();
    catalog_reconciler::telemetry::init_tracing("info,sqlx=warn")?;

    tracing::info!("initializing catalog-reconciler API server");

    let server = ApiServer::from_env()?;
    let config = PipelineConfig::from_env()?;

    let db = Db::connect_no_migrate(&config.database_url, config.max_db_connections).await?;
    tracing::info!("database connected successfully");

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

    server.run(db, runner).await?;

    Ok(())
}
