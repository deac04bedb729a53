//! Typed view over the pipeline's environment configuration, built from
//! `util::env`'s getters so secrets stay masked wherever config gets
//! logged (`preflight_check`).

use crate::util::env::{env_opt, env_parse, preflight_check};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub max_db_connections: u32,

    pub store_base_url: String,
    pub store_rate_limit_n: u32,
    pub store_rate_limit_window_ms: u64,

    pub meta_base_url: String,
    pub meta_api_key: Option<String>,
    pub meta_rate_limit_n: u32,
    pub meta_rate_limit_window_ms: u64,

    pub batch_concurrency: usize,
    pub fetch_batch_size: usize,
    pub save_batch_size: usize,
    pub detail_popularity_threshold: f64,
    pub log_base_dir: String,
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        crate::util::env::init_env();
        preflight_check(
            "pipeline",
            &[],
            &[
                "DATABASE_URL",
                "STORE_BASE_URL",
                "META_BASE_URL",
                "META_API_KEY",
                "BATCH_CONCURRENCY",
            ],
        )?;

        let database_url = crate::util::env::db_url_prefer_session()?;

        Ok(Self {
            database_url,
            max_db_connections: env_parse("PIPELINE_MAX_DB_CONNECTIONS", 10),
            store_base_url: env_opt("STORE_BASE_URL")
                .unwrap_or_else(|| "https://store.example.com/api".to_string()),
            store_rate_limit_n: env_parse("STORE_RATE_LIMIT_N", 200),
            store_rate_limit_window_ms: env_parse("STORE_RATE_LIMIT_WINDOW_MS", 310_000),
            meta_base_url: env_opt("META_BASE_URL")
                .unwrap_or_else(|| "https://meta.example.com/api".to_string()),
            meta_api_key: env_opt("META_API_KEY"),
            meta_rate_limit_n: env_parse("META_RATE_LIMIT_N", 1),
            meta_rate_limit_window_ms: env_parse("META_RATE_LIMIT_WINDOW_MS", 1_000),
            batch_concurrency: env_parse("BATCH_CONCURRENCY", 4),
            fetch_batch_size: env_parse("FETCH_BATCH_SIZE", 50),
            save_batch_size: env_parse("SAVE_BATCH_SIZE", 25),
            detail_popularity_threshold: env_parse("PIPELINE_DETAIL_POPULARITY_THRESHOLD", 40.0),
            log_base_dir: env_opt("LOG_BASE_DIR").unwrap_or_else(|| "exports/runs".to_string()),
        })
    }

    pub fn store_window(&self) -> Duration {
        Duration::from_millis(self.store_rate_limit_window_ms)
    }

    /// `MinDelaySpacer`'s minimum gap, derived from Meta's own N-per-window
    /// vocabulary: one call every `window / n`.
    pub fn meta_min_delay(&self) -> Duration {
        let n = self.meta_rate_limit_n.max(1) as u64;
        Duration::from_millis(self.meta_rate_limit_window_ms / n)
    }
}
