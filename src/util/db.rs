use anyhow::Result;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = std::env::var("USE_PREPARED")
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on")))
            .unwrap_or(false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        // sqlx with runtime-tokio-rustls should handle this automatically via the DSN,
        // but we can be explicit to avoid issues
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        // Optional fast-ingest session tuning
        let fast_ingest = std::env::var("FAST_INGEST")
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on")))
            .unwrap_or(false);
        let work_mem_mb: u32 = std::env::var("FAST_INGEST_WORK_MEM_MB")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(64);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                let do_fast = fast_ingest;
                let wm = work_mem_mb;
                Box::pin(async move {
                    if do_fast {
                        // Best-effort; ignore errors to avoid blocking startup in restricted envs
                        let _ = sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await;
                        let _ = sqlx::query(&format!("SET work_mem = '{}MB'", wm))
                            .execute(&mut *conn)
                            .await;
                        // maintenance_work_mem can help when creating indexes in-session (rare here)
                        let _ = sqlx::query("SET maintenance_work_mem = '256MB'")
                            .execute(&mut *conn)
                            .await;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;
        info!("connected to db");

        // Optional auto-migrate gate (default: OFF).
        // We default to off because this project must safely run against legacy/partial schemas.
        // Enable explicitly with AUTO_MIGRATE=1/true/on.
        let auto_migrate = std::env::var("AUTO_MIGRATE")
            .map(|raw| {
                let v = raw.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "on" | "yes")
            })
            .unwrap_or(false);
        if auto_migrate {
            info!("running migrations (AUTO_MIGRATE=on, custom runner)");
            Self::run_migrations(&pool).await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(Self { pool })
    }

    // Variant that NEVER runs migrations regardless of env (for pure data import paths).
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect_no_migrate(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = std::env::var("USE_PREPARED")
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on")))
            .unwrap_or(false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            connect_options = connect_options.statement_cache_capacity(0);
        }

        // Fast-ingest session wiring (applies to every acquired connection).
        let fast_ingest = std::env::var("FAST_INGEST")
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on")))
            .unwrap_or(false);
        let work_mem_mb: u32 = std::env::var("FAST_INGEST_WORK_MEM_MB")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(64);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                let do_fast = fast_ingest;
                let wm = work_mem_mb;
                Box::pin(async move {
                    if do_fast {
                        let _ = sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await;
                        let _ = sqlx::query(&format!("SET work_mem = '{}MB'", wm))
                            .execute(&mut *conn)
                            .await;
                        let _ = sqlx::query("SET maintenance_work_mem = '256MB'")
                            .execute(&mut *conn)
                            .await;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;
        info!("connected to db (no-migrate)");
        Ok(Self { pool })
    }
}

impl Db {
    // Custom lightweight migration runner that ignores non-numeric filenames (e.g. database_settings.sql)
    async fn run_migrations(pool: &PgPool) -> Result<()> {
        use std::{fs, path::Path};
        let dir = Path::new("./migrations");
        if !dir.exists() {
            return Ok(());
        }
        // Ensure tracking table exists (use raw_sql to avoid prepared statements under PgBouncer)
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(pool)
        .await?;
        // Fetch applied versions
        let applied_rows = sqlx::raw_sql("SELECT version FROM _sqlx_migrations")
            .fetch_all(pool)
            .await?;
        use std::collections::HashSet;
        let mut applied: HashSet<i64> = HashSet::new();
        for r in applied_rows {
            applied.insert(r.try_get::<i64, _>(0)?);
        }
        // Collect candidate migration files
        let mut candidates: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(fname) = path.file_name().and_then(|s| s.to_str()) {
                // pattern: digits '_' rest '.sql'
                let mut chars = fname.chars();
                let mut num_str = String::new();
                while let Some(c) = chars.next() {
                    if c.is_ascii_digit() {
                        num_str.push(c);
                    } else {
                        break;
                    }
                }
                if num_str.is_empty() || !fname.ends_with(".sql") {
                    continue;
                }
                if let Some(rest) = fname
                    .strip_prefix(&format!("{}", num_str))
                    .and_then(|s| s.strip_prefix("_"))
                {
                    if let Ok(version) = num_str.parse::<i64>() {
                        candidates.push((version, rest.trim_end_matches(".sql").to_string(), path));
                    }
                }
            }
        }
        candidates.sort_by_key(|(v, _, _)| *v);
        for (version, desc, path) in candidates {
            if applied.contains(&version) {
                continue;
            }
            let sql = fs::read_to_string(&path)?;
            info!(version, file=?path, "applying migration (two-phase)");

            // Phase 1: strip out CREATE INDEX CONCURRENTLY statements so they are not executed
            // inside an implicit transaction (which Postgres forbids). We do a lightweight
            // line-oriented scan; all such statements in our migrations start with that phrase
            // (possibly preceded by whitespace) and end at the first ';'. Multiline bodies are
            // collected until a terminating semicolon line is seen.
            let mut transactional = String::with_capacity(sql.len());
            let mut concurrent_indexes: Vec<String> = Vec::new();
            let mut capturing = false;
            let mut buf = String::new();
            for line in sql.lines() {
                let lt = line.trim_start().to_lowercase();
                if !capturing && lt.starts_with("create index concurrently") {
                    capturing = true;
                    buf.clear();
                    buf.push_str(line);
                    buf.push('\n');
                    if line.contains(';') {
                        // single-line statement
                        capturing = false;
                        concurrent_indexes.push(buf.clone());
                        buf.clear();
                    }
                    continue;
                }
                if capturing {
                    buf.push_str(line);
                    buf.push('\n');
                    if line.contains(';') {
                        capturing = false;
                        concurrent_indexes.push(buf.clone());
                        buf.clear();
                    }
                    continue;
                }
                // Normal line
                transactional.push_str(line);
                transactional.push('\n');
            }
            // Execute transactional portion (may be empty)
            let trimmed = transactional.trim();
            if !trimmed.is_empty() {
                sqlx::raw_sql(trimmed).execute(pool).await?;
            }
            // Phase 2: run each CREATE INDEX CONCURRENTLY individually in autocommit context
            for stmt in concurrent_indexes {
                let stmt_trim = stmt.trim();
                if stmt_trim.is_empty() {
                    continue;
                }
                info!(migration_version=version, index_stmt=%stmt_trim, "creating concurrent index");
                // Use raw_sql so statement goes as-is; errors bubble up but do not rollback prior work.
                if let Err(e) = sqlx::raw_sql(stmt_trim).execute(pool).await {
                    // Log and continue; since all are IF NOT EXISTS this is usually safe.
                    tracing::warn!(migration_version=version, error=%e, "concurrent index creation failed");
                    return Err(e.into());
                }
            }
            // Use raw_sql to avoid prepared statements; escape single quotes in description
            let desc_escaped = desc.replace('\'', "''");
            let insert_stmt = format!(
                "INSERT INTO _sqlx_migrations(version, description) VALUES ({}, '{}')",
                version, desc_escaped
            );
            sqlx::raw_sql(&insert_stmt).execute(pool).await?;
            // Update in-memory applied set to prevent duplicate-key errors if multiple files share the same version
            applied.insert(version);
        }
        // Log last applied
        if let Ok(r) = sqlx::raw_sql(
            "SELECT version, description FROM _sqlx_migrations ORDER BY version DESC LIMIT 1",
        )
        .fetch_one(pool)
        .await
        {
            let version: i64 = r.try_get(0).unwrap_or_default();
            let desc: String = r
                .try_get::<Option<String>, _>(1)
                .ok()
                .flatten()
                .unwrap_or_default();
            info!(version, desc, "migrations up-to-date (custom)");
        }
        Ok(())
    }
}
