//! Store source client: a Steam-like storefront with an app-list endpoint
//! and a per-app details endpoint.
//!
//! DTOs and the 429/`Retry-After` backoff loop are grounded on
//! `steam::provider::{AppListResp, AppDetailsWrapper, get_with_backoff_json}`,
//! renamed to this spec's vocabulary and wired through the shared
//! `SourceClient` trait instead of writing straight into the database.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::{retry_with_backoff, SourceClient, SourceError, WindowFilter};
use crate::contracts::{ExternalId, RawRecord, Source};
use crate::rate_limiter::FixedWindowLimiter;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct AppListResponse {
    applist: AppList,
}

#[derive(Debug, Deserialize)]
struct AppList {
    apps: Vec<AppEntry>,
}

#[derive(Debug, Deserialize)]
struct AppEntry {
    appid: i64,
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AppDetailsWrapper {
    success: bool,
    data: Option<serde_json::Value>,
}

pub struct StoreClient {
    client: Client,
    base_url: String,
    list_path: String,
    details_path: String,
    limiter: FixedWindowLimiter,
    breaker: CircuitBreaker,
    cancel: CancellationToken,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, limiter: FixedWindowLimiter) -> Self {
        Self::with_cancel(base_url, limiter, CancellationToken::new())
    }

    /// `cancel` is the process-level shutdown token; a request already in
    /// `limiter.take()` fails with `SourceError::Unavailable` instead of
    /// waiting out a rate-limit window past shutdown (spec §4.1).
    pub fn with_cancel(
        base_url: impl Into<String>,
        limiter: FixedWindowLimiter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            list_path: "/appslist".to_string(),
            details_path: "/appdetails".to_string(),
            limiter,
            breaker: CircuitBreaker::new("store", CircuitBreakerConfig::default()),
            cancel,
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<serde_json::Value, SourceError> {
        let client = &self.client;
        retry_with_backoff(|| async {
            self.limiter.take(&self.cancel).await?;
            let mut req = client.get(url).header("Accept", "application/json");
            if !query.is_empty() {
                req = req.query(query);
            }
            let resp = req.send().await?;
            let status = resp.status();
            if status.as_u16() == 429 {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(SourceError::RateLimited { retry_after });
            }
            if status.is_server_error() {
                return Err(SourceError::Upstream5xx(status.as_u16()));
            }
            if !status.is_success() {
                return Err(SourceError::Network(format!("unexpected status {status}")));
            }
            resp.json::<serde_json::Value>()
                .await
                .map_err(|e| SourceError::Malformed(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl SourceClient for StoreClient {
    async fn list_ids(&self) -> Result<Vec<ExternalId>, SourceError> {
        let url = format!("{}{}", self.base_url, self.list_path);
        let breaker = &self.breaker;
        let body = breaker
            .call(|| self.get_json(&url, &[]))
            .await
            .map_err(SourceError::from)?;
        let parsed: AppListResponse = serde_json::from_value(body)
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(parsed
            .applist
            .apps
            .into_iter()
            .map(|a| ExternalId(a.appid.to_string()))
            .collect())
    }

    async fn fetch_one(&self, id: &ExternalId) -> Result<Option<RawRecord>, SourceError> {
        let url = format!("{}{}", self.base_url, self.details_path);
        let query = [("appids", id.0.as_str())];
        let body = self
            .breaker
            .call(|| self.get_json(&url, &query))
            .await
            .map_err(SourceError::from)?;

        let keyed: std::collections::HashMap<String, AppDetailsWrapper> =
            serde_json::from_value(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let Some(entry) = keyed.get(&id.0) else {
            return Ok(None);
        };
        if !entry.success {
            return Ok(None);
        }
        let Some(payload) = entry.data.clone() else {
            return Ok(None);
        };
        Ok(Some(RawRecord {
            source: Source::Store,
            external_id: id.clone(),
            fetched_at: Utc::now(),
            payload,
        }))
    }

    async fn fetch_window(&self, filter: WindowFilter) -> Result<Vec<RawRecord>, SourceError> {
        let ids = self.list_ids().await?;
        let ids = match filter.limit {
            Some(n) => ids.into_iter().take(n as usize).collect::<Vec<_>>(),
            None => ids,
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.fetch_one(&id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
