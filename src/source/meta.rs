//! Meta source client: a RAWG-like catalog metadata API (list + page-cursor
//! pagination endpoint, per-id detail endpoint). DTO shapes grounded on
//! `rawg::{RawgListResponse, RawgGameRow, RawgGameDetail}`.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::{retry_with_backoff, SourceClient, SourceError, WindowFilter};
use crate::contracts::{ExternalId, RawRecord, Source};
use crate::rate_limiter::MinDelaySpacer;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct MetaListResponse {
    next: Option<String>,
    results: Vec<MetaGameRow>,
}

#[derive(Debug, Deserialize)]
struct MetaGameRow {
    id: i64,
    #[allow(dead_code)]
    name: String,
}

pub struct MetaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    spacer: MinDelaySpacer,
    breaker: CircuitBreaker,
    cancel: CancellationToken,
}

impl MetaClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, spacer: MinDelaySpacer) -> Self {
        Self::with_cancel(base_url, api_key, spacer, CancellationToken::new())
    }

    pub fn with_cancel(
        base_url: impl Into<String>,
        api_key: Option<String>,
        spacer: MinDelaySpacer,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            api_key,
            spacer,
            breaker: CircuitBreaker::new("meta", CircuitBreakerConfig::default()),
            cancel,
        }
    }

    fn authed(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        req
    }

    async fn get(&self, url: &str) -> Result<serde_json::Value, SourceError> {
        retry_with_backoff(|| async {
            self.spacer.take(&self.cancel).await?;
            let req = self.authed(self.client.get(url));
            let resp = req.send().await?;
            let status = resp.status();
            if status.as_u16() == 404 {
                return Err(SourceError::NotFound);
            }
            if status.as_u16() == 429 {
                return Err(SourceError::RateLimited { retry_after: None });
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
impl SourceClient for MetaClient {
    async fn list_ids(&self) -> Result<Vec<ExternalId>, SourceError> {
        let mut url = format!("{}/games", self.base_url);
        let mut ids = Vec::new();
        loop {
            let body = self.breaker.call(|| self.get(&url)).await.map_err(SourceError::from)?;
            let page: MetaListResponse =
                serde_json::from_value(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
            ids.extend(page.results.into_iter().map(|r| ExternalId(r.id.to_string())));
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(ids)
    }

    async fn fetch_one(&self, id: &ExternalId) -> Result<Option<RawRecord>, SourceError> {
        let url = format!("{}/games/{}", self.base_url, id.0);
        match self.breaker.call(|| self.get(&url)).await {
            Ok(payload) => Ok(Some(RawRecord {
                source: Source::Meta,
                external_id: id.clone(),
                fetched_at: Utc::now(),
                payload,
            })),
            Err(err) => match SourceError::from(err) {
                SourceError::NotFound => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn fetch_window(&self, filter: WindowFilter) -> Result<Vec<RawRecord>, SourceError> {
        let mut url = format!("{}/games", self.base_url);
        if let Some((start, end)) = filter.released_between {
            url = format!("{url}?dates={start},{end}");
        }
        let mut out = Vec::new();
        loop {
            let body = self.breaker.call(|| self.get(&url)).await.map_err(SourceError::from)?;
            let page: MetaListResponse =
                serde_json::from_value(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
            for row in page.results {
                if let Some(record) = self.fetch_one(&ExternalId(row.id.to_string())).await? {
                    out.push(record);
                }
                if let Some(limit) = filter.limit {
                    if out.len() >= limit as usize {
                        return Ok(out);
                    }
                }
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(out)
    }
}
