//! Upstream source abstraction. The concrete HTTP wire formats live in
//! `store` and `meta`; callers depend only on the `SourceClient` trait so
//! the batch runner and CLI never need to know which upstream they're
//! talking to.

pub mod circuit_breaker;
pub mod meta;
pub mod store;

use crate::contracts::{ExternalId, RawRecord};
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct WindowFilter {
    pub updated_since: Option<chrono::DateTime<chrono::Utc>>,
    pub released_between: Option<(NaiveDate, NaiveDate)>,
    pub limit: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("record not found")]
    NotFound,
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned {0}")]
    Upstream5xx(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("circuit open for this source")]
    CircuitOpen,
    #[error("source temporarily unavailable: caller cancelled")]
    Unavailable,
}

impl From<crate::rate_limiter::SourceTemporarilyUnavailable> for SourceError {
    fn from(_: crate::rate_limiter::SourceTemporarilyUnavailable) -> Self {
        SourceError::Unavailable
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return SourceError::RateLimited { retry_after: None };
            }
            if status.is_server_error() {
                return SourceError::Upstream5xx(status.as_u16());
            }
        }
        SourceError::Network(err.to_string())
    }
}

impl<E: Into<SourceError>> From<circuit_breaker::CircuitBreakerError<E>> for SourceError {
    fn from(err: circuit_breaker::CircuitBreakerError<E>) -> Self {
        match err {
            circuit_breaker::CircuitBreakerError::Open => SourceError::CircuitOpen,
            circuit_breaker::CircuitBreakerError::Inner(inner) => inner.into(),
        }
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Lightweight id listing, used by `CandidateSelector::NewStoreIds`.
    async fn list_ids(&self) -> Result<Vec<ExternalId>, SourceError>;

    async fn fetch_one(&self, id: &ExternalId) -> Result<Option<RawRecord>, SourceError>;

    async fn fetch_window(&self, filter: WindowFilter) -> Result<Vec<RawRecord>, SourceError>;
}

/// Base delay for the exponential backoff in [`retry_with_backoff`].
const BACKOFF_BASE: std::time::Duration = std::time::Duration::from_millis(300);
/// Upper bound a computed delay is clamped to before jitter is applied.
const BACKOFF_CAP: std::time::Duration = std::time::Duration::from_secs(5);
/// Retries attempted after the first try, i.e. up to 3 extra attempts.
const MAX_RETRY_ATTEMPTS: usize = 3;

/// `base * 2^attempt`, capped at `BACKOFF_CAP`, jittered by up to +/-50%.
fn backoff_delay(attempt: usize) -> std::time::Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(16));
    let capped = exp.min(BACKOFF_CAP);
    let jitter_frac = rand::Rng::gen_range(&mut rand::thread_rng(), -0.5..=0.5);
    capped.mul_f64((1.0 + jitter_frac).max(0.0))
}

/// Shared retry-with-backoff helper for transient 429/5xx failures.
/// Generalizes the Store provider's `get_with_backoff_json` loop to the
/// spec's exponential/jittered schedule: base 300ms, capped at 5s, +/-50%
/// jitter, at most 3 retries. A `Retry-After` header, when present,
/// overrides the computed delay for that attempt.
pub(crate) async fn retry_with_backoff<F, Fut, T>(mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(SourceError::RateLimited { retry_after }) => {
                if attempt >= MAX_RETRY_ATTEMPTS {
                    return Err(SourceError::RateLimited { retry_after });
                }
                let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(SourceError::Upstream5xx(code)) if attempt < MAX_RETRY_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                attempt += 1;
                tracing::warn!(code, attempt, ?delay, "upstream 5xx, retrying after backoff");
                tokio::time::sleep(delay).await;
            }
            Err(other) => return Err(other),
        }
    }
}
