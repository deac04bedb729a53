//! A small circuit breaker for source clients: trips after consecutive
//! network-level failures, stays open for a cooldown, then admits a single
//! probe call before closing again.
//!
//! Grounded in idiom on the Closed/Open/HalfOpen circuit breaker found in
//! the workflow-engine-core error module, trimmed to the one knob this
//! pipeline needs (consecutive-failure counting, no rolling window).

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(120),
        }
    }
}

pub struct CircuitBreaker {
    label: &'static str,
    config: CircuitBreakerConfig,
    failures: AtomicU32,
    state: RwLock<CircuitState>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

impl CircuitBreaker {
    pub fn new(label: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            label,
            config,
            failures: AtomicU32::new(0),
            state: RwLock::new(CircuitState::Closed),
        }
    }

    /// Reads current state, promoting Open -> HalfOpen once the cooldown has
    /// elapsed. Only one caller observes the HalfOpen transition per
    /// cooldown; everyone else still sees Open until that probe resolves.
    async fn admit(&self) -> bool {
        let current = *self.state.read().await;
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open { opened_at } if opened_at.elapsed() >= self.config.cooldown => {
                let mut state = self.state.write().await;
                if matches!(*state, CircuitState::Open { opened_at: o } if o == opened_at) {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    // Another caller already promoted it or it already closed.
                    !matches!(*state, CircuitState::Open { .. })
                }
            }
            CircuitState::Open { .. } => false,
        }
    }

    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::Open);
        }
        match f().await {
            Ok(v) => {
                self.on_success().await;
                Ok(v)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if !matches!(*state, CircuitState::Closed) {
            warn!(source = self.label, "circuit breaker closed after probe success");
        }
        *state = CircuitState::Closed;
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        if matches!(*state, CircuitState::HalfOpen) {
            *state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            warn!(source = self.label, "probe failed; circuit breaker reopened");
            return;
        }
        let count = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.failure_threshold {
            *state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            warn!(
                source = self.label,
                failures = count,
                "circuit breaker opened after consecutive failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_and_half_opens_after_cooldown() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_millis(10),
            },
        );
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert!(matches!(
            cb.call(|| async { Ok::<_, &str>(1) }).await,
            Err(CircuitBreakerError::Open)
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = cb.call(|| async { Ok::<_, &str>(1) }).await;
        assert!(result.is_ok());
    }
}
