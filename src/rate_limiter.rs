//! Rate limiting for upstream source clients.
//!
//! Two shapes, matching how the upstreams actually throttle: a counting
//! window (N operations per W seconds, the window resets on a hard
//! boundary) and a minimum-delay spacer (never call more often than every
//! D, regardless of how many calls land in a given window).

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// `take()` fails only when the caller's token is already cancelled before a
/// slot opens, mirroring the cooperative-cancellation shape of
/// `tokio::select!` against a `Notify`/`broadcast::Receiver` elsewhere in
/// this pipeline (spec §4.1).
#[derive(Debug, thiserror::Error)]
#[error("source temporarily unavailable: caller cancelled")]
pub struct SourceTemporarilyUnavailable;

/// `N` operations per `window`. Saturation is logged at 25/50/75/95% so an
/// operator can see a source approaching its ceiling before requests start
/// queueing.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    inner: Arc<Mutex<WindowState>>,
    limit: u32,
    window: Duration,
    label: &'static str,
}

struct WindowState {
    window_start: Instant,
    count: u32,
    last_logged_bucket: u8,
}

impl FixedWindowLimiter {
    pub fn new(label: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
                last_logged_bucket: 0,
            })),
            limit,
            window,
            label,
        }
    }

    /// Blocks until a slot in the current (or next) window is free, or fails
    /// if `cancel` fires first.
    pub async fn take(&self, cancel: &CancellationToken) -> Result<(), SourceTemporarilyUnavailable> {
        if self.limit == 0 || self.window.is_zero() {
            return Ok(());
        }
        loop {
            let (admitted, wait_for, log) = {
                let mut state = self.inner.lock().await;
                let now = Instant::now();
                if now.duration_since(state.window_start) >= self.window {
                    state.window_start = now;
                    state.count = 0;
                    state.last_logged_bucket = 0;
                }
                if state.count < self.limit {
                    state.count += 1;
                    let bucket = saturation_bucket(state.count, self.limit);
                    let log = if bucket > state.last_logged_bucket {
                        state.last_logged_bucket = bucket;
                        Some((state.count, bucket))
                    } else {
                        None
                    };
                    (true, Duration::ZERO, log)
                } else {
                    let wait = (state.window_start + self.window).saturating_duration_since(now);
                    (false, wait, None)
                }
            };

            if let Some((count, bucket)) = log {
                if bucket > 0 {
                    warn!(
                        source = self.label,
                        limit = self.limit,
                        count,
                        bucket,
                        "rate limiter window approaching saturation"
                    );
                }
            }

            if admitted {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(SourceTemporarilyUnavailable);
            }
            if wait_for.is_zero() {
                continue;
            }
            tokio::select! {
                _ = sleep(wait_for) => {}
                _ = cancel.cancelled() => return Err(SourceTemporarilyUnavailable),
            }
        }
    }
}

fn saturation_bucket(count: u32, limit: u32) -> u8 {
    let ratio = count as f64 / limit as f64;
    if ratio >= 0.95 {
        95
    } else if ratio >= 0.75 {
        75
    } else if ratio >= 0.5 {
        50
    } else if ratio >= 0.25 {
        25
    } else {
        0
    }
}

/// Minimum delay between successive calls, with jitter so a burst of
/// released workers doesn't re-synchronize on the same tick.
#[derive(Clone)]
pub struct MinDelaySpacer {
    min_delay: Duration,
    next_allowed: Arc<Mutex<Instant>>,
}

impl MinDelaySpacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_allowed: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub async fn take(&self, cancel: &CancellationToken) -> Result<(), SourceTemporarilyUnavailable> {
        if self.min_delay.is_zero() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(SourceTemporarilyUnavailable);
        }
        let mut next_allowed = self.next_allowed.lock().await;
        let now = Instant::now();
        let wait_until = if now >= *next_allowed {
            now
        } else {
            *next_allowed
        };
        let sleep_duration = wait_until.saturating_duration_since(now);

        let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
        let jittered = self
            .min_delay
            .mul_f64((1.0 + jitter_frac).max(0.1));

        *next_allowed = wait_until + jittered;
        drop(next_allowed);

        if !sleep_duration.is_zero() {
            tokio::select! {
                _ = sleep(sleep_duration) => {}
                _ = cancel.cancelled() => return Err(SourceTemporarilyUnavailable),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_admits_up_to_limit_then_blocks() {
        let limiter = FixedWindowLimiter::new("test", 3, Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.take(&cancel).await.unwrap();
        limiter.take(&cancel).await.unwrap();
        limiter.take(&cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));

        let fourth = Instant::now();
        limiter.take(&cancel).await.unwrap();
        assert!(fourth.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn spacer_enforces_minimum_delay() {
        let spacer = MinDelaySpacer::new(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        spacer.take(&cancel).await.unwrap();
        let start = Instant::now();
        spacer.take(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[tokio::test]
    async fn take_fails_when_cancelled_before_a_slot_opens() {
        let limiter = FixedWindowLimiter::new("test", 1, Duration::from_millis(200));
        let cancel = CancellationToken::new();
        limiter.take(&cancel).await.unwrap();
        cancel.cancel();
        assert!(limiter.take(&cancel).await.is_err());
    }
}
