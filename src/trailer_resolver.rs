//! Trailer lookup is explicitly out of scope for this pipeline (Non-goal);
//! it's modeled as an injectable capability so a future crate can supply a
//! real implementation without touching `persistence` or `batch_runner`.

use async_trait::async_trait;

#[async_trait]
pub trait TrailerResolver: Send + Sync {
    async fn resolve(&self, game_name: &str) -> Option<String>;
}

pub struct NullTrailerResolver;

#[async_trait]
impl TrailerResolver for NullTrailerResolver {
    async fn resolve(&self, _game_name: &str) -> Option<String> {
        None
    }
}
