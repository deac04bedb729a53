//! `catalog-reconciler`: a game-catalog ingestion and reconciliation
//! pipeline. Two upstreams (a retail storefront and a metadata database,
//! referred to throughout as Store and Meta) are scraped, normalized,
//! matched against each other, and upserted into Postgres.
//!
//! Module tree mirrors the component design: `source` talks to the two
//! upstreams, `normalization` maps their raw payloads to the canonical
//! `ProcessedGame` contract, `matching` decides cross-source linkage,
//! `persistence` performs the per-record transaction, and `batch_runner`
//! drives the whole thing under a bounded worker pool. `command` and
//! `cli` expose the five operator-facing commands; `api` exposes the same
//! surface over HTTP.

pub mod api;
pub mod batch_runner;
pub mod candidate_selector;
pub mod cli;
pub mod command;
pub mod config;
pub mod contracts;
pub mod env_boot;
pub mod exclusion_bitmap;
pub mod matching;
pub mod normalization;
pub mod persistence;
pub mod rate_limiter;
pub mod report_writer;
pub mod run_registry;
pub mod slug_policy;
pub mod source;
pub mod telemetry;
pub mod trailer_resolver;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use contracts::{ExternalId, ProcessedGame, RawRecord, Source};
