// HTTP surface for the pipeline's five operator commands, mirrored from
// `command.rs`/`batch_runner.rs` so the same runs can be triggered by a
// human over the CLI or by a scheduler over HTTP.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
