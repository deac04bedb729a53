// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                .route(
                    "/ingest/refresh-window",
                    web::post().to(handlers::refresh_window),
                )
                .route("/ingest/new", web::post().to(handlers::ingest_new))
                .route("/ingest/single", web::post().to(handlers::ingest_single))
                .route(
                    "/ingest/full-refresh",
                    web::post().to(handlers::full_refresh),
                )
                .route(
                    "/ingest/backfill-details",
                    web::post().to(handlers::backfill_details),
                )
                .route("/ingest/runs", web::get().to(handlers::list_runs))
                .route("/ingest/runs/{run_id}", web::get().to(handlers::get_run)),
        );
}
