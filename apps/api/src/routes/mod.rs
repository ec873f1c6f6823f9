pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::scrape::handlers as scrape_handlers;
use crate::state::AppState;

/// Uploads above this are rejected before parsing.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume pipeline
        .route("/api/v1/resumes/extract", post(handlers::handle_extract))
        .route("/api/v1/resumes/score", post(handlers::handle_score))
        .route("/api/v1/jobs", post(handlers::handle_index_job))
        // Profile scraping
        .route("/api/v1/profiles/scrape", post(scrape_handlers::handle_scrape))
        .route(
            "/api/v1/profiles/scrape/quota",
            get(scrape_handlers::handle_quota_status),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
