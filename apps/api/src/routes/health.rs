use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and active models.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-intel-api",
        "generation_model": crate::llm_client::MODEL,
        "embedding_model": state.config.embedding_model,
        "scrape_daily_limit": state.config.scrape_daily_limit
    }))
}
