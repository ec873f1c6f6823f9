//! Axum route handlers for quota-guarded profile scraping.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::scrape::scraper::guarded_scrape;
use crate::scrape::QuotaStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub profile: Value,
    pub quota: QuotaStatus,
}

/// POST /api/v1/profiles/scrape
///
/// 429 once today's quota is used up. Failed scrapes do not count.
pub async fn handle_scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, AppError> {
    let profile = guarded_scrape(&state.scrape_guard, state.scraper.as_ref(), &request.url).await?;
    let quota = state.scrape_guard.status().await?;
    Ok(Json(ScrapeResponse { profile, quota }))
}

/// GET /api/v1/profiles/scrape/quota
pub async fn handle_quota_status(
    State(state): State<AppState>,
) -> Result<Json<QuotaStatus>, AppError> {
    Ok(Json(state.scrape_guard.status().await?))
}
