use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::extraction::ExtractionEngine;
use crate::pipeline::job_store::JobVectorStore;
use crate::pipeline::scoring::ScoringEngine;
use crate::scrape::scraper::ProfileScraper;
use crate::scrape::ScrapeGuard;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub extraction: Arc<ExtractionEngine>,
    pub scoring: Arc<ScoringEngine>,
    /// Same store the scoring engine reads from; handlers index into it.
    pub job_store: Arc<dyn JobVectorStore>,
    pub scrape_guard: Arc<ScrapeGuard>,
    /// `DisabledScraper` unless SCRAPE_API_URL is set.
    pub scraper: Arc<dyn ProfileScraper>,
    pub config: Config,
}
