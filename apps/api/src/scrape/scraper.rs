//! Profile scraper collaborator and the quota-guarded entry point that wraps it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::scrape::{QuotaError, ScrapeGuard};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("invalid profile URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scrape API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("profile scraping is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn scrape(&self, profile_url: &Url) -> Result<Value, ScrapeError>;
}

/// Calls a scraping API as `GET {endpoint}?url={profile_url}` and returns its JSON.
pub struct HttpProfileScraper {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpProfileScraper {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, ScrapeError> {
        let endpoint = Url::parse(endpoint).map_err(|_| ScrapeError::InvalidUrl(endpoint.to_string()))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ProfileScraper for HttpProfileScraper {
    async fn scrape(&self, profile_url: &Url) -> Result<Value, ScrapeError> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("url", profile_url.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// Stand-in used when no scraping API is configured; every call fails.
pub struct DisabledScraper;

#[async_trait]
impl ProfileScraper for DisabledScraper {
    async fn scrape(&self, _profile_url: &Url) -> Result<Value, ScrapeError> {
        Err(ScrapeError::NotConfigured)
    }
}

pub fn parse_profile_url(raw: &str) -> Result<Url, ScrapeError> {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(url),
        _ => Err(ScrapeError::InvalidUrl(raw.to_string())),
    }
}

/// Scrapes under a quota permit; only a successful scrape is counted.
pub async fn guarded_scrape(
    guard: &ScrapeGuard,
    scraper: &dyn ProfileScraper,
    profile_url: &str,
) -> Result<Value, ScrapeError> {
    let url = parse_profile_url(profile_url)?;
    let permit = guard.try_acquire().await?;
    let day = permit.day();

    match scraper.scrape(&url).await {
        Ok(profile) => {
            permit.complete().await?;
            info!("Scraped profile {url} (counted toward {day})");
            Ok(profile)
        }
        Err(e) => {
            warn!("Scrape of {url} failed: {e}");
            if let Err(release_err) = permit.abandon().await {
                warn!("Could not release quota slot after failed scrape of {url}: {release_err}");
            }
            Err(e)
        }
    }
}
