use anyhow::{Context, Result};

use crate::embeddings::{DEFAULT_DIMENSIONS, DEFAULT_MODEL};
use crate::pipeline::chunker::{ChunkConfig, DEFAULT_OVERLAP, DEFAULT_TARGET_LEN};
use crate::pipeline::scoring::{
    CategoryWeights, ScoringConfig, DEFAULT_EMBED_CONCURRENCY, DEFAULT_WEIGHTS_VERSION,
};
use crate::scrape::DEFAULT_DAILY_LIMIT;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    /// Enables the Postgres job store; in-memory otherwise.
    pub database_url: Option<String>,
    /// Enables the shared Redis quota counter; in-memory otherwise.
    pub redis_url: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub scrape_api_url: Option<String>,
    pub scrape_api_key: Option<String>,
    pub scrape_daily_limit: u32,
    pub scoring: ScoringConfig,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let chunk = ChunkConfig::new(
            parse_env("CHUNK_TARGET_LEN", DEFAULT_TARGET_LEN)?,
            parse_env("CHUNK_OVERLAP", DEFAULT_OVERLAP)?,
        )?;
        let weights = match optional_env("SCORING_WEIGHTS") {
            Some(pairs) => CategoryWeights::parse(&pairs)?,
            None => CategoryWeights::default(),
        };

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            embedding_base_url: optional_env("EMBEDDING_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            embedding_model: optional_env("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_dimensions: parse_env("EMBEDDING_DIMENSIONS", DEFAULT_DIMENSIONS)?,
            scrape_api_url: optional_env("SCRAPE_API_URL"),
            scrape_api_key: optional_env("SCRAPE_API_KEY"),
            scrape_daily_limit: parse_env("SCRAPE_DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            scoring: ScoringConfig {
                chunk,
                weights,
                weights_version: optional_env("SCORING_WEIGHTS_VERSION")
                    .unwrap_or_else(|| DEFAULT_WEIGHTS_VERSION.to_string()),
                embed_concurrency: parse_env("EMBED_CONCURRENCY", DEFAULT_EMBED_CONCURRENCY)?,
            },
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
