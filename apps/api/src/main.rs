mod config;
mod db;
mod embeddings;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod scrape;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbedder};
use crate::llm_client::LlmClient;
use crate::pipeline::extraction::ExtractionEngine;
use crate::pipeline::job_store::{InMemoryJobVectorStore, JobVectorStore, PgJobVectorStore};
use crate::pipeline::scoring::ScoringEngine;
use crate::routes::build_router;
use crate::scrape::redis_counter::RedisQuotaCounter;
use crate::scrape::scraper::{DisabledScraper, HttpProfileScraper, ProfileScraper};
use crate::scrape::{InMemoryQuotaCounter, LocalClock, QuotaCounter, ScrapeGuard};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Intel API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize embeddings client
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(
        &config.openai_api_key,
        &config.embedding_base_url,
        config.embedding_model.clone(),
        config.embedding_dimensions,
    )?);
    info!(
        "Embedder initialized ({}, {} dims)",
        config.embedding_model,
        embedder.dimensions()
    );
    info!(
        "Chunking: {} chars with {} overlap, weights {}",
        config.scoring.chunk.target_len(),
        config.scoring.chunk.overlap(),
        config.scoring.weights_version
    );

    let job_store = build_job_store(&config, embedder.clone()).await?;
    let counter = build_quota_counter(&config).await?;
    let scraper = build_scraper(&config)?;

    // Build app state
    let state = AppState {
        extraction: Arc::new(ExtractionEngine::new(llm)),
        scoring: Arc::new(ScoringEngine::new(
            embedder,
            job_store.clone(),
            config.scoring.clone(),
        )),
        job_store,
        scrape_guard: Arc::new(ScrapeGuard::new(
            counter,
            Arc::new(LocalClock),
            config.scrape_daily_limit,
        )),
        scraper,
        config: config.clone(),
    };
    info!("Scrape guard daily limit: {}", state.scrape_guard.limit());

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the web client's host is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Postgres when DATABASE_URL is set, otherwise a process-local store.
async fn build_job_store(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn JobVectorStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgJobVectorStore::new(create_pool(url).await?, embedder);
            store.ensure_schema().await?;
            info!("Job vectors stored in PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set; job vectors kept in memory");
            Ok(Arc::new(InMemoryJobVectorStore::new(embedder)))
        }
    }
}

/// Redis when REDIS_URL is set so replicas share one daily count.
async fn build_quota_counter(config: &Config) -> Result<Arc<dyn QuotaCounter>> {
    match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            Ok(Arc::new(RedisQuotaCounter::connect(&client).await?))
        }
        None => {
            info!("REDIS_URL not set; scrape quota counted in-process");
            Ok(Arc::new(InMemoryQuotaCounter::new()))
        }
    }
}

fn build_scraper(config: &Config) -> Result<Arc<dyn ProfileScraper>> {
    match &config.scrape_api_url {
        Some(url) => {
            info!("Profile scraper endpoint: {url}");
            Ok(Arc::new(HttpProfileScraper::new(
                url,
                config.scrape_api_key.clone(),
            )?))
        }
        None => {
            info!("SCRAPE_API_URL not set; profile scraping disabled");
            Ok(Arc::new(DisabledScraper))
        }
    }
}
