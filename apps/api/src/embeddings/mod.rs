//! Embedding capability: text → fixed-dimension vector.
//!
//! The scoring engine and job store only see `EmbeddingProvider`. The production
//! backend talks to an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_DIMENSIONS: usize = 3072;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding API returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid embedding client configuration: {0}")]
    Config(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector length every successful `embed` call returns.
    fn dimensions(&self) -> usize;
}

/// Embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::Config("invalid embedding API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }

    fn retry_backoff(attempt: u32) -> Duration {
        Duration::from_millis(500 * (1 << attempt.min(5)))
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };

        let mut attempt = 0u32;
        loop {
            let result = self.client.post(&self.endpoint).json(&request).send().await;
            let response = match result {
                Ok(r) => r,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    warn!("Embedding request failed ({e}), retry {attempt}");
                    tokio::time::sleep(Self::retry_backoff(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response.json().await?;
                let actual = parsed.data.len();
                let vector = parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or(EmbeddingError::CountMismatch {
                        expected: 1,
                        actual,
                    })?;
                debug!("Embedded {} chars into {} dims", text.len(), vector.len());
                return Ok(vector);
            }

            let body = response.text().await.unwrap_or_default();
            if Self::should_retry(status) && attempt + 1 < MAX_RETRIES {
                attempt += 1;
                warn!("Embedding API returned {status}, retry {attempt}");
                tokio::time::sleep(Self::retry_backoff(attempt)).await;
                continue;
            }
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity in [-1, 1]; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_is_one() {
        let v = [0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_opposite_is_minus_one() {
        let a = [1.0, 2.0];
        let b = [-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_new_rejects_blank_key() {
        let err = OpenAiEmbedder::new(" ", "https://api.openai.com/v1", DEFAULT_MODEL.to_string(), 3072);
        assert!(matches!(err, Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let embedder = OpenAiEmbedder::new(
            "sk-test",
            "http://localhost:8000/v1/",
            DEFAULT_MODEL.to_string(),
            DEFAULT_DIMENSIONS,
        )
        .unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:8000/v1/embeddings");
        assert_eq!(embedder.dimensions(), 3072);
    }
}
