//! Job-description vector store: indexing and single-vector retrieval for scoring.
//!
//! Two backends share one trait: an in-process store for tests and single-node
//! setups, and a Postgres table (`job_vectors`, embeddings as `REAL[]`). Nearest
//! matching for text queries is computed in process in both.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::models::job::JobVectorRow;
use crate::pipeline::PipelineError;

pub const DEFAULT_JOB_QUERY: &str = "job description";

/// How the scoring engine picks its one job vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobQuery {
    /// Nearest indexed description to the embedded query text.
    ByQuery(String),
    ById(Uuid),
}

impl Default for JobQuery {
    fn default() -> Self {
        JobQuery::ByQuery(DEFAULT_JOB_QUERY.to_string())
    }
}

impl fmt::Display for JobQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobQuery::ByQuery(text) => write!(f, "query:{text}"),
            JobQuery::ById(id) => write!(f, "id:{id}"),
        }
    }
}

#[async_trait]
pub trait JobVectorStore: Send + Sync {
    /// Embeds and stores a description. Re-indexing a job id replaces it.
    async fn index(&self, job_id: Uuid, description: &str) -> Result<(), PipelineError>;

    /// Returns the single best-matching job vector, or `None` when nothing matches.
    async fn lookup(&self, query: &JobQuery) -> Result<Option<Vec<f32>>, PipelineError>;
}

async fn embed_for_store(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    context: &str,
) -> Result<Vec<f32>, PipelineError> {
    embedder
        .embed(text)
        .await
        .map_err(|e| PipelineError::EmbeddingUnavailable {
            context: context.to_string(),
            reason: e.to_string(),
        })
}

/// Row vector most similar to `query`; rows of a different dimension are skipped.
fn nearest<'a>(rows: impl Iterator<Item = &'a [f32]>, query: &[f32]) -> Option<Vec<f32>> {
    rows.filter(|v| v.len() == query.len())
        .map(|v| (cosine_similarity(v, query), v))
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, v)| v.to_vec())
}

// ────────────────────────────────────────────────────────────────────────────
// InMemoryJobVectorStore
// ────────────────────────────────────────────────────────────────────────────

pub struct InMemoryJobVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    rows: RwLock<Vec<JobVectorRow>>,
}

impl InMemoryJobVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            rows: RwLock::new(Vec::new()),
        }
    }

    fn poisoned() -> PipelineError {
        PipelineError::Store("job vector lock poisoned".to_string())
    }
}

#[async_trait]
impl JobVectorStore for InMemoryJobVectorStore {
    async fn index(&self, job_id: Uuid, description: &str) -> Result<(), PipelineError> {
        let embedding = embed_for_store(self.embedder.as_ref(), description, "job description").await?;
        let row = JobVectorRow {
            job_id,
            description: description.to_string(),
            embedding,
            created_at: Utc::now(),
        };

        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        rows.retain(|r| r.job_id != job_id);
        rows.push(row);
        debug!("Indexed job {job_id} in memory ({} jobs total)", rows.len());
        Ok(())
    }

    async fn lookup(&self, query: &JobQuery) -> Result<Option<Vec<f32>>, PipelineError> {
        match query {
            JobQuery::ById(id) => {
                let rows = self.rows.read().map_err(|_| Self::poisoned())?;
                Ok(rows.iter().find(|r| r.job_id == *id).map(|r| r.embedding.clone()))
            }
            JobQuery::ByQuery(text) => {
                if self.rows.read().map_err(|_| Self::poisoned())?.is_empty() {
                    return Ok(None);
                }
                let query_vector = embed_for_store(self.embedder.as_ref(), text, "job query").await?;
                let rows = self.rows.read().map_err(|_| Self::poisoned())?;
                Ok(nearest(rows.iter().map(|r| r.embedding.as_slice()), &query_vector))
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PgJobVectorStore
// ────────────────────────────────────────────────────────────────────────────

pub struct PgJobVectorStore {
    pool: PgPool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl PgJobVectorStore {
    pub fn new(pool: PgPool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embedder }
    }

    /// Creates the `job_vectors` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_vectors (
                job_id      UUID PRIMARY KEY,
                description TEXT NOT NULL,
                embedding   REAL[] NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("job_vectors table ready");
        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> PipelineError {
    PipelineError::Store(e.to_string())
}

#[async_trait]
impl JobVectorStore for PgJobVectorStore {
    async fn index(&self, job_id: Uuid, description: &str) -> Result<(), PipelineError> {
        let embedding = embed_for_store(self.embedder.as_ref(), description, "job description").await?;

        sqlx::query(
            r#"
            INSERT INTO job_vectors (job_id, description, embedding)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id) DO UPDATE
            SET description = EXCLUDED.description,
                embedding = EXCLUDED.embedding,
                created_at = now()
            "#,
        )
        .bind(job_id)
        .bind(description)
        .bind(&embedding)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        info!("Indexed job {job_id} ({} dims)", embedding.len());
        Ok(())
    }

    async fn lookup(&self, query: &JobQuery) -> Result<Option<Vec<f32>>, PipelineError> {
        match query {
            JobQuery::ById(id) => {
                sqlx::query_scalar::<_, Vec<f32>>("SELECT embedding FROM job_vectors WHERE job_id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(store_error)
            }
            JobQuery::ByQuery(text) => {
                let rows = sqlx::query_as::<_, JobVectorRow>("SELECT * FROM job_vectors")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(store_error)?;
                if rows.is_empty() {
                    return Ok(None);
                }
                let query_vector = embed_for_store(self.embedder.as_ref(), text, "job query").await?;
                Ok(nearest(rows.iter().map(|r| r.embedding.as_slice()), &query_vector))
            }
        }
    }
}
