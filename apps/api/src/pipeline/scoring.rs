//! Scoring Engine: category-weighted embedding similarity between a resume and a job.
//!
//! Algorithm:
//! 1. load → chunk (500 chars, 50 overlap)
//! 2. per chunk: classify + embed (bounded concurrent fan-out)
//! 3. fetch one job vector from the store
//! 4. per chunk: cosine similarity → rescale (s + 1) / 2 → group by category
//! 5. mean per observed category
//! 6. score = Σ mean × weight over observed categories, × 100, two decimals
//!
//! Weights of categories with no chunks are dropped, NOT redistributed: an absent
//! category is "no evidence", so the achievable maximum shrinks with coverage.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::pipeline::chunker::{self, ChunkConfig};
use crate::pipeline::classifier::{classify, Category};
use crate::pipeline::job_store::{JobQuery, JobVectorStore};
use crate::pipeline::loader::{self, RawDocument};
use crate::pipeline::PipelineError;

pub const DEFAULT_WEIGHTS_VERSION: &str = "category-weights-v1";
pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;

// ────────────────────────────────────────────────────────────────────────────
// Weights
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub experience: f64,
    pub skills: f64,
    pub projects: f64,
    pub education: f64,
    pub institute: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            experience: 0.05,
            skills: 0.25,
            projects: 0.50,
            education: 0.10,
            institute: 0.10,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: Category) -> f64 {
        match category {
            Category::Experience => self.experience,
            Category::Skills => self.skills,
            Category::Projects => self.projects,
            Category::Education => self.education,
            Category::Institute => self.institute,
        }
    }

    /// Weights must be non-negative and sum to at most 1 so scores stay in [0, 100].
    pub fn validate(&self) -> Result<(), PipelineError> {
        let weights = Category::ALL.map(|c| self.weight(c));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PipelineError::InvalidConfig(
                "category weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if sum > 1.0 + 1e-9 {
            return Err(PipelineError::InvalidConfig(format!(
                "category weights sum to {sum}, expected at most 1.0"
            )));
        }
        Ok(())
    }

    /// Parses `experience=0.05,skills=0.25,...`; unlisted categories keep defaults.
    pub fn parse(pairs: &str) -> Result<Self, PipelineError> {
        let mut weights = Self::default();
        for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                PipelineError::InvalidConfig(format!("expected category=weight, got '{pair}'"))
            })?;
            let value: f64 = value.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("invalid weight for '{}'", name.trim()))
            })?;
            let slot = match name.trim() {
                "experience" => &mut weights.experience,
                "skills" => &mut weights.skills,
                "projects" => &mut weights.projects,
                "education" => &mut weights.education,
                "institute" => &mut weights.institute,
                other => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "unknown category '{other}'"
                    )))
                }
            };
            *slot = value;
        }
        weights.validate()?;
        Ok(weights)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aggregation
// ────────────────────────────────────────────────────────────────────────────

/// Rescaled similarities observed for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub category: Category,
    pub similarities: Vec<f64>,
}

impl CategoryScore {
    pub fn mean(&self) -> Option<f64> {
        if self.similarities.is_empty() {
            return None;
        }
        Some(self.similarities.iter().sum::<f64>() / self.similarities.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub chunks: usize,
    pub mean: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Final scoring output. `match_score` is the persisted MatchScore.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub match_score: f64,
    pub chunk_count: usize,
    pub categories: Vec<CategoryBreakdown>,
    pub weights_version: String,
}

/// Maps cosine similarity from [-1, 1] onto [0, 1].
pub fn rescale(similarity: f64) -> f64 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted sum over categories with at least one similarity, as a 0-100 score.
pub fn aggregate(
    scores: &[CategoryScore],
    weights: &CategoryWeights,
) -> (f64, Vec<CategoryBreakdown>) {
    let mut total = 0.0;
    let mut breakdown = Vec::new();

    for score in scores {
        let Some(mean) = score.mean() else {
            continue;
        };
        let weight = weights.weight(score.category);
        let contribution = mean * weight;
        total += contribution;
        breakdown.push(CategoryBreakdown {
            category: score.category,
            chunks: score.similarities.len(),
            mean,
            weight,
            contribution,
        });
    }

    (round2(total * 100.0).clamp(0.0, 100.0), breakdown)
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub chunk: ChunkConfig,
    pub weights: CategoryWeights,
    pub weights_version: String,
    pub embed_concurrency: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            weights: CategoryWeights::default(),
            weights_version: DEFAULT_WEIGHTS_VERSION.to_string(),
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }
}

pub struct ScoringEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn JobVectorStore>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn JobVectorStore>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub async fn score(
        &self,
        document: &RawDocument,
        query: &JobQuery,
    ) -> Result<ScoreReport, PipelineError> {
        let parsed = loader::load(document.bytes.clone(), document.extension()).await?;
        let chunks = chunker::chunk(&parsed, &self.config.chunk);
        debug!("Scoring '{}': {} chunk(s)", document.filename, chunks.len());

        // owned chunks and embedder handles keep each future 'static and Send
        let embedder = Arc::clone(&self.embedder);
        let embedded: Vec<(usize, Category, Vec<f32>)> = stream::iter(chunks.iter().cloned())
            .map(move |chunk| {
                let embedder = Arc::clone(&embedder);
                async move {
                    let vector = embedder.embed(&chunk.text).await.map_err(|e| {
                        warn!("Embedding failed for chunk {}: {e}", chunk.source_order);
                        PipelineError::EmbeddingUnavailable {
                            context: format!("chunk {}", chunk.source_order),
                            reason: e.to_string(),
                        }
                    })?;
                    Ok::<_, PipelineError>((chunk.source_order, classify(&chunk), vector))
                }
            })
            .buffer_unordered(self.config.embed_concurrency.max(1))
            .try_collect()
            .await?;

        let job_vector = self
            .store
            .lookup(query)
            .await?
            .ok_or_else(|| PipelineError::NoJobDescription {
                query: query.to_string(),
            })?;

        let mut grouped: BTreeMap<Category, Vec<(usize, f64)>> = BTreeMap::new();
        for (order, category, vector) in &embedded {
            if vector.len() != job_vector.len() {
                return Err(PipelineError::EmbeddingDimensionMismatch {
                    chunk: *order,
                    expected: job_vector.len(),
                    actual: vector.len(),
                });
            }
            let similarity = rescale(cosine_similarity(vector, &job_vector));
            grouped.entry(*category).or_default().push((*order, similarity));
        }

        // completion order is arbitrary; keep similarities in source order
        let scores: Vec<CategoryScore> = grouped
            .into_iter()
            .map(|(category, mut sims)| {
                sims.sort_by_key(|(order, _)| *order);
                CategoryScore {
                    category,
                    similarities: sims.into_iter().map(|(_, s)| s).collect(),
                }
            })
            .collect();

        let (match_score, categories) = aggregate(&scores, &self.config.weights);
        info!(
            "Scored '{}' against {query}: {match_score:.2} ({} categories observed)",
            document.filename,
            categories.len()
        );

        Ok(ScoreReport {
            match_score,
            chunk_count: chunks.len(),
            categories,
            weights_version: self.config.weights_version.clone(),
        })
    }
}
