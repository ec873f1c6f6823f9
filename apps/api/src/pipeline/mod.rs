// Resume Intelligence Pipeline
// Implements: document loading, chunking, category classification, schema-constrained
// extraction, and category-weighted match scoring.
// Model and embedding calls go through the llm_client / embeddings capabilities only.

pub mod chunker;
pub mod classifier;
pub mod extraction;
pub mod handlers;
pub mod job_store;
pub mod loader;
pub mod prompts;
pub mod scoring;

use thiserror::Error;

use crate::pipeline::loader::LoadError;

/// Pipeline stage a failure originated in, carried for caller-side logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Generate,
    Validate,
    Embed,
    Lookup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Load => "load",
            Stage::Generate => "generate",
            Stage::Validate => "validate",
            Stage::Embed => "embed",
            Stage::Lookup => "lookup",
        })
    }
}

/// Typed failures of the extraction and scoring engines.
///
/// None of these are retried inside the pipeline. `GenerationUnavailable` and
/// `EmbeddingUnavailable` are transient and safe for the caller to retry.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to parse document: {0}")]
    ParseFailure(#[from] LoadError),

    #[error("generated value violates the ResumeInsights schema at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("generation capability unavailable: {0}")]
    GenerationUnavailable(String),

    /// The generation capability refused the request (bad key, bad request,
    /// undecodable reply). Retrying the same call fails the same way.
    #[error("generation capability rejected the request: {0}")]
    GenerationRejected(String),

    /// `context` names what was being embedded, e.g. `chunk 3` or `job query`.
    #[error("embedding unavailable for {context}: {reason}")]
    EmbeddingUnavailable { context: String, reason: String },

    #[error("chunk {chunk} embedding has {actual} dimensions, job vector has {expected}")]
    EmbeddingDimensionMismatch {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    #[error("no job description found for query '{query}'")]
    NoJobDescription { query: String },

    #[error("job store error: {0}")]
    Store(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ParseFailure(_) | PipelineError::InvalidConfig(_) => Stage::Load,
            PipelineError::SchemaViolation { .. } => Stage::Validate,
            PipelineError::GenerationUnavailable(_) | PipelineError::GenerationRejected(_) => {
                Stage::Generate
            }
            PipelineError::EmbeddingUnavailable { .. }
            | PipelineError::EmbeddingDimensionMismatch { .. } => Stage::Embed,
            PipelineError::NoJobDescription { .. } | PipelineError::Store(_) => Stage::Lookup,
        }
    }

    /// Whether the caller may retry the same request with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::GenerationUnavailable(_) | PipelineError::EmbeddingUnavailable { .. }
        )
    }
}
