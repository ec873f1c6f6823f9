use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::loader::LoadError;
use crate::pipeline::PipelineError;
use crate::scrape::scraper::ScrapeError;
use crate::scrape::QuotaError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Bad upstream response: {0}")]
    BadUpstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        tracing::warn!(
            stage = %err.stage(),
            transient = err.is_transient(),
            "Pipeline request failed: {message}"
        );
        match err {
            PipelineError::ParseFailure(LoadError::UnsupportedFormat { .. }) => {
                AppError::UnsupportedMediaType(message)
            }
            PipelineError::ParseFailure(LoadError::CorruptDocument { .. }) => {
                AppError::UnprocessableEntity(message)
            }
            PipelineError::SchemaViolation { .. } => AppError::BadUpstream(message),
            PipelineError::GenerationUnavailable(_) | PipelineError::EmbeddingUnavailable { .. } => {
                AppError::Unavailable(message)
            }
            PipelineError::NoJobDescription { .. } => AppError::Conflict(message),
            PipelineError::EmbeddingDimensionMismatch { .. }
            | PipelineError::GenerationRejected(_)
            | PipelineError::Store(_)
            | PipelineError::InvalidConfig(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<QuotaError> for AppError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::QuotaExceeded { .. } => AppError::QuotaExceeded(err.to_string()),
            QuotaError::Backend(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<ScrapeError> for AppError {
    fn from(err: ScrapeError) -> Self {
        match err {
            ScrapeError::Quota(quota) => quota.into(),
            ScrapeError::InvalidUrl(_) => AppError::Validation(err.to_string()),
            ScrapeError::Http(_) | ScrapeError::Api { .. } | ScrapeError::NotConfigured => {
                AppError::Unavailable(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_FORMAT",
                msg.clone(),
            ),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CORRUPT_DOCUMENT",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "NO_JOB_DESCRIPTION", msg.clone()),
            AppError::QuotaExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", msg.clone())
            }
            AppError::BadUpstream(msg) => {
                tracing::error!("Schema violation from generation capability: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "SCHEMA_VIOLATION",
                    "The AI service returned a malformed profile".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::warn!("Collaborator unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UPSTREAM_UNAVAILABLE",
                    "An upstream service is temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        let err: AppError = err.into();
        err.into_response().status()
    }

    #[test]
    fn test_pipeline_errors_map_to_statuses() {
        assert_eq!(
            status_of(PipelineError::ParseFailure(LoadError::UnsupportedFormat {
                extension: "rtf".into()
            })),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_of(PipelineError::SchemaViolation {
                path: "$".into(),
                reason: "x".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(PipelineError::GenerationUnavailable("529".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(PipelineError::GenerationRejected("401".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(PipelineError::NoJobDescription {
                query: "job description".into()
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_quota_exceeded_is_429() {
        let err = QuotaError::QuotaExceeded {
            limit: 50,
            day: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
        };
        assert_eq!(status_of(err), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_of(ScrapeError::InvalidUrl("x".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
