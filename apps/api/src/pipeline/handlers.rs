//! Axum route handlers for resume extraction, scoring, and job indexing.

use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::insights::ResumeInsights;
use crate::pipeline::job_store::JobQuery;
use crate::pipeline::loader::RawDocument;
use crate::pipeline::scoring::ScoreReport;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IndexJobRequest {
    pub job_id: Option<Uuid>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct IndexJobResponse {
    pub job_id: Uuid,
}

/// Multipart form: a `file` part plus optional `job_id` / `query` text parts.
struct ResumeUpload {
    document: RawDocument,
    job_id: Option<String>,
    query: Option<String>,
}

impl ResumeUpload {
    fn job_query(&self) -> Result<JobQuery, AppError> {
        if let Some(raw) = self.job_id.as_deref() {
            let id = Uuid::parse_str(raw.trim())
                .map_err(|_| AppError::Validation(format!("job_id '{raw}' is not a UUID")))?;
            return Ok(JobQuery::ById(id));
        }
        Ok(match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => JobQuery::ByQuery(q.to_string()),
            _ => JobQuery::default(),
        })
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<ResumeUpload, AppError> {
    let mut document = None;
    let mut job_id = None;
    let mut query = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read file: {e}")))?;
                document = Some(RawDocument::new(bytes, filename));
            }
            "job_id" | "query" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read {name}: {e}")))?;
                if name == "job_id" {
                    job_id = Some(value).filter(|v| !v.trim().is_empty());
                } else {
                    query = Some(value);
                }
            }
            _ => {}
        }
    }

    let document =
        document.ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    if document.bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }

    Ok(ResumeUpload {
        document,
        job_id,
        query,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/extract
///
/// Parses the uploaded resume and returns schema-validated insights.
pub async fn handle_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ResumeInsights>, AppError> {
    let upload = read_upload(multipart).await?;
    let insights = state.extraction.extract(&upload.document).await?;
    Ok(Json(insights))
}

/// POST /api/v1/resumes/score
///
/// Scores the uploaded resume against `job_id` when given, otherwise against the
/// job nearest to `query` (default "job description").
pub async fn handle_score(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ScoreReport>, AppError> {
    let upload = read_upload(multipart).await?;
    let query = upload.job_query()?;
    let report = state.scoring.score(&upload.document, &query).await?;
    Ok(Json(report))
}

/// POST /api/v1/jobs
///
/// Embeds and stores a job description. Re-posting a `job_id` replaces it.
pub async fn handle_index_job(
    State(state): State<AppState>,
    Json(request): Json<IndexJobRequest>,
) -> Result<Json<IndexJobResponse>, AppError> {
    if request.description.trim().is_empty() {
        return Err(AppError::Validation("description cannot be empty".to_string()));
    }

    let job_id = request.job_id.unwrap_or_else(Uuid::new_v4);
    state.job_store.index(job_id, &request.description).await?;

    info!("Indexed job {job_id}");
    Ok(Json(IndexJobResponse { job_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(job_id: Option<&str>, query: Option<&str>) -> ResumeUpload {
        ResumeUpload {
            document: RawDocument::new(Bytes::from_static(b"x"), "cv.txt"),
            job_id: job_id.map(str::to_string),
            query: query.map(str::to_string),
        }
    }

    #[test]
    fn test_job_id_takes_precedence_over_query() {
        let id = Uuid::new_v4();
        let q = upload(Some(&id.to_string()), Some("rust engineer")).job_query().unwrap();
        assert_eq!(q, JobQuery::ById(id));
    }

    #[test]
    fn test_blank_query_falls_back_to_default() {
        assert_eq!(upload(None, Some("  ")).job_query().unwrap(), JobQuery::default());
        assert_eq!(
            upload(None, Some("platform engineer")).job_query().unwrap(),
            JobQuery::ByQuery("platform engineer".to_string())
        );
    }

    #[test]
    fn test_malformed_job_id_is_validation_error() {
        assert!(matches!(
            upload(Some("not-a-uuid"), None).job_query(),
            Err(AppError::Validation(_))
        ));
    }
}
