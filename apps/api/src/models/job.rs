use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A job description indexed for resume scoring.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobVectorRow {
    pub job_id: Uuid,
    pub description: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}
