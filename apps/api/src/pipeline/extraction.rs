//! Extraction Engine: resume bytes → validated `ResumeInsights`.
//!
//! Pipeline: load → truncate to the first 10,000 chars → forced-tool generation at
//! temperature 0 → independent structural validation → link backfill.
//!
//! The generator's own schema enforcement is never trusted: every returned value
//! goes through `validate_insights` before deserialization.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::llm_client::{LlmError, StructuredGenerator};
use crate::models::insights::ResumeInsights;
use crate::pipeline::loader::{self, RawDocument};
use crate::pipeline::prompts::{build_extraction_prompt, extraction_system_prompt, insights_schema};
use crate::pipeline::PipelineError;

/// Prompt input bound. Resumes front-load contact and summary details, so the
/// tail is what gets dropped.
pub const MAX_PROMPT_CHARS: usize = 10_000;

pub struct ExtractionEngine {
    generator: Arc<dyn StructuredGenerator>,
    max_chars: usize,
}

impl ExtractionEngine {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self {
            generator,
            max_chars: MAX_PROMPT_CHARS,
        }
    }

    pub async fn extract(&self, document: &RawDocument) -> Result<ResumeInsights, PipelineError> {
        let parsed = loader::load(document.bytes.clone(), document.extension()).await?;

        let full_text = parsed.text();
        let text = truncate_chars(&full_text, self.max_chars);
        if text.len() < full_text.len() {
            debug!(
                "Truncated '{}' from {} to {} chars before generation",
                document.filename,
                full_text.chars().count(),
                self.max_chars
            );
        }

        let value = self
            .generator
            .generate(
                &build_extraction_prompt(text),
                &extraction_system_prompt(),
                &insights_schema(),
            )
            .await
            .map_err(generation_failure)?;

        let mut insights = validate_insights(&value).inspect_err(|e| {
            warn!("Generated insights for '{}' rejected: {e}", document.filename);
        })?;
        backfill_profile_links(&mut insights, parsed.links());

        info!(
            "Extracted insights from '{}': {} skills, {} roles, {} education entries",
            document.filename,
            insights.skills.len(),
            insights.experience.len(),
            insights.education.len()
        );
        Ok(insights)
    }
}

fn generation_failure(err: LlmError) -> PipelineError {
    if err.is_transient() {
        warn!("Generation capability unavailable: {err}");
        PipelineError::GenerationUnavailable(err.to_string())
    } else {
        error!("Generation capability rejected the request: {err}");
        PipelineError::GenerationRejected(err.to_string())
    }
}

/// Keeps the first `max_chars` chars of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Structural validation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Field {
    Required,
    Nullable,
}

const SKILL_FIELDS: &[(&str, Field)] = &[
    ("name", Field::Required),
    ("category", Field::Required),
    ("proficiency", Field::Nullable),
];

const EXPERIENCE_FIELDS: &[(&str, Field)] = &[
    ("company", Field::Required),
    ("title", Field::Required),
    ("duration", Field::Nullable),
];

const EDUCATION_FIELDS: &[(&str, Field)] = &[
    ("institution", Field::Required),
    ("degree", Field::Required),
    ("field", Field::Nullable),
    ("year", Field::Nullable),
];

const TOP_LEVEL_KEYS: &[&str] = &[
    "summary",
    "githubUrl",
    "linkedinUrl",
    "skills",
    "experience",
    "education",
    "certifications",
    "totalExperienceYears",
];

fn violation(path: impl Into<String>, reason: impl Into<String>) -> PipelineError {
    PipelineError::SchemaViolation {
        path: path.into(),
        reason: reason.into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checks `value` against the ResumeInsights shape and deserializes it.
///
/// Missing lists and nullable scalars are accepted (they default to empty / null);
/// wrong types, unknown keys, a missing summary and negative experience are not.
pub fn validate_insights(value: &Value) -> Result<ResumeInsights, PipelineError> {
    let obj = value
        .as_object()
        .ok_or_else(|| violation("$", format!("expected object, got {}", type_name(value))))?;
    reject_unknown_keys(obj, TOP_LEVEL_KEYS, "$")?;

    check_string(obj, "summary", Field::Required, "$")?;
    check_string(obj, "githubUrl", Field::Nullable, "$")?;
    check_string(obj, "linkedinUrl", Field::Nullable, "$")?;
    check_records(obj, "skills", SKILL_FIELDS)?;
    check_records(obj, "experience", EXPERIENCE_FIELDS)?;
    check_records(obj, "education", EDUCATION_FIELDS)?;

    if let Some(certs) = obj.get("certifications") {
        let items = certs.as_array().ok_or_else(|| {
            violation("$.certifications", format!("expected array, got {}", type_name(certs)))
        })?;
        for (i, item) in items.iter().enumerate() {
            if !item.is_string() {
                return Err(violation(
                    format!("$.certifications[{i}]"),
                    format!("expected string, got {}", type_name(item)),
                ));
            }
        }
    }

    match obj.get("totalExperienceYears") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) => match n.as_f64() {
            Some(years) if years.is_finite() && years >= 0.0 => {}
            _ => {
                return Err(violation(
                    "$.totalExperienceYears",
                    format!("expected a non-negative number, got {n}"),
                ))
            }
        },
        Some(other) => {
            return Err(violation(
                "$.totalExperienceYears",
                format!("expected number or null, got {}", type_name(other)),
            ))
        }
    }

    serde_json::from_value(value.clone()).map_err(|e| violation("$", e.to_string()))
}

fn reject_unknown_keys(obj: &Map<String, Value>, allowed: &[&str], path: &str) -> Result<(), PipelineError> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(violation(format!("{path}.{key}"), "unknown field")),
        None => Ok(()),
    }
}

fn check_string(obj: &Map<String, Value>, key: &str, field: Field, path: &str) -> Result<(), PipelineError> {
    match (obj.get(key), field) {
        (Some(Value::String(_)), _) => Ok(()),
        (None | Some(Value::Null), Field::Nullable) => Ok(()),
        (None, Field::Required) => Err(violation(format!("{path}.{key}"), "required field missing")),
        (Some(other), _) => Err(violation(
            format!("{path}.{key}"),
            format!("expected string, got {}", type_name(other)),
        )),
    }
}

fn check_records(obj: &Map<String, Value>, key: &str, fields: &[(&str, Field)]) -> Result<(), PipelineError> {
    let Some(list) = obj.get(key) else {
        return Ok(());
    };
    let items = list
        .as_array()
        .ok_or_else(|| violation(format!("$.{key}"), format!("expected array, got {}", type_name(list))))?;

    let allowed: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    for (i, item) in items.iter().enumerate() {
        let path = format!("$.{key}[{i}]");
        let record = item
            .as_object()
            .ok_or_else(|| violation(&path, format!("expected object, got {}", type_name(item))))?;
        reject_unknown_keys(record, &allowed, &path)?;
        for (name, field) in fields {
            check_string(record, name, *field, &path)?;
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Link backfill
// ────────────────────────────────────────────────────────────────────────────

/// Fills null or blank profile URLs from annotation links found by the loader.
/// A value the model produced is never overridden.
fn backfill_profile_links(insights: &mut ResumeInsights, links: &[String]) {
    fill_if_blank(&mut insights.github_url, links, "github.com/");
    fill_if_blank(&mut insights.linkedin_url, links, "linkedin.com/in/");
}

fn fill_if_blank(slot: &mut Option<String>, links: &[String], needle: &str) {
    if slot.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        return;
    }
    *slot = links
        .iter()
        .find(|link| link.to_lowercase().contains(needle))
        .cloned();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::OutputSchema;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeGenerator {
        reply: Result<Value, u16>,
        seen_prompt: Mutex<Option<String>>,
    }

    impl FakeGenerator {
        fn returning(value: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(value),
                seen_prompt: Mutex::new(None),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                seen_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl StructuredGenerator for FakeGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _system: &str,
            schema: &OutputSchema,
        ) -> Result<Value, LlmError> {
            assert_eq!(schema.name, "record_resume_insights");
            *self.seen_prompt.lock().unwrap() = Some(prompt.to_string());
            match &self.reply {
                Ok(value) => Ok(value.clone()),
                Err(status) => Err(LlmError::Api {
                    status: *status,
                    message: "overloaded".to_string(),
                }),
            }
        }
    }

    fn txt(text: &str) -> RawDocument {
        RawDocument::new(Bytes::from(text.to_string()), "resume.txt")
    }

    fn full_insights() -> Value {
        json!({
            "summary": "Backend engineer with six years of Rust.",
            "githubUrl": "https://github.com/jdoe",
            "linkedinUrl": null,
            "skills": [{"name": "Rust", "category": "language", "proficiency": "expert"}],
            "experience": [{"company": "Acme", "title": "Staff Engineer", "duration": "2019-2024"}],
            "education": [{"institution": "MIT", "degree": "BSc", "field": "CS", "year": "2016"}],
            "certifications": ["CKA"],
            "totalExperienceYears": 6.5
        })
    }

    #[tokio::test]
    async fn test_extract_returns_validated_insights() {
        let engine = ExtractionEngine::new(FakeGenerator::returning(full_insights()));
        let insights = engine.extract(&txt("Jane Doe\nStaff Engineer")).await.unwrap();
        assert_eq!(insights.skills[0].name, "Rust");
        assert_eq!(insights.total_experience_years, Some(6.5));
        assert_eq!(insights.certifications, vec!["CKA".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_certifications_default_to_empty() {
        let engine = ExtractionEngine::new(FakeGenerator::returning(json!({
            "summary": "New grad."
        })));
        let insights = engine.extract(&txt("Jane Doe")).await.unwrap();
        assert!(insights.certifications.is_empty());
        let value = serde_json::to_value(&insights).unwrap();
        assert_eq!(value["certifications"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_shape_is_schema_violation() {
        let engine = ExtractionEngine::new(FakeGenerator::returning(json!({
            "summary": "x",
            "skills": "Rust, Go"
        })));
        let err = engine.extract(&txt("Jane Doe")).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::SchemaViolation { ref path, .. } if path == "$.skills"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_generator_outage_is_generation_unavailable() {
        let engine = ExtractionEngine::new(FakeGenerator::failing(529));
        let err = engine.extract(&txt("Jane Doe")).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationUnavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_retryable() {
        for status in [400, 401, 403] {
            let engine = ExtractionEngine::new(FakeGenerator::failing(status));
            let err = engine.extract(&txt("Jane Doe")).await.unwrap_err();
            assert!(matches!(err, PipelineError::GenerationRejected(_)), "got {err:?}");
            assert!(!err.is_transient());
        }
    }

    #[tokio::test]
    async fn test_rate_limit_stays_generation_unavailable() {
        let engine = ExtractionEngine::new(FakeGenerator::failing(429));
        let err = engine.extract(&txt("Jane Doe")).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationUnavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_loader_failure_is_parse_failure() {
        let engine = ExtractionEngine::new(FakeGenerator::returning(full_insights()));
        let doc = RawDocument::new(Bytes::from_static(b"{\\rtf1}"), "resume.rtf");
        let err = engine.extract(&doc).await.unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure(_)));
    }

    #[tokio::test]
    async fn test_prompt_keeps_head_and_drops_tail() {
        let generator = FakeGenerator::returning(full_insights());
        let engine = ExtractionEngine::new(generator.clone());
        let text = format!("HEADER-{}-TAILMARK", "a".repeat(12_000));
        engine.extract(&txt(&text)).await.unwrap();

        let prompt = generator.seen_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("HEADER-"));
        assert!(!prompt.contains("TAILMARK"));
    }

    #[test]
    fn test_truncate_chars_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn test_negative_experience_rejected() {
        let err = validate_insights(&json!({"summary": "x", "totalExperienceYears": -1})).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { ref path, .. } if path == "$.totalExperienceYears"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = validate_insights(&json!({"summary": "x", "salary": 100})).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { ref path, .. } if path == "$.salary"));
    }

    #[test]
    fn test_nested_record_missing_required_field() {
        let err = validate_insights(&json!({
            "summary": "x",
            "education": [{"institution": "MIT"}]
        }))
        .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { ref path, .. } if path == "$.education[0].degree"));
    }

    #[test]
    fn test_missing_summary_rejected() {
        assert!(validate_insights(&json!({"skills": []})).is_err());
        assert!(validate_insights(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_backfill_fills_only_blank_links() {
        let mut insights = ResumeInsights {
            github_url: Some("https://github.com/model-said".to_string()),
            linkedin_url: Some("  ".to_string()),
            ..Default::default()
        };
        let links = vec![
            "https://github.com/jdoe".to_string(),
            "https://www.linkedin.com/in/jdoe".to_string(),
        ];
        backfill_profile_links(&mut insights, &links);
        assert_eq!(insights.github_url.as_deref(), Some("https://github.com/model-said"));
        assert_eq!(insights.linkedin_url.as_deref(), Some("https://www.linkedin.com/in/jdoe"));
    }
}
