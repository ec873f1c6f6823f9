use serde::{Deserialize, Serialize};

/// Structured profile produced by the extraction engine.
///
/// List fields always serialize (empty when nothing was found) and optional
/// scalars serialize as explicit `null`, so consumers never see a missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInsights {
    pub summary: String,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub total_experience_years: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_payload_defaults_lists_to_empty() {
        let insights: ResumeInsights =
            serde_json::from_str(r#"{"summary": "Backend engineer"}"#).unwrap();
        assert!(insights.certifications.is_empty());
        assert!(insights.skills.is_empty());
        assert_eq!(insights.github_url, None);
    }

    #[test]
    fn test_serializes_every_key_with_explicit_nulls() {
        let value = serde_json::to_value(ResumeInsights::default()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "summary",
            "githubUrl",
            "linkedinUrl",
            "skills",
            "experience",
            "education",
            "certifications",
            "totalExperienceYears",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert!(obj["githubUrl"].is_null());
        assert_eq!(obj["certifications"], serde_json::json!([]));
    }
}
