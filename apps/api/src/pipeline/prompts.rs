// Extraction Engine LLM prompt templates and output schema.
// All prompts for the pipeline module are defined here.

use serde_json::{json, Value};

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, TOOL_ONLY_INSTRUCTION};
use crate::llm_client::OutputSchema;

pub const INSIGHTS_TOOL_NAME: &str = "record_resume_insights";

pub fn extraction_system_prompt() -> String {
    format!(
        "You are a precise resume analyst. \
         Extract a structured profile from the resume text you are given. \
         Copy company names, titles, institutions and certifications verbatim. \
         totalExperienceYears is the sum of professional experience in years, \
         or null when it cannot be determined. \
         {GROUNDING_INSTRUCTION} {TOOL_ONLY_INSTRUCTION}"
    )
}

pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract the candidate profile from the resume below.

RESUME TEXT:
{resume_text}

RULES:
1. summary: two or three sentences describing the candidate, written in the third person.
2. githubUrl / linkedinUrl: use the links listed under "Links found in document:" when present; otherwise null.
3. skills[].category is a short grouping such as "language", "framework", "tool", "cloud" or "soft".
4. skills[].proficiency is one of "expert", "proficient", "familiar", or null when not stated.
5. Lists you find nothing for MUST be empty arrays; never omit them."#;

pub fn build_extraction_prompt(resume_text: &str) -> String {
    EXTRACTION_PROMPT_TEMPLATE.replace("{resume_text}", resume_text)
}

fn nullable_string() -> Value {
    json!({ "type": ["string", "null"] })
}

/// JSON schema describing exactly the `ResumeInsights` shape.
pub fn insights_schema() -> OutputSchema {
    OutputSchema {
        name: INSIGHTS_TOOL_NAME,
        description: "Record the structured profile extracted from a resume.",
        input_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "required": [
                "summary", "githubUrl", "linkedinUrl", "skills", "experience",
                "education", "certifications", "totalExperienceYears"
            ],
            "properties": {
                "summary": { "type": "string" },
                "githubUrl": nullable_string(),
                "linkedinUrl": nullable_string(),
                "skills": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["name", "category", "proficiency"],
                        "properties": {
                            "name": { "type": "string" },
                            "category": { "type": "string" },
                            "proficiency": nullable_string()
                        }
                    }
                },
                "experience": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["company", "title", "duration"],
                        "properties": {
                            "company": { "type": "string" },
                            "title": { "type": "string" },
                            "duration": nullable_string()
                        }
                    }
                },
                "education": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["institution", "degree", "field", "year"],
                        "properties": {
                            "institution": { "type": "string" },
                            "degree": { "type": "string" },
                            "field": nullable_string(),
                            "year": nullable_string()
                        }
                    }
                },
                "certifications": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "totalExperienceYears": {
                    "type": ["number", "null"],
                    "minimum": 0
                }
            }
        }),
    }
}
