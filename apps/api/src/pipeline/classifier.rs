//! Category Classifier: buckets a chunk into a coarse resume section by keywords.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::chunker::TextChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Experience,
    Skills,
    Projects,
    Education,
    Institute,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Experience,
        Category::Skills,
        Category::Projects,
        Category::Education,
        Category::Institute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Experience => "experience",
            Category::Skills => "skills",
            Category::Projects => "projects",
            Category::Education => "education",
            Category::Institute => "institute",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const EXPERIENCE_KEYWORDS: &[&str] = &[
    "experience",
    "employment",
    "work history",
    "worked at",
    "internship",
    "responsibilities",
];

const SKILLS_KEYWORDS: &[&str] = &[
    "skills",
    "technologies",
    "tech stack",
    "proficient",
    "programming languages",
    "frameworks",
];

const PROJECTS_KEYWORDS: &[&str] = &["project", "github", "built", "developed", "implemented"];

const EDUCATION_KEYWORDS: &[&str] = &[
    "education",
    "degree",
    "university",
    "college",
    "bachelor",
    "master",
    "gpa",
];

/// Checked in this order; the first category with a hit wins.
const RULES: [(Category, &[&str]); 4] = [
    (Category::Experience, EXPERIENCE_KEYWORDS),
    (Category::Skills, SKILLS_KEYWORDS),
    (Category::Projects, PROJECTS_KEYWORDS),
    (Category::Education, EDUCATION_KEYWORDS),
];

pub fn classify(chunk: &TextChunk) -> Category {
    classify_text(&chunk.text)
}

pub fn classify_text(text: &str) -> Category {
    let lowered = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Institute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_beats_degree() {
        let text = "Capstone project for my degree in computer science";
        assert_eq!(classify_text(text), Category::Projects);
    }

    #[test]
    fn test_experience_checked_first() {
        let text = "Skills gained through 3 years of professional experience";
        assert_eq!(classify_text(text), Category::Experience);
    }

    #[test]
    fn test_priority_ignores_keyword_counts() {
        let text = "University, college, bachelor degree, GPA 3.9, thesis project";
        assert_eq!(classify_text(text), Category::Projects);
    }

    #[test]
    fn test_case_insensitive_match() {
        assert_eq!(classify_text("TECHNICAL SKILLS: Rust, Go"), Category::Skills);
        assert_eq!(classify_text("EDUCATION"), Category::Education);
    }

    #[test]
    fn test_no_keywords_defaults_to_institute() {
        assert_eq!(classify_text("Jane Doe, San Francisco, CA"), Category::Institute);
        assert_eq!(classify_text(""), Category::Institute);
    }

    #[test]
    fn test_classify_chunk_reads_text() {
        let chunk = TextChunk {
            text: "Employment: Acme Corp".to_string(),
            source_order: 3,
        };
        assert_eq!(classify(&chunk), Category::Experience);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Category::Institute).unwrap(),
            "\"institute\""
        );
    }
}
