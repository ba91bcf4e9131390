use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// CEFR proficiency levels, as determined by the placement analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    /// Lesson number a user at this level should start from.
    pub fn starting_lesson_number(&self) -> u32 {
        match self {
            CefrLevel::A1 => 1,
            CefrLevel::A2 => 3,
            CefrLevel::B1 => 6,
            CefrLevel::B2 => 10,
            CefrLevel::C1 => 15,
            CefrLevel::C2 => 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementTest {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub instructions: String,
    /// Minimum characters of free text required for a useful analysis.
    pub min_text_length: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Parsed analysis reply from the placement collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementAnalysis {
    pub level: CefrLevel,
    pub confidence: f64,
    #[serde(default)]
    pub detailed_analysis: serde_json::Value,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommended_focus: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub estimated_study_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementResult {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub placement_test_id: Option<String>,
    pub raw_text_input: String,
    pub analysis: PlacementAnalysis,
    pub determined_level: CefrLevel,
    pub confidence_score: f64,
    pub recommended_start_lesson: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlacementTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub instructions: String,
    #[serde(default = "default_min_text_length")]
    pub min_text_length: u32,
}

fn default_min_text_length() -> u32 {
    100
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitPlacementRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[serde(default)]
    pub placement_test_id: Option<String>,
    /// Analysis below 50 characters is refused outright; individual tests
    /// may demand more via `min_text_length`.
    #[validate(length(min = 50, message = "text too short for accurate analysis"))]
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Course to pick a recommended starting lesson from.
    #[serde(default)]
    pub course_id: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_starting_lessons() {
        assert_eq!(CefrLevel::A1.starting_lesson_number(), 1);
        assert_eq!(CefrLevel::A2.starting_lesson_number(), 3);
        assert_eq!(CefrLevel::B1.starting_lesson_number(), 6);
        assert_eq!(CefrLevel::B2.starting_lesson_number(), 10);
        assert_eq!(CefrLevel::C1.starting_lesson_number(), 15);
        assert_eq!(CefrLevel::C2.starting_lesson_number(), 20);
    }

    #[test]
    fn level_serializes_as_plain_tag() {
        assert_eq!(serde_json::to_string(&CefrLevel::B2).unwrap(), "\"B2\"");
        let parsed: CefrLevel = serde_json::from_str("\"C1\"").unwrap();
        assert_eq!(parsed, CefrLevel::C1);
    }

    #[test]
    fn short_placement_text_fails_validation() {
        let req = SubmitPlacementRequest {
            user_id: "u1".to_string(),
            placement_test_id: None,
            text: "Hello.".to_string(),
            language: "en".to_string(),
            course_id: None,
        };
        assert!(req.validate().is_err());
    }
}
