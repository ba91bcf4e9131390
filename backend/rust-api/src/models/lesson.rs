use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::question::{QuestionDifficulty, QuestionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Ready,
    Error,
}

/// Raw educational text registered for course generation. File upload and
/// PDF extraction happen upstream; this record starts from extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSource {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub raw_content: String,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub content_source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub total_lessons: u32,
    pub learning_objectives: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_required_score() -> f64 {
    90.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(rename = "_id")]
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub content: String,
    pub learning_objectives: Vec<String>,
    pub key_vocabulary: std::collections::HashMap<String, String>,
    pub lesson_number: u32,
    pub base_difficulty: QuestionDifficulty,
    /// Minimum aggregate score for the lesson to count as completed.
    #[serde(default = "default_required_score")]
    pub required_score: f64,
    pub estimated_duration_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Generated questions for one (lesson, difficulty) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(rename = "_id")]
    pub id: String,
    pub lesson_id: String,
    pub difficulty: QuestionDifficulty,
    pub questions: Vec<QuestionRecord>,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl QuestionBank {
    /// Banks are keyed by lesson and difficulty so regeneration replaces
    /// the previous set.
    pub fn bank_id(lesson_id: &str, difficulty: QuestionDifficulty) -> String {
        format!("{}:{}", lesson_id, difficulty.as_str())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContentSourceRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 50, message = "content too short to build a course from"))]
    pub raw_content: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessContentSourceRequest {
    #[serde(default = "default_target_lessons")]
    pub target_lessons: u32,
}

fn default_target_lessons() -> u32 {
    10
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateQuestionsRequest {
    pub difficulty: QuestionDifficulty,
    #[validate(range(min = 1, max = 50))]
    #[serde(default = "default_question_count")]
    pub question_count: u32,
}

fn default_question_count() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct QuestionBankQuery {
    pub difficulty: Option<QuestionDifficulty>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_id_is_stable_per_lesson_and_difficulty() {
        assert_eq!(
            QuestionBank::bank_id("lesson-1", QuestionDifficulty::Hard),
            "lesson-1:hard"
        );
    }

    #[test]
    fn content_source_request_rejects_short_content() {
        let req = CreateContentSourceRequest {
            title: "Workplace safety".to_string(),
            raw_content: "too short".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
