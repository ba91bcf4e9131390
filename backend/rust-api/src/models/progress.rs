use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::question::QuestionCategory;

/// Per-user, per-course learning progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub current_lesson_id: Option<String>,
    pub completion_percentage: f64,
    pub lessons_completed: Vec<String>,
    pub lesson_scores: HashMap<String, f64>,
    pub weak_areas: Vec<QuestionCategory>,
    pub strong_areas: Vec<QuestionCategory>,
    /// Consecutive calendar days with at least one finished attempt.
    pub study_streak: u32,
    pub last_accessed: DateTime<Utc>,
    pub next_review_date: Option<DateTime<Utc>>,
}

impl UserProgress {
    pub fn progress_id(user_id: &str, course_id: &str) -> String {
        format!("{}:{}", user_id, course_id)
    }

    pub fn new(user_id: String, course_id: String) -> Self {
        Self {
            id: Self::progress_id(&user_id, &course_id),
            user_id,
            course_id,
            current_lesson_id: None,
            completion_percentage: 0.0,
            lessons_completed: Vec::new(),
            lesson_scores: HashMap::new(),
            weak_areas: Vec::new(),
            strong_areas: Vec::new(),
            study_streak: 0,
            last_accessed: Utc::now(),
            next_review_date: None,
        }
    }
}

/// Advances a study streak given the previous study timestamp: same day
/// keeps it, the next day extends it, anything longer starts over.
pub fn advance_streak(streak: u32, last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let last_day = last_accessed.date_naive();
    let today = now.date_naive();
    if today == last_day {
        streak.max(1)
    } else if today == last_day + Duration::days(1) {
        streak + 1
    } else {
        1
    }
}

/// AI-generated personalized lesson sequence for a user and course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub recommended_sequence: Vec<String>,
    pub difficulty_adjustments: HashMap<String, String>,
    pub focus_areas: Vec<String>,
    pub estimated_completion_weeks: Option<f64>,
    pub review_schedule: serde_json::Value,
    pub adaptive_rules: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl LearningPath {
    pub fn path_id(user_id: &str, course_id: &str) -> String {
        format!("{}:{}", user_id, course_id)
    }
}

/// One lesson due for re-surfacing.
#[derive(Debug, Serialize)]
pub struct DueReview {
    pub course_id: String,
    pub current_lesson_id: Option<String>,
    pub next_review_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn same_day_study_keeps_the_streak() {
        assert_eq!(advance_streak(4, at(10, 8), at(10, 22)), 4);
    }

    #[test]
    fn next_day_study_extends_the_streak() {
        assert_eq!(advance_streak(4, at(10, 23), at(11, 1)), 5);
    }

    #[test]
    fn a_gap_resets_the_streak() {
        assert_eq!(advance_streak(9, at(10, 12), at(13, 12)), 1);
    }

    #[test]
    fn fresh_progress_starts_at_zero() {
        let p = UserProgress::new("u1".into(), "c1".into());
        assert_eq!(p.id, "u1:c1");
        assert_eq!(p.completion_percentage, 0.0);
        assert!(p.next_review_date.is_none());
    }
}
