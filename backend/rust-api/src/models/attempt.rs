use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::srs;

/// One answer inside an attempt. Created at submission time, immutable
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question_text: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub score: f64,
    pub is_correct: bool,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    InProgress,
    Completed,
}

/// Durable record of one full pass by a user through a lesson's question
/// set. The aggregate score is derived, never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub lesson_id: String,
    pub status: AttemptStatus,
    pub score: Option<f64>,
    pub answers: Vec<AnswerRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_due: Option<DateTime<Utc>>,
}

/// Attempt Scorer: arithmetic mean of the answer scores. An attempt with
/// no answers scores `0.0` rather than being undefined.
pub fn aggregate_score(answers: &[AnswerRecord]) -> f64 {
    if answers.is_empty() {
        return 0.0;
    }
    answers.iter().map(|a| a.score).sum::<f64>() / answers.len() as f64
}

impl Attempt {
    pub fn new(id: String, user_id: String, lesson_id: String) -> Self {
        Self {
            id,
            user_id,
            lesson_id,
            status: AttemptStatus::Pending,
            score: None,
            answers: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            next_due: None,
        }
    }

    pub fn start(&mut self) {
        if self.status == AttemptStatus::Pending {
            self.status = AttemptStatus::InProgress;
        }
    }

    /// Freezes the attempt: stores the answers, derives the aggregate
    /// score and schedules the next review from the completion timestamp.
    pub fn finalize(&mut self, answers: Vec<AnswerRecord>, completed_at: DateTime<Utc>) {
        let score = aggregate_score(&answers);
        self.answers = answers;
        self.score = Some(score);
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(completed_at);
        self.next_due = Some(srs::next_due(Some(score), completed_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn answer(score: f64) -> AnswerRecord {
        AnswerRecord {
            question_index: 0,
            question_text: "q".to_string(),
            correct_answer: "a".to_string(),
            user_answer: "a".to_string(),
            score,
            is_correct: score >= 70.0,
            feedback: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn aggregate_is_arithmetic_mean() {
        let answers = vec![answer(100.0), answer(40.0), answer(70.0)];
        assert!((aggregate_score(&answers) - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_attempt_scores_zero() {
        assert_eq!(aggregate_score(&[]), 0.0);
    }

    #[test]
    fn finalize_derives_score_and_next_due() {
        let completed_at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let mut attempt = Attempt::new("a1".into(), "u1".into(), "l1".into());
        attempt.start();

        attempt.finalize(vec![answer(80.0), answer(90.0)], completed_at);

        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert_eq!(attempt.score, Some(85.0));
        assert_eq!(attempt.completed_at, Some(completed_at));
        // 85 sits in the seven-day review bracket.
        assert_eq!(attempt.next_due, Some(completed_at + Duration::days(7)));
    }

    #[test]
    fn finalize_with_all_wrong_answers_schedules_relearn() {
        let completed_at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let mut attempt = Attempt::new("a2".into(), "u1".into(), "l1".into());

        attempt.finalize(vec![answer(0.0), answer(0.0)], completed_at);

        assert_eq!(attempt.score, Some(0.0));
        assert_eq!(attempt.next_due, Some(completed_at + Duration::days(3)));
    }
}
