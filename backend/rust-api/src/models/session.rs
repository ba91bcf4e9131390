use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::attempt::{aggregate_score, AnswerRecord};
use super::question::{QuestionCategory, QuestionDifficulty, QuestionRecord, QuestionType};

/// Rolling difficulty baseline for a fresh session.
pub const BASELINE_DIFFICULTY: f64 = 50.0;
/// Step applied to the rolling difficulty score. The same constant is used
/// for the increase on a correct answer and the decrease on an incorrect
/// one.
pub const DIFFICULTY_STEP: f64 = 5.0;
pub const DIFFICULTY_FLOOR: f64 = 0.0;
pub const DIFFICULTY_CEILING: f64 = 100.0;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation not allowed in session state {0:?}")]
    InvalidState(SessionState),
    #[error("no questions available for this session")]
    NoQuestionsAvailable,
    #[error("answer record is missing a usable {0}")]
    MalformedAnswer(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InProgress,
    Completed,
}

/// Outcome of evaluating one submitted answer, before it is applied to the
/// session.
#[derive(Debug, Clone)]
pub struct AnswerEvaluation {
    pub submitted: String,
    pub score: f64,
    pub is_correct: bool,
    pub feedback: Option<String>,
}

/// Live state of one test run. Stored as JSON in Redis while active;
/// frozen once `state` reaches `Completed`.
///
/// Invariant: `current_question_index` is a valid index into `questions`
/// whenever the session has questions; it is never advanced past the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub id: String,
    pub user_id: String,
    pub lesson_id: String,
    pub attempt_id: String,
    pub questions: Vec<QuestionRecord>,
    pub current_question_index: usize,
    pub state: SessionState,
    pub difficulty_score: f64,
    /// Semantically a set: categories are recorded at most once.
    pub failed_categories: Vec<QuestionCategory>,
    pub answers: Vec<AnswerRecord>,
    pub current_score: f64,
    /// Compatibility switch: when set, exhausting the question sequence
    /// wraps the pointer back to the first question instead of completing
    /// the session (the behavior of the legacy course player).
    pub recycle_questions: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestSession {
    pub fn new(
        id: String,
        user_id: String,
        lesson_id: String,
        attempt_id: String,
        questions: Vec<QuestionRecord>,
        recycle_questions: bool,
    ) -> Self {
        Self {
            id,
            user_id,
            lesson_id,
            attempt_id,
            questions,
            current_question_index: 0,
            state: SessionState::NotStarted,
            difficulty_score: BASELINE_DIFFICULTY,
            failed_categories: Vec::new(),
            answers: Vec::new(),
            current_score: 0.0,
            recycle_questions,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// The question under the pointer, available only while answers may be
    /// submitted.
    pub fn current_question(&self) -> Result<&QuestionRecord, SessionError> {
        if self.questions.is_empty() {
            return Err(SessionError::NoQuestionsAvailable);
        }
        match self.state {
            SessionState::InProgress => Ok(&self.questions[self.current_question_index]),
            state => Err(SessionError::InvalidState(state)),
        }
    }

    /// Serves the question under the pointer. The first successful call is
    /// the session's single `NotStarted -> InProgress` transition.
    pub fn next_question(&mut self) -> Result<&QuestionRecord, SessionError> {
        if self.questions.is_empty() {
            return Err(SessionError::NoQuestionsAvailable);
        }
        match self.state {
            SessionState::Completed => Err(SessionError::InvalidState(SessionState::Completed)),
            SessionState::NotStarted | SessionState::InProgress => {
                self.state = SessionState::InProgress;
                Ok(&self.questions[self.current_question_index])
            }
        }
    }

    /// Applies one evaluated answer to the session.
    ///
    /// All-or-nothing: the answer list, running score, rolling difficulty,
    /// failed-category set and question pointer move together, or the
    /// session is left untouched and an error is returned.
    pub fn record_answer(&mut self, evaluation: AnswerEvaluation) -> Result<(), SessionError> {
        match self.state {
            SessionState::InProgress => {}
            state => return Err(SessionError::InvalidState(state)),
        }
        if self.questions.is_empty() {
            return Err(SessionError::NoQuestionsAvailable);
        }
        if !evaluation.score.is_finite() {
            return Err(SessionError::MalformedAnswer("score"));
        }

        let question = &self.questions[self.current_question_index];
        let category = question.category;
        let record = AnswerRecord {
            question_index: self.current_question_index,
            question_text: question.question.clone(),
            correct_answer: question.correct_answer.clone(),
            user_answer: evaluation.submitted,
            score: evaluation.score,
            is_correct: evaluation.is_correct,
            feedback: evaluation.feedback,
            created_at: Utc::now(),
        };

        if record.is_correct {
            self.difficulty_score =
                (self.difficulty_score + DIFFICULTY_STEP).min(DIFFICULTY_CEILING);
        } else {
            if !self.failed_categories.contains(&category) {
                self.failed_categories.push(category);
            }
            self.difficulty_score = (self.difficulty_score - DIFFICULTY_STEP).max(DIFFICULTY_FLOOR);
        }

        self.answers.push(record);
        self.current_score = aggregate_score(&self.answers);
        self.advance_pointer();
        Ok(())
    }

    /// Explicitly ends an in-progress session early.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::InProgress => {
                self.complete();
                Ok(())
            }
            state => Err(SessionError::InvalidState(state)),
        }
    }

    /// The rolling difficulty mapped onto the discrete tags, for selecting
    /// a follow-up question bank.
    pub fn suggested_difficulty(&self) -> QuestionDifficulty {
        if self.difficulty_score < 35.0 {
            QuestionDifficulty::Easy
        } else if self.difficulty_score < 70.0 {
            QuestionDifficulty::Medium
        } else {
            QuestionDifficulty::Hard
        }
    }

    fn advance_pointer(&mut self) {
        let next = self.current_question_index + 1;
        if next < self.questions.len() {
            self.current_question_index = next;
        } else if self.recycle_questions {
            self.current_question_index = 0;
        } else {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.state = SessionState::Completed;
        self.completed_at = Some(Utc::now());
    }
}

/// Read view of a session. Expected answers stay on the server.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub user_id: String,
    pub lesson_id: String,
    pub attempt_id: String,
    pub state: SessionState,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub answers_recorded: usize,
    pub current_score: f64,
    pub difficulty_score: f64,
    pub failed_categories: Vec<QuestionCategory>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TestSession> for SessionSummary {
    fn from(session: &TestSession) -> Self {
        Self {
            id: session.id.clone(),
            user_id: session.user_id.clone(),
            lesson_id: session.lesson_id.clone(),
            attempt_id: session.attempt_id.clone(),
            state: session.state,
            current_question_index: session.current_question_index,
            total_questions: session.questions.len(),
            answers_recorded: session.answers.len(),
            current_score: session.current_score,
            difficulty_score: session.difficulty_score,
            failed_categories: session.failed_categories.clone(),
            started_at: session.started_at,
            completed_at: session.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub lesson_id: String,
    #[serde(default)]
    pub difficulty: Option<QuestionDifficulty>,
    #[serde(default)]
    pub recycle_questions: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub attempt_id: String,
    pub lesson_id: String,
    pub total_questions: usize,
    pub expires_at: DateTime<Utc>,
}

/// The question as served to the client: the expected answer stays on the
/// server.
#[derive(Debug, Serialize)]
pub struct NextQuestionResponse {
    pub index: usize,
    pub total_questions: usize,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub difficulty: QuestionDifficulty,
    pub category: QuestionCategory,
    pub points: i32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub correct: bool,
    pub score: f64,
    pub feedback: Option<String>,
    pub running_score: f64,
    pub difficulty_score: f64,
    pub failed_categories: Vec<QuestionCategory>,
    pub session_completed: bool,
    pub aggregate_score: Option<f64>,
    pub next_due: Option<DateTime<Utc>>,
    /// Set once the session completes: which bank to pick next time.
    pub suggested_next_difficulty: Option<QuestionDifficulty>,
}

#[derive(Debug, Serialize)]
pub struct CompleteSessionResponse {
    pub session_id: String,
    pub attempt_id: String,
    pub aggregate_score: f64,
    pub next_due: DateTime<Utc>,
    pub answers_recorded: usize,
    pub suggested_next_difficulty: QuestionDifficulty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(category: QuestionCategory) -> QuestionRecord {
        QuestionRecord {
            question: format!("{} question", category.as_str()),
            question_type: QuestionType::ShortAnswer,
            correct_answer: "expected".to_string(),
            options: None,
            explanation: None,
            difficulty: QuestionDifficulty::Medium,
            category,
            points: 10,
        }
    }

    fn session(questions: Vec<QuestionRecord>) -> TestSession {
        TestSession::new(
            "s1".into(),
            "u1".into(),
            "l1".into(),
            "a1".into(),
            questions,
            false,
        )
    }

    fn correct(score: f64) -> AnswerEvaluation {
        AnswerEvaluation {
            submitted: "expected".to_string(),
            score,
            is_correct: true,
            feedback: None,
        }
    }

    fn incorrect(score: f64) -> AnswerEvaluation {
        AnswerEvaluation {
            submitted: "something else".to_string(),
            score,
            is_correct: false,
            feedback: None,
        }
    }

    #[test]
    fn answering_before_first_question_is_rejected() {
        let mut s = session(vec![question(QuestionCategory::Grammar)]);
        let err = s.record_answer(correct(100.0)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState(SessionState::NotStarted)
        ));
        assert!(s.answers.is_empty());
    }

    #[test]
    fn first_question_starts_the_session_exactly_once() {
        let mut s = session(vec![
            question(QuestionCategory::Grammar),
            question(QuestionCategory::Vocabulary),
        ]);
        assert_eq!(s.state, SessionState::NotStarted);

        s.next_question().unwrap();
        assert_eq!(s.state, SessionState::InProgress);

        // Serving again does not restart anything.
        s.next_question().unwrap();
        assert_eq!(s.state, SessionState::InProgress);
        assert_eq!(s.current_question_index, 0);
    }

    #[test]
    fn empty_question_set_yields_no_questions_available() {
        let mut s = session(Vec::new());
        assert!(matches!(
            s.next_question(),
            Err(SessionError::NoQuestionsAvailable)
        ));
        assert_eq!(s.state, SessionState::NotStarted);
    }

    #[test]
    fn completed_session_rejects_answers_and_questions() {
        let mut s = session(vec![question(QuestionCategory::Grammar)]);
        s.next_question().unwrap();
        s.record_answer(correct(100.0)).unwrap();
        assert!(s.is_completed());

        assert!(matches!(
            s.next_question(),
            Err(SessionError::InvalidState(SessionState::Completed))
        ));
        assert!(matches!(
            s.record_answer(correct(100.0)),
            Err(SessionError::InvalidState(SessionState::Completed))
        ));
        assert_eq!(s.answers.len(), 1);
    }

    #[test]
    fn non_finite_score_is_rejected_without_side_effects() {
        let mut s = session(vec![
            question(QuestionCategory::Grammar),
            question(QuestionCategory::Vocabulary),
        ]);
        s.next_question().unwrap();

        let err = s.record_answer(incorrect(f64::NAN)).unwrap_err();
        assert!(matches!(err, SessionError::MalformedAnswer("score")));

        // Nothing moved: all-or-nothing per submission.
        assert!(s.answers.is_empty());
        assert_eq!(s.current_question_index, 0);
        assert_eq!(s.difficulty_score, BASELINE_DIFFICULTY);
        assert!(s.failed_categories.is_empty());
    }

    #[test]
    fn difficulty_never_leaves_its_bounds() {
        let questions: Vec<_> = (0..30).map(|_| question(QuestionCategory::Grammar)).collect();
        let mut s = session(questions.clone());
        s.next_question().unwrap();
        for _ in 0..25 {
            s.record_answer(incorrect(0.0)).unwrap();
        }
        assert_eq!(s.difficulty_score, DIFFICULTY_FLOOR);

        let mut s = session(questions);
        s.next_question().unwrap();
        for _ in 0..25 {
            s.record_answer(correct(100.0)).unwrap();
        }
        assert_eq!(s.difficulty_score, DIFFICULTY_CEILING);
    }

    #[test]
    fn failed_categories_behave_as_a_set() {
        let mut s = session(vec![
            question(QuestionCategory::Vocabulary),
            question(QuestionCategory::Vocabulary),
            question(QuestionCategory::Grammar),
        ]);
        s.next_question().unwrap();
        s.record_answer(incorrect(10.0)).unwrap();
        s.record_answer(incorrect(20.0)).unwrap();
        s.record_answer(incorrect(0.0)).unwrap();

        assert_eq!(
            s.failed_categories,
            vec![QuestionCategory::Vocabulary, QuestionCategory::Grammar]
        );
    }

    #[test]
    fn exhausting_the_sequence_completes_by_default() {
        let mut s = session(vec![
            question(QuestionCategory::Grammar),
            question(QuestionCategory::Vocabulary),
        ]);
        s.next_question().unwrap();
        s.record_answer(correct(100.0)).unwrap();
        assert_eq!(s.current_question_index, 1);
        assert!(!s.is_completed());

        s.record_answer(correct(100.0)).unwrap();
        assert!(s.is_completed());
        assert!(s.completed_at.is_some());
        // Pointer stays frozen at the last served index.
        assert_eq!(s.current_question_index, 1);
    }

    #[test]
    fn recycle_option_wraps_instead_of_completing() {
        let mut s = TestSession::new(
            "s1".into(),
            "u1".into(),
            "l1".into(),
            "a1".into(),
            vec![
                question(QuestionCategory::Grammar),
                question(QuestionCategory::Vocabulary),
            ],
            true,
        );
        s.next_question().unwrap();
        s.record_answer(correct(100.0)).unwrap();
        s.record_answer(correct(100.0)).unwrap();

        assert!(!s.is_completed());
        assert_eq!(s.current_question_index, 0);

        // The recycling session still ends when asked to.
        s.finish().unwrap();
        assert!(s.is_completed());
    }

    #[test]
    fn explicit_finish_requires_in_progress() {
        let mut s = session(vec![question(QuestionCategory::Grammar)]);
        assert!(matches!(
            s.finish(),
            Err(SessionError::InvalidState(SessionState::NotStarted))
        ));

        s.next_question().unwrap();
        s.finish().unwrap();
        assert!(matches!(
            s.finish(),
            Err(SessionError::InvalidState(SessionState::Completed))
        ));
    }

    #[test]
    fn running_score_tracks_the_mean() {
        let mut s = session(vec![
            question(QuestionCategory::Grammar),
            question(QuestionCategory::Vocabulary),
            question(QuestionCategory::Comprehension),
        ]);
        s.next_question().unwrap();
        s.record_answer(correct(100.0)).unwrap();
        s.record_answer(incorrect(40.0)).unwrap();
        assert!((s.current_score - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn suggested_difficulty_follows_the_rolling_score() {
        let mut s = session(vec![question(QuestionCategory::Grammar); 20]);
        assert_eq!(s.suggested_difficulty(), QuestionDifficulty::Medium);

        s.next_question().unwrap();
        for _ in 0..4 {
            s.record_answer(incorrect(0.0)).unwrap();
        }
        assert_eq!(s.suggested_difficulty(), QuestionDifficulty::Easy);
    }
}
