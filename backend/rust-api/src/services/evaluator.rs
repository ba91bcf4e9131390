use crate::models::{AnswerEvaluation, QuestionRecord, QuestionType};

/// Scores at or above this count as a correct answer.
pub const CORRECT_THRESHOLD: f64 = 70.0;

/// Evaluates one submitted answer against its question. Deterministic:
/// choice questions are exact normalized matches, free-text answers get a
/// completeness heuristic.
pub fn evaluate(question: &QuestionRecord, submitted: &str) -> AnswerEvaluation {
    let score = match question.question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            if normalize(submitted) == normalize(&question.correct_answer) {
                100.0
            } else {
                0.0
            }
        }
        QuestionType::ShortAnswer | QuestionType::Speaking => free_text_score(question, submitted),
    };

    AnswerEvaluation {
        submitted: submitted.to_string(),
        score,
        is_correct: score >= CORRECT_THRESHOLD,
        feedback: Some(feedback_for(score)),
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Completeness heuristic for free-text answers: response length, overlap
/// with the expected answer's keywords, and sentence structure.
fn free_text_score(question: &QuestionRecord, response: &str) -> f64 {
    let trimmed = response.trim();
    if normalize(response) == normalize(&question.correct_answer) {
        return 100.0;
    }
    if trimmed.len() < 10 {
        return 0.0;
    }

    let mut score: f64 = 0.0;

    if trimmed.len() > 50 {
        score += 30.0;
    }
    if trimmed.len() > 100 {
        score += 20.0;
    }
    if trimmed.len() > 200 {
        score += 10.0;
    }

    let response_lower = normalize(response);
    let matched_keywords = question
        .correct_answer
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .filter(|w| response_lower.contains(w.as_str()))
        .count();
    score += (matched_keywords as f64 * 10.0).min(40.0);

    let sentences = trimmed
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();
    if sentences >= 2 {
        score += 10.0;
    }
    if sentences >= 3 {
        score += 10.0;
    }

    score.min(100.0)
}

fn feedback_for(score: f64) -> String {
    if score >= 80.0 {
        "Excellent answer! You showed a solid understanding of the topic.".to_string()
    } else if score >= 60.0 {
        "Good answer! You got the idea, try to be more specific next time.".to_string()
    } else if score >= 40.0 {
        "Partially right, but try to develop your thoughts further.".to_string()
    } else {
        "Try to answer in more detail and focus on the question asked.".to_string()
    }
}
