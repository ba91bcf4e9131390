use serde::{Deserialize, Serialize};

/// Category tags used for per-session failure tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Vocabulary,
    Grammar,
    Comprehension,
    Conversation,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Vocabulary => "vocabulary",
            QuestionCategory::Grammar => "grammar",
            QuestionCategory::Comprehension => "comprehension",
            QuestionCategory::Conversation => "conversation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionDifficulty {
    Easy,
    Medium,
    Hard,
}

impl QuestionDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionDifficulty::Easy => "easy",
            QuestionDifficulty::Medium => "medium",
            QuestionDifficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    Speaking,
    TrueFalse,
}

fn default_points() -> i32 {
    10
}

/// One generated quiz question. Immutable once it enters a question bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub correct_answer: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub explanation: Option<String>,
    pub difficulty: QuestionDifficulty,
    pub category: QuestionCategory,
    #[serde(default = "default_points")]
    pub points: i32,
}

impl QuestionRecord {
    /// Structural shape check applied when generated questions enter a
    /// bank. Semantic correctness is the generator's problem, not ours.
    pub fn validate_shape(&self) -> Result<(), &'static str> {
        if self.question.trim().is_empty() {
            return Err("question text is empty");
        }
        if self.correct_answer.trim().is_empty() {
            return Err("correct answer is empty");
        }
        if self.question_type == QuestionType::MultipleChoice
            && self.options.as_ref().map_or(true, |o| o.len() < 2)
        {
            return Err("multiple choice question needs at least two options");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType) -> QuestionRecord {
        QuestionRecord {
            question: "What does 'ubiquitous' mean?".to_string(),
            question_type,
            correct_answer: "present everywhere".to_string(),
            options: None,
            explanation: None,
            difficulty: QuestionDifficulty::Medium,
            category: QuestionCategory::Vocabulary,
            points: 10,
        }
    }

    #[test]
    fn short_answer_shape_is_valid_without_options() {
        assert!(question(QuestionType::ShortAnswer).validate_shape().is_ok());
    }

    #[test]
    fn multiple_choice_requires_options() {
        let mut q = question(QuestionType::MultipleChoice);
        assert!(q.validate_shape().is_err());

        q.options = Some(vec!["everywhere".to_string(), "nowhere".to_string()]);
        assert!(q.validate_shape().is_ok());
    }

    #[test]
    fn empty_question_text_is_rejected() {
        let mut q = question(QuestionType::ShortAnswer);
        q.question = "   ".to_string();
        assert!(q.validate_shape().is_err());
    }

    #[test]
    fn category_round_trips_through_serde() {
        let json = serde_json::to_string(&QuestionCategory::Comprehension).unwrap();
        assert_eq!(json, "\"comprehension\"");
        let parsed: QuestionCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, QuestionCategory::Comprehension);
    }
}
