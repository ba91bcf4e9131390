use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;

use crate::metrics::track_ai_operation;
use crate::models::{Lesson, QuestionBank, QuestionDifficulty, QuestionRecord};
use crate::services::ai_client::{extract_json_object, require_fields, AiError, ChatModel};

/// Lesson content is truncated before prompting, as the original did.
const MAX_PROMPT_LESSON_CHARS: usize = 2000;

pub struct QuestionService {
    mongo: Database,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<QuestionRecord>,
}

impl QuestionService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Generates a fresh question bank for a lesson and difficulty,
    /// replacing any previous bank for that pair.
    pub async fn generate_bank(
        &self,
        ai: &dyn ChatModel,
        lesson_id: &str,
        difficulty: QuestionDifficulty,
        question_count: u32,
    ) -> Result<QuestionBank> {
        let lessons: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        let lesson = lessons
            .find_one(doc! { "_id": lesson_id })
            .await
            .context("Failed to query lesson")?
            .ok_or_else(|| anyhow!("Lesson {} not found", lesson_id))?;

        let questions =
            generate_questions(ai, &lesson.content, difficulty, question_count).await?;

        let now = Utc::now();
        let bank = QuestionBank {
            id: QuestionBank::bank_id(lesson_id, difficulty),
            lesson_id: lesson_id.to_string(),
            difficulty,
            questions,
            usage_count: 0,
            created_at: now,
            last_updated: now,
        };

        let banks: mongodb::Collection<QuestionBank> = self.mongo.collection("question_banks");
        banks
            .replace_one(doc! { "_id": &bank.id }, &bank)
            .with_options(
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await
            .context("Failed to store question bank")?;

        tracing::info!(
            "Question bank stored for lesson {} ({}, {} questions)",
            lesson_id,
            difficulty.as_str(),
            bank.questions.len()
        );
        Ok(bank)
    }

    pub async fn get_bank(
        &self,
        lesson_id: &str,
        difficulty: QuestionDifficulty,
    ) -> Result<Option<QuestionBank>> {
        let banks: mongodb::Collection<QuestionBank> = self.mongo.collection("question_banks");
        banks
            .find_one(doc! { "_id": QuestionBank::bank_id(lesson_id, difficulty) })
            .await
            .context("Failed to query question bank")
    }
}

/// Asks the collaborator for quiz questions and keeps only the ones whose
/// structural shape holds up. A reply with no usable questions is an error.
pub async fn generate_questions(
    ai: &dyn ChatModel,
    lesson_content: &str,
    difficulty: QuestionDifficulty,
    question_count: u32,
) -> Result<Vec<QuestionRecord>, AiError> {
    let prompt = build_questions_prompt(lesson_content, difficulty, question_count);

    track_ai_operation("question_generation", async {
        let reply = ai.complete(&prompt, 0.5, 3000).await?;
        let value = extract_json_object(&reply)?;
        require_fields(&value, &["questions"])?;
        let generated: GeneratedQuestions = serde_json::from_value(value)?;

        let mut questions = Vec::with_capacity(generated.questions.len());
        for question in generated.questions {
            match question.validate_shape() {
                Ok(()) => questions.push(question),
                Err(reason) => {
                    tracing::warn!("Dropping malformed generated question: {}", reason);
                }
            }
        }

        if questions.is_empty() {
            return Err(AiError::Unusable("no usable questions generated"));
        }
        Ok(questions)
    })
    .await
}

fn build_questions_prompt(
    lesson_content: &str,
    difficulty: QuestionDifficulty,
    question_count: u32,
) -> String {
    let content: String = lesson_content.chars().take(MAX_PROMPT_LESSON_CHARS).collect();

    format!(
        r#"Create {question_count} diverse questions based on this lesson content.
Difficulty level: {difficulty}

Include variety of question types:
- Multiple choice (40%)
- Short answer (30%)
- Speaking/conversation prompts (20%)
- True/False (10%)

Lesson content:
"{content}"

Return JSON in this exact format:
{{
    "questions": [
        {{
            "question": "Question text",
            "type": "multiple_choice|short_answer|speaking|true_false",
            "correct_answer": "Correct answer",
            "options": ["option1", "option2", "option3", "option4"],
            "explanation": "Why this is correct",
            "difficulty": "easy|medium|hard",
            "category": "vocabulary|grammar|comprehension|conversation",
            "points": 10
        }}
    ]
}}"#,
        difficulty = difficulty.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionCategory, QuestionType};
    use crate::services::ai_client::MockChat;

    #[tokio::test]
    async fn generated_questions_are_parsed_and_validated() {
        let reply = r#"{
            "questions": [
                {
                    "question": "Which greeting is most professional?",
                    "type": "multiple_choice",
                    "correct_answer": "Good morning, how can I help you?",
                    "options": ["Hey", "Good morning, how can I help you?", "What?", "Yo"],
                    "explanation": "Professional greetings are polite and open.",
                    "difficulty": "easy",
                    "category": "conversation",
                    "points": 10
                },
                {
                    "question": "",
                    "type": "short_answer",
                    "correct_answer": "anything",
                    "difficulty": "easy",
                    "category": "grammar"
                }
            ]
        }"#;
        let chat = MockChat::new(vec![reply]);
        let questions = generate_questions(&chat, "lesson", QuestionDifficulty::Easy, 2)
            .await
            .unwrap();

        // The empty-text question is dropped by the shape check.
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question_type, QuestionType::MultipleChoice);
        assert_eq!(questions[0].category, QuestionCategory::Conversation);
    }

    #[tokio::test]
    async fn reply_with_only_malformed_questions_is_an_error() {
        let reply = r#"{
            "questions": [
                {
                    "question": "Pick one",
                    "type": "multiple_choice",
                    "correct_answer": "A",
                    "options": ["A"],
                    "difficulty": "easy",
                    "category": "vocabulary"
                }
            ]
        }"#;
        let chat = MockChat::new(vec![reply]);
        let err = generate_questions(&chat, "lesson", QuestionDifficulty::Easy, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Unusable(_)));
    }

    #[tokio::test]
    async fn unknown_category_fails_parsing() {
        let reply = r#"{
            "questions": [
                {
                    "question": "What?",
                    "type": "short_answer",
                    "correct_answer": "This",
                    "difficulty": "easy",
                    "category": "astrology"
                }
            ]
        }"#;
        let chat = MockChat::new(vec![reply]);
        let err = generate_questions(&chat, "lesson", QuestionDifficulty::Easy, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Json(_)));
    }
}
