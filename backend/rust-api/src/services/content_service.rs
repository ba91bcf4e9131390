use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;
use uuid::Uuid;

use crate::metrics::track_ai_operation;
use crate::models::{
    ContentSource, Course, CourseStatus, Lesson, ProcessingStatus, QuestionDifficulty,
};
use crate::services::ai_client::{extract_json_object, require_fields, AiError, ChatModel};

/// Raw content is truncated before prompting, as the original pipeline did.
const MAX_PROMPT_CONTENT_CHARS: usize = 8000;

pub struct ContentService {
    mongo: Database,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedCourse {
    pub course_title: String,
    #[serde(default)]
    pub course_description: Option<String>,
    #[serde(default)]
    pub total_estimated_hours: Option<f64>,
    pub lessons: Vec<GeneratedLesson>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedLesson {
    pub title: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub key_vocabulary: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub lesson_number: Option<u32>,
}

impl ContentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn create_source(&self, title: String, raw_content: String) -> Result<ContentSource> {
        let source = ContentSource {
            id: Uuid::new_v4().to_string(),
            title,
            raw_content,
            processing_status: ProcessingStatus::Processing,
            processing_error: None,
            created_at: Utc::now(),
            processed_at: None,
        };

        let collection: mongodb::Collection<ContentSource> =
            self.mongo.collection("content_sources");
        collection
            .insert_one(&source)
            .await
            .context("Failed to store content source")?;

        tracing::info!("Content source registered: {} ({})", source.id, source.title);
        Ok(source)
    }

    pub async fn get_source(&self, source_id: &str) -> Result<ContentSource> {
        let collection: mongodb::Collection<ContentSource> =
            self.mongo.collection("content_sources");
        collection
            .find_one(doc! { "_id": source_id })
            .await
            .context("Failed to query content source")?
            .ok_or_else(|| anyhow!("Content source {} not found", source_id))
    }

    /// Turns a registered content source into a course with lessons via the
    /// generation collaborator. The source's status tracks the outcome.
    pub async fn process_source(
        &self,
        ai: &dyn ChatModel,
        source_id: &str,
        target_lessons: u32,
    ) -> Result<Course> {
        let source = self.get_source(source_id).await?;
        if source.raw_content.trim().is_empty() {
            return Err(anyhow!("No raw content available for processing"));
        }

        let ai_result = generate_course(ai, &source.raw_content, target_lessons).await;

        let generated = match ai_result {
            Ok(generated) => generated,
            Err(e) => {
                self.mark_source_error(&source.id, &e.to_string()).await;
                return Err(e).context("Course generation failed");
            }
        };

        let course = self.store_course(&source, generated).await?;
        self.mark_source_ready(&source.id).await;

        tracing::info!(
            "Course {} generated from source {} with {} lessons",
            course.id,
            source.id,
            course.total_lessons
        );
        Ok(course)
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let collection: mongodb::Collection<Course> = self.mongo.collection("courses");
        let cursor = collection
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .await
            .context("Failed to query courses")?;
        cursor.try_collect().await.context("Failed to collect courses")
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Course> {
        let collection: mongodb::Collection<Course> = self.mongo.collection("courses");
        collection
            .find_one(doc! { "_id": course_id })
            .await
            .context("Failed to query course")?
            .ok_or_else(|| anyhow!("Course {} not found", course_id))
    }

    pub async fn list_lessons(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let collection: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        let cursor = collection
            .find(doc! { "course_id": course_id })
            .sort(doc! { "lesson_number": 1 })
            .await
            .context("Failed to query lessons")?;
        cursor.try_collect().await.context("Failed to collect lessons")
    }

    pub async fn get_lesson(&self, lesson_id: &str) -> Result<Lesson> {
        let collection: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        collection
            .find_one(doc! { "_id": lesson_id })
            .await
            .context("Failed to query lesson")?
            .ok_or_else(|| anyhow!("Lesson {} not found", lesson_id))
    }

    async fn store_course(&self, source: &ContentSource, generated: GeneratedCourse) -> Result<Course> {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4().to_string(),
            content_source_id: source.id.clone(),
            title: generated.course_title.clone(),
            description: generated.course_description.clone(),
            total_lessons: generated.lessons.len() as u32,
            learning_objectives: generated
                .lessons
                .iter()
                .flat_map(|l| l.learning_objectives.iter().cloned())
                .collect(),
            estimated_hours: generated.total_estimated_hours,
            status: CourseStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let courses: mongodb::Collection<Course> = self.mongo.collection("courses");
        courses
            .insert_one(&course)
            .await
            .context("Failed to store course")?;

        let lessons: Vec<Lesson> = generated
            .lessons
            .into_iter()
            .enumerate()
            .map(|(i, l)| Lesson {
                id: Uuid::new_v4().to_string(),
                course_id: course.id.clone(),
                title: l.title,
                content: l.content,
                learning_objectives: l.learning_objectives,
                key_vocabulary: l.key_vocabulary,
                lesson_number: l.lesson_number.unwrap_or(i as u32 + 1),
                base_difficulty: parse_difficulty(l.difficulty.as_deref()),
                required_score: 90.0,
                estimated_duration_minutes: l.estimated_duration,
                created_at: now,
            })
            .collect();

        let lessons_collection: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        lessons_collection
            .insert_many(&lessons)
            .await
            .context("Failed to store lessons")?;

        Ok(course)
    }

    async fn mark_source_ready(&self, source_id: &str) {
        let collection: mongodb::Collection<ContentSource> =
            self.mongo.collection("content_sources");
        let update = doc! { "$set": {
            "processing_status": "ready",
            "processed_at": Utc::now().to_rfc3339(),
        }};
        if let Err(e) = collection.update_one(doc! { "_id": source_id }, update).await {
            tracing::warn!("Failed to mark source {} ready: {}", source_id, e);
        }
    }

    async fn mark_source_error(&self, source_id: &str, error: &str) {
        let collection: mongodb::Collection<ContentSource> =
            self.mongo.collection("content_sources");
        let update = doc! { "$set": {
            "processing_status": "error",
            "processing_error": error,
        }};
        if let Err(e) = collection.update_one(doc! { "_id": source_id }, update).await {
            tracing::warn!("Failed to mark source {} errored: {}", source_id, e);
        }
    }
}

/// The generator maps AI difficulty labels onto our tags; anything
/// unexpected lands on medium.
fn parse_difficulty(label: Option<&str>) -> QuestionDifficulty {
    match label.map(|l| l.to_lowercase()) {
        Some(ref l) if l == "easy" || l == "beginner" => QuestionDifficulty::Easy,
        Some(ref l) if l == "hard" || l == "advanced" => QuestionDifficulty::Hard,
        _ => QuestionDifficulty::Medium,
    }
}

/// Asks the collaborator to structure raw content into a course. A reply
/// without lessons is an error.
pub async fn generate_course(
    ai: &dyn ChatModel,
    raw_content: &str,
    target_lessons: u32,
) -> Result<GeneratedCourse, AiError> {
    let prompt = build_course_prompt(raw_content, target_lessons);

    track_ai_operation("course_generation", async {
        let reply = ai.complete(&prompt, 0.4, 4000).await?;
        let value = extract_json_object(&reply)?;
        require_fields(&value, &["course_title", "lessons"])?;
        let generated: GeneratedCourse = serde_json::from_value(value)?;
        if generated.lessons.is_empty() {
            return Err(AiError::Unusable("no lessons generated from content"));
        }
        Ok(generated)
    })
    .await
}

fn build_course_prompt(raw_content: &str, target_lessons: u32) -> String {
    let content: String = raw_content.chars().take(MAX_PROMPT_CONTENT_CHARS).collect();

    format!(
        r#"Convert the following educational content into a structured training course with {target_lessons} lessons.

For each lesson, provide:
1. Title (descriptive, no greetings)
2. Learning objectives (3-5 specific goals)
3. Core training content (300-500 words, structured, no greetings or introductions)
4. Key vocabulary (8-12 important terms with definitions)
5. Estimated duration in minutes
6. Difficulty level (beginner/intermediate/advanced)

IMPORTANT: Content should be pure training material without any greetings, welcomes, or special characters like #, *, -.
Start directly with the educational content.

Content to process:
"{content}"

Return as JSON in this exact format:
{{
    "course_title": "Generated Course Title",
    "course_description": "Brief course description",
    "total_estimated_hours": 12,
    "lessons": [
        {{
            "title": "Lesson Title",
            "learning_objectives": ["objective1", "objective2", "objective3"],
            "content": "Detailed lesson content...",
            "key_vocabulary": {{"term1": "definition1", "term2": "definition2"}},
            "estimated_duration": 30,
            "difficulty": "beginner|intermediate|advanced",
            "lesson_number": 1
        }}
    ]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai_client::MockChat;

    #[tokio::test]
    async fn course_generation_parses_a_full_reply() {
        let reply = r#"{
            "course_title": "Customer Service Basics",
            "course_description": "Foundations of support work",
            "total_estimated_hours": 6,
            "lessons": [
                {
                    "title": "Greeting Customers",
                    "learning_objectives": ["Greet professionally"],
                    "content": "Start every interaction with a warm greeting...",
                    "key_vocabulary": {"greeting": "a polite opening"},
                    "estimated_duration": 25,
                    "difficulty": "beginner",
                    "lesson_number": 1
                }
            ]
        }"#;
        let chat = MockChat::new(vec![reply]);
        let course = generate_course(&chat, "some raw content", 1).await.unwrap();
        assert_eq!(course.course_title, "Customer Service Basics");
        assert_eq!(course.lessons.len(), 1);
        assert_eq!(course.lessons[0].lesson_number, Some(1));
    }

    #[tokio::test]
    async fn reply_without_lessons_is_rejected() {
        let chat = MockChat::new(vec![r#"{"course_title": "Empty", "lessons": []}"#]);
        let err = generate_course(&chat, "content", 3).await.unwrap_err();
        assert!(matches!(err, AiError::Unusable(_)));
    }

    #[tokio::test]
    async fn reply_missing_lessons_field_is_rejected() {
        let chat = MockChat::new(vec![r#"{"course_title": "No lessons key"}"#]);
        let err = generate_course(&chat, "content", 3).await.unwrap_err();
        assert!(matches!(err, AiError::MissingField("lessons")));
    }

    #[test]
    fn difficulty_labels_map_onto_tags() {
        assert_eq!(parse_difficulty(Some("beginner")), QuestionDifficulty::Easy);
        assert_eq!(parse_difficulty(Some("advanced")), QuestionDifficulty::Hard);
        assert_eq!(parse_difficulty(Some("intermediate")), QuestionDifficulty::Medium);
        assert_eq!(parse_difficulty(None), QuestionDifficulty::Medium);
    }
}
