use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use crate::metrics::track_ai_operation;
use crate::models::placement::{CreatePlacementTestRequest, SubmitPlacementRequest};
use crate::models::{Lesson, PlacementAnalysis, PlacementResult, PlacementTest};
use crate::services::ai_client::{extract_json_object, require_fields, AiError, ChatModel};

pub struct PlacementService {
    mongo: Database,
}

impl PlacementService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn create_test(&self, req: CreatePlacementTestRequest) -> Result<PlacementTest> {
        let test = PlacementTest {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            instructions: req.instructions,
            min_text_length: req.min_text_length,
            is_active: true,
            created_at: Utc::now(),
        };

        let collection: mongodb::Collection<PlacementTest> =
            self.mongo.collection("placement_tests");
        collection
            .insert_one(&test)
            .await
            .context("Failed to store placement test")?;

        Ok(test)
    }

    pub async fn list_tests(&self) -> Result<Vec<PlacementTest>> {
        let collection: mongodb::Collection<PlacementTest> =
            self.mongo.collection("placement_tests");
        let cursor = collection
            .find(doc! { "is_active": true })
            .await
            .context("Failed to query placement tests")?;
        cursor
            .try_collect()
            .await
            .context("Failed to collect placement tests")
    }

    /// Runs the analysis collaborator over the user's writing sample and
    /// persists the result, with a recommended starting lesson when a
    /// course was named.
    pub async fn submit(
        &self,
        ai: &dyn ChatModel,
        req: SubmitPlacementRequest,
    ) -> Result<PlacementResult> {
        if let Some(test_id) = &req.placement_test_id {
            let tests: mongodb::Collection<PlacementTest> =
                self.mongo.collection("placement_tests");
            let test = tests
                .find_one(doc! { "_id": test_id })
                .await
                .context("Failed to query placement test")?
                .ok_or_else(|| anyhow!("Placement test {} not found", test_id))?;

            if (req.text.trim().len() as u32) < test.min_text_length {
                return Err(anyhow!(
                    "Text too short for this placement test (minimum {} characters)",
                    test.min_text_length
                ));
            }
        }

        let analysis = analyze_placement_text(ai, &req.text, &req.language).await?;

        let recommended_start_lesson = match &req.course_id {
            Some(course_id) => {
                self.determine_starting_lesson(analysis.level.starting_lesson_number(), course_id)
                    .await?
            }
            None => None,
        };

        let result = PlacementResult {
            id: Uuid::new_v4().to_string(),
            user_id: req.user_id,
            placement_test_id: req.placement_test_id,
            raw_text_input: req.text,
            determined_level: analysis.level,
            confidence_score: analysis.confidence,
            analysis,
            recommended_start_lesson,
            completed_at: Utc::now(),
        };

        let collection: mongodb::Collection<PlacementResult> =
            self.mongo.collection("placement_results");
        collection
            .insert_one(&result)
            .await
            .context("Failed to store placement result")?;

        tracing::info!(
            "Placement recorded for user {}: level {:?} (confidence {:.2})",
            result.user_id,
            result.determined_level,
            result.confidence_score
        );
        Ok(result)
    }

    pub async fn latest_result(&self, user_id: &str) -> Result<Option<PlacementResult>> {
        let collection: mongodb::Collection<PlacementResult> =
            self.mongo.collection("placement_results");
        collection
            .find_one(doc! { "user_id": user_id })
            .sort(doc! { "completed_at": -1 })
            .await
            .context("Failed to query placement results")
    }

    /// First lesson in the course at or past the level's starting number.
    async fn determine_starting_lesson(
        &self,
        start_lesson_number: u32,
        course_id: &str,
    ) -> Result<Option<String>> {
        let lessons: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        let lesson = lessons
            .find_one(doc! {
                "course_id": course_id,
                "lesson_number": { "$gte": start_lesson_number as i64 },
            })
            .sort(doc! { "lesson_number": 1 })
            .await
            .context("Failed to query starting lesson")?;
        Ok(lesson.map(|l| l.id))
    }
}

/// Analyzes a writing sample for CEFR proficiency. The reply must carry the
/// level, confidence and the strength/weakness breakdown.
pub async fn analyze_placement_text(
    ai: &dyn ChatModel,
    text: &str,
    language: &str,
) -> Result<PlacementAnalysis, AiError> {
    let prompt = build_analysis_prompt(text, language);

    track_ai_operation("placement_analysis", async {
        let reply = ai.complete(&prompt, 0.3, 1500).await?;
        let value = extract_json_object(&reply)?;
        require_fields(
            &value,
            &[
                "level",
                "confidence",
                "strengths",
                "weaknesses",
                "recommended_focus",
            ],
        )?;
        Ok(serde_json::from_value(value)?)
    })
    .await
}

fn build_analysis_prompt(text: &str, language: &str) -> String {
    format!(
        r#"Analyze this text sample to determine {language} proficiency level according to CEFR standards.
Consider: grammar accuracy, vocabulary range, sentence complexity, coherence, and fluency indicators.

Text to analyze:
"{text}"

Provide analysis in this exact JSON format:
{{
    "level": "A1|A2|B1|B2|C1|C2",
    "confidence": 0.85,
    "detailed_analysis": {{
        "grammar_score": 75,
        "vocabulary_score": 70,
        "coherence_score": 80,
        "complexity_score": 65
    }},
    "strengths": ["strength1", "strength2"],
    "weaknesses": ["weakness1", "weakness2"],
    "recommended_focus": ["area1", "area2"],
    "explanation": "Brief explanation of the assessment",
    "estimated_study_hours": 40
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CefrLevel;
    use crate::services::ai_client::MockChat;

    #[tokio::test]
    async fn analysis_reply_is_parsed_into_a_typed_result() {
        let reply = r#"Sure, here is the analysis:
{
    "level": "B1",
    "confidence": 0.82,
    "detailed_analysis": {"grammar_score": 70},
    "strengths": ["good vocabulary"],
    "weaknesses": ["article usage"],
    "recommended_focus": ["grammar drills"],
    "explanation": "Solid intermediate writing.",
    "estimated_study_hours": 60
}"#;
        let chat = MockChat::new(vec![reply]);
        let analysis = analyze_placement_text(&chat, "sample text", "en").await.unwrap();
        assert_eq!(analysis.level, CefrLevel::B1);
        assert!((analysis.confidence - 0.82).abs() < f64::EPSILON);
        assert_eq!(analysis.weaknesses, vec!["article usage".to_string()]);
    }

    #[tokio::test]
    async fn analysis_missing_level_is_rejected() {
        let chat = MockChat::new(vec![
            r#"{"confidence": 0.5, "strengths": [], "weaknesses": [], "recommended_focus": []}"#,
        ]);
        let err = analyze_placement_text(&chat, "sample", "en").await.unwrap_err();
        assert!(matches!(err, AiError::MissingField("level")));
    }

    #[tokio::test]
    async fn prose_only_reply_is_rejected() {
        let chat = MockChat::new(vec!["The user writes at an intermediate level."]);
        let err = analyze_placement_text(&chat, "sample", "en").await.unwrap_err();
        assert!(matches!(err, AiError::NoJsonObject));
    }
}
