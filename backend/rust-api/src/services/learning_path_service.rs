use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;
use serde::Deserialize;

use crate::metrics::track_ai_operation;
use crate::models::{LearningPath, Lesson, PlacementResult};
use crate::services::ai_client::{extract_json_object, require_fields, AiError, ChatModel};
use crate::services::content_service::ContentService;
use crate::services::placement_service::PlacementService;

pub struct LearningPathService {
    mongo: Database,
}

#[derive(Debug, Deserialize)]
pub struct LearningPathPlan {
    pub recommended_sequence: Vec<String>,
    #[serde(default)]
    pub difficulty_adjustments: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub estimated_completion_weeks: Option<f64>,
    #[serde(default)]
    pub review_schedule: serde_json::Value,
    #[serde(default)]
    pub adaptive_rules: serde_json::Value,
}

impl LearningPathService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Builds a personalized lesson sequence for a user from their latest
    /// placement result and the course's lessons, and persists it.
    pub async fn generate(
        &self,
        ai: &dyn ChatModel,
        user_id: &str,
        course_id: &str,
    ) -> Result<LearningPath> {
        let placement = PlacementService::new(self.mongo.clone())
            .latest_result(user_id)
            .await?
            .ok_or_else(|| anyhow!("User {} has no placement result yet", user_id))?;

        let lessons = ContentService::new(self.mongo.clone())
            .list_lessons(course_id)
            .await?;
        if lessons.is_empty() {
            return Err(anyhow!("No lessons available in course {}", course_id));
        }

        let plan = create_personalized_path(ai, &placement, &lessons).await?;

        let now = Utc::now();
        let path = LearningPath {
            id: LearningPath::path_id(user_id, course_id),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            recommended_sequence: plan.recommended_sequence,
            difficulty_adjustments: plan.difficulty_adjustments,
            focus_areas: plan.focus_areas,
            estimated_completion_weeks: plan.estimated_completion_weeks,
            review_schedule: plan.review_schedule,
            adaptive_rules: plan.adaptive_rules,
            created_at: now,
            last_updated: now,
        };

        let collection: mongodb::Collection<LearningPath> =
            self.mongo.collection("learning_paths");
        collection
            .replace_one(doc! { "_id": &path.id }, &path)
            .with_options(
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await
            .context("Failed to store learning path")?;

        tracing::info!(
            "Learning path stored for user {} course {} ({} lessons in sequence)",
            user_id,
            course_id,
            path.recommended_sequence.len()
        );
        Ok(path)
    }

    pub async fn get(&self, user_id: &str, course_id: &str) -> Result<Option<LearningPath>> {
        let collection: mongodb::Collection<LearningPath> =
            self.mongo.collection("learning_paths");
        collection
            .find_one(doc! { "_id": LearningPath::path_id(user_id, course_id) })
            .await
            .context("Failed to query learning path")
    }
}

/// Asks the collaborator for an ordered lesson plan tuned to the user's
/// placement profile.
pub async fn create_personalized_path(
    ai: &dyn ChatModel,
    placement: &PlacementResult,
    lessons: &[Lesson],
) -> Result<LearningPathPlan, AiError> {
    let prompt = build_path_prompt(placement, lessons);

    track_ai_operation("learning_path", async {
        let reply = ai.complete(&prompt, 0.3, 2000).await?;
        let value = extract_json_object(&reply)?;
        require_fields(&value, &["recommended_sequence"])?;
        let plan: LearningPathPlan = serde_json::from_value(value)?;
        if plan.recommended_sequence.is_empty() {
            return Err(AiError::Unusable("learning path has no lessons"));
        }
        Ok(plan)
    })
    .await
}

fn build_path_prompt(placement: &PlacementResult, lessons: &[Lesson]) -> String {
    let user_profile = serde_json::json!({
        "level": placement.determined_level,
        "confidence": placement.confidence_score,
        "strengths": placement.analysis.strengths,
        "weaknesses": placement.analysis.weaknesses,
        "recommended_focus": placement.analysis.recommended_focus,
    });

    let lessons_info: Vec<_> = lessons
        .iter()
        .map(|lesson| {
            serde_json::json!({
                "id": lesson.id,
                "title": lesson.title,
                "difficulty": lesson.base_difficulty,
                "lesson_number": lesson.lesson_number,
                "estimated_duration": lesson.estimated_duration_minutes,
                "learning_objectives": lesson.learning_objectives,
            })
        })
        .collect();

    format!(
        r#"Create a personalized learning path for this user profile and available lessons.

User Profile:
{profile}

Available Lessons:
{lessons}

Create an optimal learning sequence considering:
1. User's current level and weaknesses
2. Logical progression through topics
3. Difficulty adjustment recommendations
4. Review and reinforcement schedule

Return JSON:
{{
    "recommended_sequence": ["lesson_id1", "lesson_id2"],
    "difficulty_adjustments": {{
        "lesson_id": "easier|normal|harder"
    }},
    "focus_areas": ["area1", "area2"],
    "estimated_completion_weeks": 6,
    "review_schedule": {{
        "lesson_id": {{
            "initial_review_days": 3,
            "subsequent_reviews": [7, 30]
        }}
    }},
    "adaptive_rules": [
        {{
            "condition": "if score < 70%",
            "action": "add_remedial_content"
        }}
    ]
}}"#,
        profile = serde_json::to_string_pretty(&user_profile).unwrap_or_default(),
        lessons = serde_json::to_string_pretty(&lessons_info).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CefrLevel, PlacementAnalysis, QuestionDifficulty};
    use crate::services::ai_client::MockChat;

    fn placement() -> PlacementResult {
        PlacementResult {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            placement_test_id: None,
            raw_text_input: "sample".to_string(),
            analysis: PlacementAnalysis {
                level: CefrLevel::A2,
                confidence: 0.7,
                detailed_analysis: serde_json::Value::Null,
                strengths: vec!["basic vocabulary".to_string()],
                weaknesses: vec!["verb tenses".to_string()],
                recommended_focus: vec!["grammar".to_string()],
                explanation: None,
                estimated_study_hours: None,
            },
            determined_level: CefrLevel::A2,
            confidence_score: 0.7,
            recommended_start_lesson: None,
            completed_at: Utc::now(),
        }
    }

    fn lesson(id: &str, number: u32) -> Lesson {
        Lesson {
            id: id.to_string(),
            course_id: "c1".to_string(),
            title: format!("Lesson {}", number),
            content: "content".to_string(),
            learning_objectives: vec![],
            key_vocabulary: Default::default(),
            lesson_number: number,
            base_difficulty: QuestionDifficulty::Easy,
            required_score: 90.0,
            estimated_duration_minutes: Some(30),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn path_reply_is_parsed_into_a_plan() {
        let reply = r#"{
            "recommended_sequence": ["l1", "l2"],
            "difficulty_adjustments": {"l1": "easier"},
            "focus_areas": ["grammar"],
            "estimated_completion_weeks": 4
        }"#;
        let chat = MockChat::new(vec![reply]);
        let plan = create_personalized_path(&chat, &placement(), &[lesson("l1", 1), lesson("l2", 2)])
            .await
            .unwrap();
        assert_eq!(plan.recommended_sequence, vec!["l1", "l2"]);
        assert_eq!(plan.difficulty_adjustments["l1"], "easier");
    }

    #[tokio::test]
    async fn empty_sequence_is_rejected() {
        let chat = MockChat::new(vec![r#"{"recommended_sequence": []}"#]);
        let err = create_personalized_path(&chat, &placement(), &[lesson("l1", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Unusable(_)));
    }
}
