use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;

use crate::metrics::track_ai_operation;
use crate::models::{
    advance_streak, Attempt, DueReview, Lesson, QuestionCategory, TestSession, UserProgress,
};
use crate::services::ai_client::{extract_json_object, require_fields, AiError, ChatModel};

pub struct ProgressService {
    mongo: Database,
}

impl ProgressService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Folds one finalized attempt into the user's per-course progress:
    /// lesson score, completion set, weak/strong areas from the session's
    /// failure tracking, study streak and the next review date.
    pub async fn apply_attempt(&self, session: &TestSession, attempt: &Attempt) -> Result<()> {
        let lessons: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        let lesson = match lessons
            .find_one(doc! { "_id": &session.lesson_id })
            .await
            .context("Failed to load lesson for progress update")?
        {
            Some(lesson) => lesson,
            None => {
                tracing::warn!(
                    "Lesson {} missing, skipping progress update for attempt {}",
                    session.lesson_id,
                    attempt.id
                );
                return Ok(());
            }
        };

        let score = attempt.score.unwrap_or(0.0);
        let now = Utc::now();

        let collection: mongodb::Collection<UserProgress> = self.mongo.collection("user_progress");
        let progress_id = UserProgress::progress_id(&session.user_id, &lesson.course_id);

        let mut progress = collection
            .find_one(doc! { "_id": &progress_id })
            .await?
            .unwrap_or_else(|| {
                UserProgress::new(session.user_id.clone(), lesson.course_id.clone())
            });

        progress
            .lesson_scores
            .insert(lesson.id.clone(), score);

        if score >= lesson.required_score && !progress.lessons_completed.contains(&lesson.id) {
            progress.lessons_completed.push(lesson.id.clone());
        }

        let total_lessons = lessons
            .count_documents(doc! { "course_id": &lesson.course_id })
            .await
            .unwrap_or(0);
        if total_lessons > 0 {
            progress.completion_percentage =
                (progress.lessons_completed.len() as f64 / total_lessons as f64) * 100.0;
        }

        update_areas(&mut progress, session);

        progress.study_streak = advance_streak(progress.study_streak, progress.last_accessed, now);
        progress.last_accessed = now;
        progress.current_lesson_id = Some(lesson.id.clone());
        progress.next_review_date = attempt.next_due;

        collection
            .replace_one(doc! { "_id": &progress_id }, &progress)
            .with_options(
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await
            .context("Failed to update user progress")?;

        tracing::info!(
            "Progress updated for user {} course {}: {:.1}% complete, streak {}",
            progress.user_id,
            progress.course_id,
            progress.completion_percentage,
            progress.study_streak
        );

        Ok(())
    }

    pub async fn get_progress(&self, user_id: &str) -> Result<Vec<UserProgress>> {
        let collection: mongodb::Collection<UserProgress> = self.mongo.collection("user_progress");
        let cursor = collection
            .find(doc! { "user_id": user_id })
            .await
            .context("Failed to query user progress")?;
        cursor
            .try_collect()
            .await
            .context("Failed to collect user progress")
    }

    /// Lessons due for re-surfacing: progress records whose next review
    /// date has passed.
    pub async fn due_reviews(&self, user_id: &str) -> Result<Vec<DueReview>> {
        let now = Utc::now();
        let due = self
            .get_progress(user_id)
            .await?
            .into_iter()
            .filter_map(|p| {
                p.next_review_date
                    .filter(|next| *next <= now)
                    .map(|next| DueReview {
                        course_id: p.course_id,
                        current_lesson_id: p.current_lesson_id,
                        next_review_date: next,
                    })
            })
            .collect();
        Ok(due)
    }

    /// Narrative progress assessment from the language-model collaborator.
    pub async fn analyze_progress(
        &self,
        ai: &dyn ChatModel,
        user_id: &str,
        course_id: &str,
    ) -> Result<serde_json::Value> {
        let collection: mongodb::Collection<UserProgress> = self.mongo.collection("user_progress");
        let progress = collection
            .find_one(doc! { "_id": UserProgress::progress_id(user_id, course_id) })
            .await?
            .ok_or_else(|| anyhow!("No progress recorded for user {} in course {}", user_id, course_id))?;

        let attempts: mongodb::Collection<Attempt> = self.mongo.collection("attempts");
        let recent: Vec<Attempt> = attempts
            .find(doc! { "user_id": user_id, "status": "completed" })
            .sort(doc! { "completed_at": -1 })
            .limit(10)
            .await
            .context("Failed to query recent attempts")?
            .try_collect()
            .await?;

        let assessment = analyze_user_progress(ai, &progress, &recent).await?;
        Ok(assessment)
    }
}

fn update_areas(progress: &mut UserProgress, session: &TestSession) {
    let mut seen: Vec<QuestionCategory> = Vec::new();
    for answer in &session.answers {
        if let Some(question) = session.questions.get(answer.question_index) {
            if !seen.contains(&question.category) {
                seen.push(question.category);
            }
        }
    }

    for category in seen {
        if session.failed_categories.contains(&category) {
            if !progress.weak_areas.contains(&category) {
                progress.weak_areas.push(category);
            }
            progress.strong_areas.retain(|c| *c != category);
        } else {
            if !progress.strong_areas.contains(&category) {
                progress.strong_areas.push(category);
            }
            progress.weak_areas.retain(|c| *c != category);
        }
    }
}

/// Asks the collaborator for a progress assessment. The reply must carry an
/// `overall_assessment`; the rest of the shape is passed through for the
/// owning system to render.
pub async fn analyze_user_progress(
    ai: &dyn ChatModel,
    progress: &UserProgress,
    recent_attempts: &[Attempt],
) -> Result<serde_json::Value, AiError> {
    let prompt = build_progress_prompt(progress, recent_attempts);

    track_ai_operation("progress_analysis", async {
        let reply = ai.complete(&prompt, 0.3, 1500).await?;
        let analysis = extract_json_object(&reply)?;
        require_fields(&analysis, &["overall_assessment", "recommendations"])?;
        Ok(analysis)
    })
    .await
}

fn build_progress_prompt(progress: &UserProgress, recent_attempts: &[Attempt]) -> String {
    let progress_data = serde_json::json!({
        "completion_percentage": progress.completion_percentage,
        "lessons_completed": progress.lessons_completed,
        "lesson_scores": progress.lesson_scores,
        "weak_areas": progress.weak_areas,
        "strong_areas": progress.strong_areas,
        "study_streak": progress.study_streak,
    });

    let recent_performance: Vec<_> = recent_attempts
        .iter()
        .take(10)
        .map(|attempt| {
            serde_json::json!({
                "lesson_id": attempt.lesson_id,
                "score": attempt.score,
                "completed_at": attempt.completed_at,
            })
        })
        .collect();

    format!(
        r#"Analyze this user's learning progress and provide actionable recommendations.

Progress Data:
{progress}

Recent Performance:
{recent}

Provide analysis in JSON format:
{{
    "overall_assessment": "excellent|good|fair|needs_improvement",
    "progress_trend": "improving|stable|declining",
    "learning_velocity": "fast|normal|slow",
    "engagement_level": "high|medium|low",
    "recommendations": [
        {{
            "type": "study_schedule|difficulty_adjustment|content_focus|motivation",
            "priority": "high|medium|low",
            "action": "Specific recommendation",
            "expected_impact": "Description of expected improvement"
        }}
    ],
    "risk_factors": ["factor1", "factor2"],
    "celebration_points": ["achievement1", "achievement2"]
}}"#,
        progress = serde_json::to_string_pretty(&progress_data).unwrap_or_default(),
        recent = serde_json::to_string_pretty(&recent_performance).unwrap_or_default(),
    )
}
