use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::metrics::{
    review_bracket, track_cache_operation, track_db_operation, ANSWERS_SUBMITTED_TOTAL,
    ATTEMPTS_FINALIZED_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL,
};
use crate::models::session::{
    CompleteSessionResponse, CreateSessionRequest, CreateSessionResponse, NextQuestionResponse,
    SubmitAnswerRequest, SubmitAnswerResponse,
};
use crate::models::{
    Attempt, Lesson, QuestionBank, QuestionDifficulty, SessionError, SessionState, TestSession,
};
use crate::services::evaluator;
use crate::services::progress_service::ProgressService;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Lock held per session for the duration of one state-changing operation.
const LOCK_TTL_MILLIS: u64 = 10_000;
const LOCK_RETRY_MILLIS: u64 = 50;
const LOCK_MAX_ATTEMPTS: u32 = 40;

pub struct SessionService {
    mongo: Database,
    redis: ConnectionManager,
}

impl SessionService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    pub async fn create_session(&self, req: CreateSessionRequest) -> Result<CreateSessionResponse> {
        let difficulty = req.difficulty.unwrap_or(QuestionDifficulty::Medium);
        let bank = self.fetch_question_bank(&req.lesson_id, difficulty).await?;

        let questions = match bank {
            Some(bank) if !bank.questions.is_empty() => bank.questions,
            _ => return Err(anyhow!(SessionError::NoQuestionsAvailable)),
        };

        let session_id = Uuid::new_v4().to_string();
        let attempt_id = Uuid::new_v4().to_string();

        let attempt = Attempt::new(
            attempt_id.clone(),
            req.user_id.clone(),
            req.lesson_id.clone(),
        );
        let collection: mongodb::Collection<Attempt> = self.mongo.collection("attempts");
        track_db_operation("insert", "attempts", async {
            retry_async_with_config(RetryConfig::default(), || async {
                collection.insert_one(&attempt).await.map(|_| ())
            })
            .await
            .context("Failed to create attempt")
        })
        .await?;

        let bank_collection: mongodb::Collection<QuestionBank> =
            self.mongo.collection("question_banks");
        bank_collection
            .update_one(
                doc! { "_id": QuestionBank::bank_id(&req.lesson_id, difficulty) },
                doc! { "$inc": { "usage_count": 1 } },
            )
            .await
            .ok();

        let session = TestSession::new(
            session_id.clone(),
            req.user_id.clone(),
            req.lesson_id.clone(),
            attempt_id.clone(),
            questions,
            req.recycle_questions,
        );

        let expires_at = Utc::now() + chrono::Duration::seconds(Self::session_ttl_seconds());
        self.store_session(&session).await?;

        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SESSIONS_ACTIVE.inc();

        tracing::info!(
            "Session created: {} for user: {} lesson: {}",
            session_id,
            req.user_id,
            req.lesson_id
        );

        Ok(CreateSessionResponse {
            session_id,
            attempt_id,
            lesson_id: req.lesson_id,
            total_questions: session.total_questions(),
            expires_at,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<TestSession> {
        self.load_session(session_id).await
    }

    /// Serves the question under the pointer; the first call moves the
    /// session (and its attempt) into progress.
    pub async fn next_question(&self, session_id: &str) -> Result<NextQuestionResponse> {
        let token = self.acquire_session_lock(session_id).await?;
        let result = self.next_question_locked(session_id).await;
        self.release_session_lock(session_id, &token).await;
        result
    }

    async fn next_question_locked(&self, session_id: &str) -> Result<NextQuestionResponse> {
        let mut session = self.load_session(session_id).await?;
        let was_not_started = session.state == SessionState::NotStarted;

        let response = {
            let index = session.current_question_index;
            let total_questions = session.questions.len();
            let question = session.next_question().map_err(anyhow::Error::from)?;
            NextQuestionResponse {
                index,
                total_questions,
                question: question.question.clone(),
                question_type: question.question_type,
                options: question.options.clone(),
                difficulty: question.difficulty,
                category: question.category,
                points: question.points,
            }
        };

        if was_not_started {
            self.mark_attempt_in_progress(&session.attempt_id).await;
        }
        self.store_session(&session).await?;

        Ok(response)
    }

    /// One answer submission: evaluate, apply to the session atomically,
    /// persist, and finalize the attempt if the sequence is exhausted.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse> {
        let token = self.acquire_session_lock(session_id).await?;
        let result = self.submit_answer_locked(session_id, req).await;
        self.release_session_lock(session_id, &token).await;
        result
    }

    async fn submit_answer_locked(
        &self,
        session_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse> {
        let mut session = self.load_session(session_id).await?;

        let question = session
            .current_question()
            .map_err(anyhow::Error::from)?
            .clone();
        let evaluation = evaluator::evaluate(&question, &req.answer);
        let (score, is_correct, feedback) = (
            evaluation.score,
            evaluation.is_correct,
            evaluation.feedback.clone(),
        );

        session
            .record_answer(evaluation)
            .map_err(anyhow::Error::from)?;

        let correct_label = if is_correct { "true" } else { "false" };
        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[correct_label])
            .inc();

        let (aggregate, next_due) = if session.is_completed() {
            let attempt = self.finalize(&session).await?;
            (attempt.score, attempt.next_due)
        } else {
            (None, None)
        };

        self.store_session(&session).await?;

        tracing::info!(
            "Answer processed: session={}, correct={}, score={:.1}, difficulty={:.1}, completed={}",
            session_id,
            is_correct,
            score,
            session.difficulty_score,
            session.is_completed()
        );

        Ok(SubmitAnswerResponse {
            correct: is_correct,
            score,
            feedback,
            running_score: session.current_score,
            difficulty_score: session.difficulty_score,
            failed_categories: session.failed_categories.clone(),
            session_completed: session.is_completed(),
            aggregate_score: aggregate,
            next_due,
            suggested_next_difficulty: session
                .is_completed()
                .then(|| session.suggested_difficulty()),
        })
    }

    /// Ends an in-progress session early and finalizes its attempt with
    /// whatever answers were recorded.
    pub async fn complete_session(&self, session_id: &str) -> Result<CompleteSessionResponse> {
        let token = self.acquire_session_lock(session_id).await?;
        let result = self.complete_session_locked(session_id).await;
        self.release_session_lock(session_id, &token).await;
        result
    }

    async fn complete_session_locked(&self, session_id: &str) -> Result<CompleteSessionResponse> {
        let mut session = self.load_session(session_id).await?;
        session.finish().map_err(anyhow::Error::from)?;

        let attempt = self.finalize(&session).await?;
        self.store_session(&session).await?;

        Ok(CompleteSessionResponse {
            session_id: session.id.clone(),
            attempt_id: session.attempt_id.clone(),
            aggregate_score: attempt.score.unwrap_or(0.0),
            next_due: attempt
                .next_due
                .ok_or_else(|| anyhow!("finalized attempt has no next_due"))?,
            answers_recorded: session.answers.len(),
            suggested_next_difficulty: session.suggested_difficulty(),
        })
    }

    /// Attempt finalization plus the progress side effects, together so a
    /// completed session always leaves a durable trace.
    async fn finalize(&self, session: &TestSession) -> Result<Attempt> {
        let completed_at = session.completed_at.unwrap_or_else(Utc::now);

        let collection: mongodb::Collection<Attempt> = self.mongo.collection("attempts");
        let mut attempt = collection
            .find_one(doc! { "_id": &session.attempt_id })
            .await
            .context("Failed to load attempt")?
            .unwrap_or_else(|| {
                Attempt::new(
                    session.attempt_id.clone(),
                    session.user_id.clone(),
                    session.lesson_id.clone(),
                )
            });

        attempt.finalize(session.answers.clone(), completed_at);

        track_db_operation("replace", "attempts", async {
            retry_async_with_config(RetryConfig::aggressive(), || async {
                collection
                    .replace_one(doc! { "_id": &attempt.id }, &attempt)
                    .with_options(
                        mongodb::options::ReplaceOptions::builder()
                            .upsert(true)
                            .build(),
                    )
                    .await
                    .map(|_| ())
            })
            .await
            .context("Failed to store finalized attempt")
        })
        .await?;

        if let Some(score) = attempt.score {
            ATTEMPTS_FINALIZED_TOTAL
                .with_label_values(&[review_bracket(score)])
                .inc();
        }
        SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        SESSIONS_ACTIVE.dec();

        let progress = ProgressService::new(self.mongo.clone());
        if let Err(e) = progress.apply_attempt(session, &attempt).await {
            // Progress is derived data; the attempt itself is already safe.
            tracing::error!("Failed to update progress for attempt {}: {:#}", attempt.id, e);
        }

        tracing::info!(
            "Attempt finalized: {} score={:?} next_due={:?}",
            attempt.id,
            attempt.score,
            attempt.next_due
        );

        Ok(attempt)
    }

    async fn mark_attempt_in_progress(&self, attempt_id: &str) {
        let collection: mongodb::Collection<Attempt> = self.mongo.collection("attempts");
        let result = match collection.find_one(doc! { "_id": attempt_id }).await {
            Ok(Some(mut attempt)) => {
                attempt.start();
                collection
                    .replace_one(doc! { "_id": attempt_id }, &attempt)
                    .await
                    .map(|_| ())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to mark attempt {} in progress: {}", attempt_id, e);
        }
    }

    async fn fetch_question_bank(
        &self,
        lesson_id: &str,
        difficulty: QuestionDifficulty,
    ) -> Result<Option<QuestionBank>> {
        // The lesson must exist even when the bank lookup misses, so a bad
        // lesson id surfaces as not-found instead of an empty bank.
        let lessons: mongodb::Collection<Lesson> = self.mongo.collection("lessons");
        lessons
            .find_one(doc! { "_id": lesson_id })
            .await
            .context("Failed to query lesson")?
            .ok_or_else(|| anyhow!("Lesson {} not found", lesson_id))?;

        let banks: mongodb::Collection<QuestionBank> = self.mongo.collection("question_banks");
        banks
            .find_one(doc! { "_id": QuestionBank::bank_id(lesson_id, difficulty) })
            .await
            .context("Failed to query question bank")
    }

    async fn store_session(&self, session: &TestSession) -> Result<()> {
        let mut conn = self.redis.clone();
        let session_key = format!("test_session:{}", session.id);
        let session_json = serde_json::to_string(session)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&session_key)
                .arg(Self::session_ttl_seconds())
                .arg(session_json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to save session to Redis")
        })
        .await
    }

    async fn load_session(&self, session_id: &str) -> Result<TestSession> {
        let mut conn = self.redis.clone();
        let session_key = format!("test_session:{}", session_id);

        let session_json: Option<String> = redis::cmd("GET")
            .arg(&session_key)
            .query_async(&mut conn)
            .await
            .context("Failed to get session from Redis")?;

        let session_json = session_json.ok_or_else(|| anyhow!("Session not found"))?;
        serde_json::from_str(&session_json).context("Failed to deserialize session")
    }

    /// One exclusive lock per session id, so concurrent submissions to the
    /// same session serialize instead of interleaving.
    async fn acquire_session_lock(&self, session_id: &str) -> Result<String> {
        let mut conn = self.redis.clone();
        let lock_key = format!("test_session_lock:{}", session_id);
        let token = Uuid::new_v4().to_string();

        for _ in 0..LOCK_MAX_ATTEMPTS {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL_MILLIS)
                .query_async(&mut conn)
                .await
                .context("Failed to acquire session lock")?;

            if acquired.is_some() {
                return Ok(token);
            }

            tokio::time::sleep(std::time::Duration::from_millis(LOCK_RETRY_MILLIS)).await;
        }

        Err(anyhow!("Session {} is busy", session_id))
    }

    // Lua script ensures we only delete a lock we still own
    async fn release_session_lock(&self, session_id: &str, token: &str) {
        let mut conn = self.redis.clone();
        let lock_key = format!("test_session_lock:{}", session_id);

        let lua_script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
        "#;

        let released: Result<i32, redis::RedisError> = redis::Script::new(lua_script)
            .key(&lock_key)
            .arg(token)
            .invoke_async(&mut conn)
            .await;

        if let Err(e) = released {
            tracing::warn!("Failed to release lock for session {}: {}", session_id, e);
        }
    }

    fn session_ttl_seconds() -> i64 {
        std::env::var("SESSION_DURATION_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ttl_defaults_to_one_hour() {
        std::env::remove_var("SESSION_DURATION_SECONDS");
        assert_eq!(SessionService::session_ttl_seconds(), 3600);
    }
}
