use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::error_response;
use crate::models::lesson::{GenerateQuestionsRequest, QuestionBankQuery};
use crate::models::QuestionDifficulty;
use crate::services::{question_service::QuestionService, AppState};

pub async fn generate_questions(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
    Json(req): Json<GenerateQuestionsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    tracing::info!(
        "Generating {} {} questions for lesson {}",
        req.question_count,
        req.difficulty.as_str(),
        lesson_id
    );

    let service = QuestionService::new(state.mongo.clone());

    match service
        .generate_bank(
            state.ai.as_ref(),
            &lesson_id,
            req.difficulty,
            req.question_count,
        )
        .await
    {
        Ok(bank) => Ok((StatusCode::CREATED, Json(bank))),
        Err(e) => {
            tracing::error!("Question generation failed for lesson {}: {:#}", lesson_id, e);
            Err(error_response(e))
        }
    }
}

pub async fn get_question_bank(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
    Query(query): Query<QuestionBankQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let difficulty = query.difficulty.unwrap_or(QuestionDifficulty::Medium);
    let service = QuestionService::new(state.mongo.clone());

    match service.get_bank(&lesson_id, difficulty).await {
        Ok(Some(bank)) => Ok((StatusCode::OK, Json(bank))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!(
                "No {} question bank for lesson {}",
                difficulty.as_str(),
                lesson_id
            ),
        )),
        Err(e) => Err(error_response(e)),
    }
}
