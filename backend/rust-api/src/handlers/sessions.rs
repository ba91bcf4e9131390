use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::error_response;
use crate::models::session::{CreateSessionRequest, SessionSummary, SubmitAnswerRequest};
use crate::services::{session_service::SessionService, AppState};

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Creating session for user_id={}, lesson_id={}",
        req.user_id,
        req.lesson_id
    );

    let service = SessionService::new(state.mongo.clone(), state.redis.clone());

    match service.create_session(req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            tracing::error!("Failed to create session: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = SessionService::new(state.mongo.clone(), state.redis.clone());

    match service.get_session(&session_id).await {
        Ok(session) => Ok((StatusCode::OK, Json(SessionSummary::from(&session)))),
        Err(_) => Err((StatusCode::NOT_FOUND, "Session not found".to_string())),
    }
}

pub async fn next_question(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = SessionService::new(state.mongo.clone(), state.redis.clone());

    match service.next_question(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::warn!("Failed to serve question for session {}: {:#}", session_id, e);
            Err(error_response(e))
        }
    }
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Submitting answer for session: {}", session_id);

    let service = SessionService::new(state.mongo.clone(), state.redis.clone());

    match service.submit_answer(&session_id, &req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::error!("Failed to submit answer: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Completing session: {}", session_id);

    let service = SessionService::new(state.mongo.clone(), state.redis.clone());

    match service.complete_session(&session_id).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            tracing::error!("Failed to complete session: {:#}", e);
            Err(error_response(e))
        }
    }
}
