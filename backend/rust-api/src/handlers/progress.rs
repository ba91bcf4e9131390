use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::error_response;
use crate::services::{
    learning_path_service::LearningPathService, progress_service::ProgressService, AppState,
};

pub async fn get_user_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ProgressService::new(state.mongo.clone());

    match service.get_progress(&user_id).await {
        Ok(progress) => Ok((StatusCode::OK, Json(progress))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn due_reviews(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ProgressService::new(state.mongo.clone());

    match service.due_reviews(&user_id).await {
        Ok(reviews) => Ok((StatusCode::OK, Json(reviews))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn analyze_progress(
    State(state): State<Arc<AppState>>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Running progress analysis for user {} course {}",
        user_id,
        course_id
    );

    let service = ProgressService::new(state.mongo.clone());

    match service
        .analyze_progress(state.ai.as_ref(), &user_id, &course_id)
        .await
    {
        Ok(analysis) => Ok((StatusCode::OK, Json(analysis))),
        Err(e) => {
            tracing::error!("Progress analysis failed: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn generate_learning_path(
    State(state): State<Arc<AppState>>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Generating learning path for user {} course {}",
        user_id,
        course_id
    );

    let service = LearningPathService::new(state.mongo.clone());

    match service
        .generate(state.ai.as_ref(), &user_id, &course_id)
        .await
    {
        Ok(path) => Ok((StatusCode::CREATED, Json(path))),
        Err(e) => {
            tracing::error!("Learning path generation failed: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn get_learning_path(
    State(state): State<Arc<AppState>>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = LearningPathService::new(state.mongo.clone());

    match service.get(&user_id, &course_id).await {
        Ok(Some(path)) => Ok((StatusCode::OK, Json(path))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("No learning path for user {} in course {}", user_id, course_id),
        )),
        Err(e) => Err(error_response(e)),
    }
}
