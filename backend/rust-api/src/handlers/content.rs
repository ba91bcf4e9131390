use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::error_response;
use crate::models::lesson::{CreateContentSourceRequest, ProcessContentSourceRequest};
use crate::services::{content_service::ContentService, AppState};

pub async fn create_content_source(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateContentSourceRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let service = ContentService::new(state.mongo.clone());

    match service.create_source(req.title, req.raw_content).await {
        Ok(source) => Ok((StatusCode::CREATED, Json(source))),
        Err(e) => {
            tracing::error!("Failed to register content source: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn get_content_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ContentService::new(state.mongo.clone());

    match service.get_source(&source_id).await {
        Ok(source) => Ok((StatusCode::OK, Json(source))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn process_content_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
    Json(req): Json<ProcessContentSourceRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!(
        "Processing content source {} into {} lessons",
        source_id,
        req.target_lessons
    );

    let service = ContentService::new(state.mongo.clone());

    match service
        .process_source(state.ai.as_ref(), &source_id, req.target_lessons)
        .await
    {
        Ok(course) => Ok((StatusCode::CREATED, Json(course))),
        Err(e) => {
            tracing::error!("Failed to process content source {}: {:#}", source_id, e);
            Err(error_response(e))
        }
    }
}

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ContentService::new(state.mongo.clone());

    match service.list_courses().await {
        Ok(courses) => Ok((StatusCode::OK, Json(courses))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ContentService::new(state.mongo.clone());

    match service.get_course(&course_id).await {
        Ok(course) => Ok((StatusCode::OK, Json(course))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn list_course_lessons(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ContentService::new(state.mongo.clone());

    match service.list_lessons(&course_id).await {
        Ok(lessons) => Ok((StatusCode::OK, Json(lessons))),
        Err(e) => Err(error_response(e)),
    }
}
