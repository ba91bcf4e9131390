use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::error_response;
use crate::models::placement::{CreatePlacementTestRequest, SubmitPlacementRequest};
use crate::services::{placement_service::PlacementService, AppState};

pub async fn create_placement_test(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlacementTestRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let service = PlacementService::new(state.mongo.clone());

    match service.create_test(req).await {
        Ok(test) => Ok((StatusCode::CREATED, Json(test))),
        Err(e) => {
            tracing::error!("Failed to create placement test: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn list_placement_tests(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = PlacementService::new(state.mongo.clone());

    match service.list_tests().await {
        Ok(tests) => Ok((StatusCode::OK, Json(tests))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn submit_placement(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitPlacementRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    req.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    tracing::info!("Running placement analysis for user {}", req.user_id);

    let service = PlacementService::new(state.mongo.clone());

    match service.submit(state.ai.as_ref(), req).await {
        Ok(result) => Ok((StatusCode::CREATED, Json(result))),
        Err(e) => {
            tracing::error!("Placement analysis failed: {:#}", e);
            Err(error_response(e))
        }
    }
}

pub async fn latest_placement_result(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = PlacementService::new(state.mongo.clone());

    match service.latest_result(&user_id).await {
        Ok(Some(result)) => Ok((StatusCode::OK, Json(result))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            format!("No placement result for user {}", user_id),
        )),
        Err(e) => Err(error_response(e)),
    }
}
