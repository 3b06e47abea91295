//! # REST API for Child Management
//!
//! Guardian-side endpoints for linking child accounts and editing their
//! profiles and alert thresholds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use shared::{AssociateChildRequest, ChildThresholds, UpdateChildRequest};
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

/// Create a router for child related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_children).post(associate_child))
        .route("/:child_id", get(get_child).put(update_child).delete(dissociate_child))
        .route("/:child_id/thresholds", put(update_thresholds))
}

pub async fn list_children(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/children - guardian: {}", current.user.user_id);

    match state.child_service.list_children(&current.user).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to list children", e),
    }
}

pub async fn associate_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<AssociateChildRequest>,
) -> impl IntoResponse {
    info!("POST /api/children - request: {:?}", request);

    match state.child_service.associate_child(&current.user, request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => error_response("Failed to associate child", e),
    }
}

pub async fn get_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/children/{}", child_id);

    match state.child_service.owned_profile(&current.user, &child_id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => error_response("Failed to get child profile", e),
    }
}

pub async fn update_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Json(request): Json<UpdateChildRequest>,
) -> impl IntoResponse {
    info!("PUT /api/children/{} - request: {:?}", child_id, request);

    match state.child_service.update_child_profile(&current.user, &child_id, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to update child profile", e),
    }
}

pub async fn dissociate_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("DELETE /api/children/{}", child_id);

    match state.geofence_service.dissociate_child(&current.user, &child_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("Failed to dissociate child", e),
    }
}

pub async fn update_thresholds(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Json(thresholds): Json<ChildThresholds>,
) -> impl IntoResponse {
    info!("PUT /api/children/{}/thresholds - request: {:?}", child_id, thresholds);

    match state.child_service.update_thresholds(&current.user, &child_id, thresholds).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to update thresholds", e),
    }
}
