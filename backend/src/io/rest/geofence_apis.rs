//! # REST API for Geofences
//!
//! Safe zones per child. Coordinates and radius may be sent as numbers or as
//! text from a form; invalid input is rejected before anything is stored.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get},
    Router,
};
use shared::CreateGeofenceRequest;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

/// Create a router for geofence related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/children/:child_id/geofences", get(list_geofences).post(create_geofence))
        .route("/children/:child_id/geofences/:geofence_id", delete(delete_geofence))
}

pub async fn list_geofences(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/geofences", child_id);

    match state.geofence_service.list_geofences(&current.user, &child_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to list geofences", e),
    }
}

pub async fn create_geofence(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Json(request): Json<CreateGeofenceRequest>,
) -> impl IntoResponse {
    info!("POST /api/children/{}/geofences - request: {:?}", child_id, request);

    match state.geofence_service.create_geofence(&current.user, &child_id, request).await {
        Ok(area) => (StatusCode::CREATED, Json(area)).into_response(),
        Err(e) => error_response("Failed to create geofence", e),
    }
}

pub async fn delete_geofence(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((child_id, geofence_id)): Path<(String, String)>,
) -> impl IntoResponse {
    info!("DELETE /api/children/{}/geofences/{}", child_id, geofence_id);

    match state.geofence_service.delete_geofence(&current.user, &child_id, &geofence_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("Failed to delete geofence", e),
    }
}
