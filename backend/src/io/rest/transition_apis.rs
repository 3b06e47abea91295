//! # REST API for Geofence Transitions
//!
//! Child devices whose platform monitor raises geofence transitions post them
//! here; they go through the same handler as transitions raised by the
//! in-process monitor. Guardians read back the recorded transitions of their
//! children.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use shared::{GeofenceTransitionEvent, Role};
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub descriptions: Vec<String>,
}

/// Create a router for geofence transition APIs
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_transitions).post(report_transition))
}

/// Transitions of every child of the guardian, newest first
pub async fn list_transitions(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    info!("GET /api/geofence-transitions - query: {:?}", query);

    let children = match state.child_service.list_children(&current.user).await {
        Ok(response) => response.children,
        Err(e) => return error_response("Failed to list children for transitions", e),
    };
    let child_ids: Vec<String> = children.into_iter().map(|c| c.child_id).collect();
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    match state.transition_handler.history(&child_ids, limit).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => error_response("Failed to list geofence transitions", e),
    }
}

/// Child sessions always report for themselves
pub async fn report_transition(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(mut event): Json<GeofenceTransitionEvent>,
) -> impl IntoResponse {
    info!("POST /api/geofence-transitions - event: {:?}", event);

    if current.user.role == Role::Child {
        event.child_id = Some(current.user.user_id.clone());
    }
    let descriptions = state.transition_handler.handle(&event).await;
    (StatusCode::OK, Json(TransitionOutcome { descriptions })).into_response()
}
