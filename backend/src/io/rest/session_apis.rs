//! # REST API for the Guardian Monitoring Session
//!
//! A guardian selects one child at a time. The session keeps the latest
//! location and geofence list of the selected child current and mirrors the
//! geofences into the guardian-device monitor.
//!
//! ## Endpoints
//!
//! - **GET /api/session**: current snapshot
//! - **GET /api/session/live**: snapshot on every change, as SSE
//! - **POST /api/session/select**: switch to a child
//! - **POST /api/session/clear**: stop watching any child
//! - **DELETE /api/session**: drop the session

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use shared::SelectChildRequest;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectChildResponse {
    pub child_id: String,
    pub generation: u64,
}

/// Create a router for monitoring session APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_session).delete(close_session))
        .route("/live", get(live_session))
        .route("/select", post(select_child))
        .route("/clear", post(clear_selection))
}

pub async fn get_session(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/session - guardian: {}", current.user.user_id);

    match state.monitor_sessions.session_for(&current.user) {
        Ok(session) => (StatusCode::OK, Json(session.snapshot())).into_response(),
        Err(e) => error_response("Failed to open monitoring session", e),
    }
}

pub async fn live_session(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/session/live - guardian: {}", current.user.user_id);

    let session = match state.monitor_sessions.session_for(&current.user) {
        Ok(session) => session,
        Err(e) => return error_response("Failed to open monitoring session", e),
    };

    // First event is the current snapshot, then one per change
    let events = stream::unfold((session.subscribe(), true), |(mut receiver, first)| async move {
        if !first && receiver.changed().await.is_err() {
            return None;
        }
        let snapshot = receiver.borrow_and_update().clone();
        Some((Event::default().event("session").json_data(snapshot), (receiver, false)))
    });
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

pub async fn select_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<SelectChildRequest>,
) -> impl IntoResponse {
    info!("POST /api/session/select - request: {:?}", request);

    let session = match state.monitor_sessions.session_for(&current.user) {
        Ok(session) => session,
        Err(e) => return error_response("Failed to open monitoring session", e),
    };
    match session.select_child(&request.child_id).await {
        Ok(generation) => (
            StatusCode::OK,
            Json(SelectChildResponse {
                child_id: request.child_id,
                generation,
            }),
        )
            .into_response(),
        Err(e) => error_response("Failed to select child", e),
    }
}

pub async fn clear_selection(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("POST /api/session/clear - guardian: {}", current.user.user_id);

    match state.monitor_sessions.session_for(&current.user) {
        Ok(session) => {
            session.clear_selection();
            (StatusCode::OK, Json(session.snapshot())).into_response()
        }
        Err(e) => error_response("Failed to open monitoring session", e),
    }
}

pub async fn close_session(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("DELETE /api/session - guardian: {}", current.user.user_id);

    if state.monitor_sessions.close(&current.user.user_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, "No monitoring session").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::rest::test_support::{associated_pair, parse, send, test_app};
    use crate::platform::GeofenceMonitor;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[tokio::test]
    async fn test_select_child_tracks_location_and_geofences() {
        let (router, state) = test_app().await;
        let (guardian, child, child_id) = associated_pair(&router).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/children/{}/geofences", child_id),
            Some(&guardian),
            Some(json!({ "name": "Home", "latitude": 40.0, "longitude": -3.0, "radius": 200 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let geofence_id = parse::<Value>(&body)["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &router,
            "POST",
            "/api/session/select",
            Some(&guardian),
            Some(json!({ "child_id": child_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let selected: SelectChildResponse = parse(&body);
        assert_eq!(selected.generation, 1);

        send(
            &router,
            "POST",
            "/api/telemetry/location",
            Some(&child),
            Some(json!({ "latitude": 40.0, "longitude": -3.0, "accuracy": 3.0, "speed": null, "timestamp": null })),
        )
        .await;

        let mut snapshot = Value::Null;
        for _ in 0..100 {
            let (_, body) = send(&router, "GET", "/api/session", Some(&guardian), None).await;
            snapshot = parse(&body);
            let mirrored = state.guardian_monitor.registered_ids().len() == 1;
            if mirrored && !snapshot["latest_location"].is_null() && snapshot["geofences"].as_array().map_or(0, |g| g.len()) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(snapshot["child_id"], json!(child_id));
        assert_eq!(snapshot["latest_location"]["geo_point"]["latitude"], json!(40.0));
        assert_eq!(state.guardian_monitor.registered_ids(), vec![geofence_id]);

        let (status, body) = send(&router, "POST", "/api/session/clear", Some(&guardian), None).await;
        assert_eq!(status, StatusCode::OK);
        let cleared: Value = parse(&body);
        assert!(cleared["child_id"].is_null());
        assert_eq!(cleared["generation"], json!(2));

        let (status, _) = send(&router, "DELETE", "/api/session", Some(&guardian), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_session_rejects_children_and_unknown_selection() {
        let (router, _) = test_app().await;
        let (guardian, child, _) = associated_pair(&router).await;

        let (status, _) = send(&router, "GET", "/api/session", Some(&child), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &router,
            "POST",
            "/api/session/select",
            Some(&guardian),
            Some(json!({ "child_id": "nobody" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
