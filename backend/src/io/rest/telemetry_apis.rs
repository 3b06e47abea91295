//! # REST API for Telemetry
//!
//! Two audiences share this module:
//!
//! - **Child devices** post location fixes, bracelet samples and crisis
//!   episodes under `/api/telemetry`. Samples land in the tree of the
//!   child's guardian; locations are also fed to the child-device geofence
//!   monitor.
//! - **Guardians** read the same data per child under
//!   `/api/children/:child_id/...`, with an optional `start`/`end` window
//!   (RFC 3339), export bracelet samples as CSV and prune old samples.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use shared::{RecordGyroscopeRequest, RecordHeartRateRequest, RecordLocationRequest, RecordMeltdownRequest, TimeWindowQuery};
use tracing::info;

use super::{error_response, CurrentUser};
use crate::storage::repositories::TimeWindow;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub older_than_days: i64,
}

/// Child-device upload routes, nested under `/api/telemetry`
pub fn child_router() -> Router<AppState> {
    Router::new()
        .route("/location", post(record_location))
        .route("/heart-rate", post(record_heart_rate))
        .route("/gyroscope", post(record_gyroscope))
        .route("/meltdowns", post(record_meltdown))
}

/// Guardian read routes
pub fn guardian_router() -> Router<AppState> {
    Router::new()
        .route("/children/:child_id/location/latest", get(latest_location))
        .route("/children/:child_id/locations", get(locations))
        .route("/children/:child_id/heart-rate", get(heart_rate))
        .route("/children/:child_id/gyroscope", get(gyroscope))
        .route("/children/:child_id/meltdowns", get(meltdowns))
        .route("/children/:child_id/bracelet/export", get(export_bracelet_csv))
        .route("/children/:child_id/telemetry", delete(prune_telemetry))
}

fn window(query: TimeWindowQuery) -> TimeWindow {
    TimeWindow::new(query.start, query.end)
}

pub async fn record_location(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RecordLocationRequest>,
) -> impl IntoResponse {
    info!("POST /api/telemetry/location - child: {}", current.user.user_id);

    match state.telemetry_service.record_location(&current.user, request).await {
        Ok(location) => (StatusCode::CREATED, Json(location)).into_response(),
        Err(e) => error_response("Failed to record location", e),
    }
}

pub async fn record_heart_rate(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RecordHeartRateRequest>,
) -> impl IntoResponse {
    info!("POST /api/telemetry/heart-rate - child: {}, request: {:?}", current.user.user_id, request);

    match state.telemetry_service.record_heart_rate(&current.user, request).await {
        Ok(sample) => (StatusCode::CREATED, Json(sample)).into_response(),
        Err(e) => error_response("Failed to record heart rate", e),
    }
}

pub async fn record_gyroscope(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RecordGyroscopeRequest>,
) -> impl IntoResponse {
    info!("POST /api/telemetry/gyroscope - child: {}", current.user.user_id);

    match state.telemetry_service.record_gyroscope(&current.user, request).await {
        Ok(sample) => (StatusCode::CREATED, Json(sample)).into_response(),
        Err(e) => error_response("Failed to record gyroscope sample", e),
    }
}

pub async fn record_meltdown(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RecordMeltdownRequest>,
) -> impl IntoResponse {
    info!("POST /api/telemetry/meltdowns - child: {}, request: {:?}", current.user.user_id, request);

    match state.telemetry_service.record_meltdown(&current.user, request).await {
        Ok(event) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(e) => error_response("Failed to record meltdown", e),
    }
}

pub async fn latest_location(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/location/latest", child_id);

    match state.telemetry_service.latest_location(&current.user, &child_id).await {
        Ok(Some(location)) => (StatusCode::OK, Json(location)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "No location recorded yet").into_response(),
        Err(e) => error_response("Failed to get latest location", e),
    }
}

pub async fn locations(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/locations - query: {:?}", child_id, query);

    match state.telemetry_service.locations(&current.user, &child_id, window(query)).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => error_response("Failed to list locations", e),
    }
}

pub async fn heart_rate(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/heart-rate - query: {:?}", child_id, query);

    match state.telemetry_service.heart_rate(&current.user, &child_id, window(query)).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => error_response("Failed to list heart rate samples", e),
    }
}

pub async fn gyroscope(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/gyroscope - query: {:?}", child_id, query);

    match state.telemetry_service.gyroscope(&current.user, &child_id, window(query)).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => error_response("Failed to list gyroscope samples", e),
    }
}

pub async fn meltdowns(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/meltdowns - query: {:?}", child_id, query);

    match state.telemetry_service.meltdowns(&current.user, &child_id, window(query)).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(e) => error_response("Failed to list meltdowns", e),
    }
}

pub async fn export_bracelet_csv(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/bracelet/export - query: {:?}", child_id, query);

    match state.telemetry_service.export_bracelet_csv(&current.user, &child_id, window(query)).await {
        Ok(csv) => {
            let disposition = format!("attachment; filename=\"bracelet_{}.csv\"", child_id);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/csv".to_string()), (header::CONTENT_DISPOSITION, disposition)],
                csv,
            )
                .into_response()
        }
        Err(e) => error_response("Failed to export bracelet data", e),
    }
}

pub async fn prune_telemetry(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<PruneQuery>,
) -> impl IntoResponse {
    info!("DELETE /api/children/{}/telemetry - query: {:?}", child_id, query);

    match state
        .telemetry_service
        .prune_older_than(&current.user, &child_id, query.older_than_days)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to prune telemetry", e),
    }
}
