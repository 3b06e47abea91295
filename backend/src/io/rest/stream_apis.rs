//! # Live Query Endpoints
//!
//! Server-sent event streams over store subscriptions, nested under
//! `/api/live`. Each event carries the full current list as JSON; a store
//! failure is sent as a final `error` event and the stream ends. Closing the
//! HTTP connection drops the subscription, which tears the live query down.

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use shared::TimeWindowQuery;
use tracing::{info, warn};

use super::{error_response, CurrentUser};
use crate::storage::repositories::TimeWindow;
use crate::storage::TypedSubscription;
use crate::AppState;

/// Create a router for live query APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/children", get(live_children))
        .route("/graphs", get(live_graphs))
        .route("/children/:child_id/location", get(live_location))
        .route("/children/:child_id/geofences", get(live_geofences))
        .route("/children/:child_id/heart-rate", get(live_heart_rate))
        .route("/children/:child_id/gyroscope", get(live_gyroscope))
        .route("/children/:child_id/meltdowns", get(live_meltdowns))
}

/// Republish each snapshot of `subscription` as an SSE event named `label`
pub fn sse_stream<T>(
    subscription: TypedSubscription<T>,
    label: &'static str,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
{
    let events = subscription.into_stream().map(move |snapshot| match snapshot {
        Ok(records) => Event::default().event(label).json_data(records),
        Err(e) => {
            warn!("Live {} query ended: {}", label, e);
            Ok(Event::default().event("error").data(e.to_string()))
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn window(query: TimeWindowQuery) -> TimeWindow {
    TimeWindow::new(query.start, query.end)
}

pub async fn live_children(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/live/children - guardian: {}", current.user.user_id);

    match state.child_service.stream_children(&current.user).await {
        Ok(subscription) => sse_stream(subscription, "children").into_response(),
        Err(e) => error_response("Failed to open live children query", e),
    }
}

pub async fn live_graphs(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/live/graphs - guardian: {}", current.user.user_id);

    match state.graph_service.stream_graphs(&current.user) {
        Ok(subscription) => sse_stream(subscription, "graphs").into_response(),
        Err(e) => error_response("Failed to open live graph query", e),
    }
}

pub async fn live_location(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/live/children/{}/location", child_id);

    match state.telemetry_service.stream_latest_location(&current.user, &child_id).await {
        Ok(subscription) => sse_stream(subscription, "location").into_response(),
        Err(e) => error_response("Failed to open live location query", e),
    }
}

pub async fn live_geofences(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> impl IntoResponse {
    info!("GET /api/live/children/{}/geofences", child_id);

    match state.geofence_service.stream_geofences(&current.user, &child_id).await {
        Ok(subscription) => sse_stream(subscription, "geofences").into_response(),
        Err(e) => error_response("Failed to open live geofence query", e),
    }
}

pub async fn live_heart_rate(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/live/children/{}/heart-rate - query: {:?}", child_id, query);

    match state
        .telemetry_service
        .stream_heart_rate(&current.user, &child_id, window(query))
        .await
    {
        Ok(subscription) => sse_stream(subscription, "heart_rate").into_response(),
        Err(e) => error_response("Failed to open live heart rate query", e),
    }
}

pub async fn live_gyroscope(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/live/children/{}/gyroscope - query: {:?}", child_id, query);

    match state
        .telemetry_service
        .stream_gyroscope(&current.user, &child_id, window(query))
        .await
    {
        Ok(subscription) => sse_stream(subscription, "gyroscope").into_response(),
        Err(e) => error_response("Failed to open live gyroscope query", e),
    }
}

pub async fn live_meltdowns(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/live/children/{}/meltdowns - query: {:?}", child_id, query);

    match state
        .telemetry_service
        .stream_meltdowns(&current.user, &child_id, window(query))
        .await
    {
        Ok(subscription) => sse_stream(subscription, "meltdowns").into_response(),
        Err(e) => error_response("Failed to open live meltdown query", e),
    }
}
