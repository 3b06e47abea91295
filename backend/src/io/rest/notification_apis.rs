use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::domain::auth_service::require_guardian;
use crate::AppState;

pub const DEFAULT_NOTIFICATION_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(recent_notifications))
}

/// Most recent notifications from the outbox, newest first
pub async fn recent_notifications(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> impl IntoResponse {
    info!("GET /api/notifications - query: {:?}", query);

    if let Err(e) = require_guardian(&current.user) {
        return error_response("Notification outbox denied", e);
    }
    let notifications = state.notifier.recent(query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT));
    (StatusCode::OK, Json(notifications)).into_response()
}
