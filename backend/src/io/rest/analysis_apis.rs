//! REST endpoint for the bracelet data analysis.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use shared::TimeWindowQuery;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::storage::repositories::TimeWindow;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/children/:child_id/analysis", get(analyze_child))
}

/// Without `start`/`end` the last 30 days are analyzed
pub async fn analyze_child(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<TimeWindowQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/analysis - query: {:?}", child_id, query);

    let window = TimeWindow::new(query.start, query.end);
    match state.analysis_service.analyze(&current.user, &child_id, window).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response("Failed to analyze bracelet data", e),
    }
}
