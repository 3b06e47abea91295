use axum::{extract::State, http::StatusCode, response::{IntoResponse, Json}, routing::get, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{error_response, CurrentUser};
use crate::domain::auth_service::require_guardian;
use crate::platform::GeofenceMonitor;
use crate::AppState;

/// Region ids currently registered in each in-process monitor
#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorRegionsResponse {
    pub child_device: Vec<String>,
    pub guardian_device: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/regions", get(registered_regions))
}

pub async fn registered_regions(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/monitor/regions - guardian: {}", current.user.user_id);

    if let Err(e) = require_guardian(&current.user) {
        return error_response("Monitor regions denied", e);
    }
    let response = MonitorRegionsResponse {
        child_device: state.child_monitor.registered_ids(),
        guardian_device: state.guardian_monitor.registered_ids(),
    };
    (StatusCode::OK, Json(response)).into_response()
}
