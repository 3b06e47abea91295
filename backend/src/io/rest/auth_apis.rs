//! # REST API for Accounts and Sessions
//!
//! Registration, login, logout and the current-user lookup. Every other
//! endpoint expects the returned token as `Authorization: Bearer <token>`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use shared::{LoginRequest, RegisterRequest};
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

/// Create a router for account related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> impl IntoResponse {
    info!("POST /api/auth/register - email: {}, role: {}", request.email, request.role);

    match state.auth_service.register(request).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => error_response("Failed to register account", e),
    }
}

pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> impl IntoResponse {
    info!("POST /api/auth/login - email: {}", request.email);

    match state.auth_service.login(request).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => error_response("Failed to log in", e),
    }
}

/// Ends the session and drops the guardian's monitoring session, if any
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("POST /api/auth/logout - user: {}", current.user.user_id);

    state.auth_service.logout(&current.token);
    state.monitor_sessions.close(&current.user.user_id);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn me(current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/auth/me - user: {}", current.user.user_id);
    (StatusCode::OK, Json(current.user)).into_response()
}
