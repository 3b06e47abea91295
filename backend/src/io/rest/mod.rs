//! # REST API Interface Layer
//!
//! Provides HTTP REST endpoints for the guardian backend.
//! This layer handles:
//! - HTTP request/response serialization and deserialization
//! - Bearer-token authentication via the [`CurrentUser`] extractor
//! - Error translation from domain to HTTP status codes
//! - Request logging at handler entry
//!
//! ## Key Responsibilities
//!
//! - **API Endpoints**: RESTful HTTP interfaces for all operations
//! - **Live Endpoints**: SSE streams under `/api/live`
//! - **Error Handling**: Converting [`GuardianError`] into proper HTTP responses
//!
//! ## Design Principles
//!
//! - **Domain Separation**: Pure translation layer without business logic
//! - **Error Transparency**: The error message is returned as the response body

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use tracing::{error, warn};

use crate::domain::GuardianError;
use crate::AppState;

pub mod analysis_apis;
pub mod auth_apis;
pub mod calendar_apis;
pub mod child_apis;
pub mod extractors;
pub mod geofence_apis;
pub mod graph_apis;
pub mod ingest_apis;
pub mod monitor_apis;
pub mod notification_apis;
pub mod session_apis;
pub mod stream_apis;
pub mod telemetry_apis;
pub mod transition_apis;

pub use extractors::CurrentUser;

/// Every `/api` route
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_apis::router())
        .nest("/children", child_apis::router())
        .nest("/telemetry", telemetry_apis::child_router())
        .nest("/graphs", graph_apis::router())
        .nest("/live", stream_apis::router())
        .nest("/session", session_apis::router())
        .nest("/geofence-transitions", transition_apis::router())
        .nest("/ingest", ingest_apis::router())
        .nest("/notifications", notification_apis::router())
        .nest("/monitor", monitor_apis::router())
        .merge(geofence_apis::router())
        .merge(telemetry_apis::guardian_router())
        .merge(analysis_apis::router())
        .merge(calendar_apis::router())
}

pub fn status_for(e: &GuardianError) -> StatusCode {
    match e {
        GuardianError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        GuardianError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        GuardianError::NotFound(_) => StatusCode::NOT_FOUND,
        GuardianError::Validation(_) => StatusCode::BAD_REQUEST,
        GuardianError::Conflict(_) => StatusCode::CONFLICT,
        GuardianError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GuardianError::Monitor(_) => StatusCode::BAD_GATEWAY,
        GuardianError::MalformedDocument(_) | GuardianError::Remote(_) | GuardianError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Log a failed request and turn the error into a response
pub fn error_response(context: &str, e: GuardianError) -> Response {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("{}: {}", context, e);
    } else {
        warn!("{}: {}", context, e);
    }
    (status, e.to_string()).into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::storage::DbConnection;
    use crate::{build_state, create_router, AppState};
    use std::sync::Arc;

    pub async fn test_app() -> (Router, AppState) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let config = AppConfig::default();
        let state = build_state(Arc::new(db), &config).expect("Failed to build state");
        let router = create_router(state.clone(), &config.server).expect("Failed to build router");
        (router, state)
    }

    pub async fn send(router: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    /// Register an account and return its token and user id
    pub async fn register(router: &Router, email: &str, role: &str) -> (String, String) {
        let (status, body) = send(
            router,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": email, "password": "secret123", "role": role, "name": null })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&body));
        let session: shared::SessionResponse = parse(&body);
        (session.token, session.user.user_id)
    }

    /// Guardian and child accounts with the child associated as "Leo"
    pub async fn associated_pair(router: &Router) -> (String, String, String) {
        let (guardian_token, _) = register(router, "parent@example.com", "guardian").await;
        let (child_token, child_id) = register(router, "kid@example.com", "child").await;
        let (status, _) = send(
            router,
            "POST",
            "/api/children",
            Some(&guardian_token),
            Some(json!({ "child_id": child_id, "name": "Leo", "dob": null })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (guardian_token, child_token, child_id)
    }
}
