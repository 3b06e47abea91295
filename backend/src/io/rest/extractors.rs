//! Request extractors shared by the REST handlers.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::Response,
};
use shared::User;

use super::error_response;
use crate::domain::GuardianError;
use crate::AppState;

/// The signed-in user behind an `Authorization: Bearer <token>` header
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| error_response("Missing bearer token", GuardianError::NotAuthenticated))?;
        let user = state
            .auth_service
            .current_user(&token)
            .await
            .map_err(|e| error_response("Rejected session token", e))?;
        Ok(CurrentUser { user, token })
    }
}
