//! Bracelet bridge endpoint.
//!
//! The broker bridge forwards each message as `{topic, payload}` where
//! `payload` is the raw JSON text published by the bracelet. Messages are
//! attributed by the `childId` inside the payload, so this route takes no
//! session token.

use axum::{extract::State, http::StatusCode, response::{IntoResponse, Json}, routing::post, Router};
use serde::{Deserialize, Serialize};
use shared::BraceletMessage;
use tracing::info;

use super::error_response;
use crate::domain::BraceletOutcome;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub outcome: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/bracelet", post(ingest_bracelet))
}

pub async fn ingest_bracelet(State(state): State<AppState>, Json(message): Json<BraceletMessage>) -> impl IntoResponse {
    info!("POST /api/ingest/bracelet - topic: {}", message.topic);

    match state.telemetry_service.process_bracelet_message(&message).await {
        Ok(outcome) => {
            let (status, label) = match outcome {
                BraceletOutcome::Location(_) => (StatusCode::CREATED, "location"),
                BraceletOutcome::HeartRate(_) => (StatusCode::CREATED, "heart_rate"),
                BraceletOutcome::Gyroscope(_) => (StatusCode::CREATED, "gyroscope"),
                BraceletOutcome::Ignored => (StatusCode::ACCEPTED, "ignored"),
            };
            (status, Json(IngestResponse { outcome: label.to_string() })).into_response()
        }
        Err(e) => error_response("Failed to process bracelet message", e),
    }
}
