//! # REST API for Saved Graphs
//!
//! Chart references a guardian saved for later, listed newest first.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get},
    Router,
};
use shared::CreateUserGraphRequest;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

/// Create a router for graph related APIs
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_graphs).post(save_graph))
        .route("/:graph_id", delete(delete_graph))
}

pub async fn list_graphs(State(state): State<AppState>, current: CurrentUser) -> impl IntoResponse {
    info!("GET /api/graphs - guardian: {}", current.user.user_id);

    match state.graph_service.list_graphs(&current.user).await {
        Ok(graphs) => (StatusCode::OK, Json(graphs)).into_response(),
        Err(e) => error_response("Failed to list graphs", e),
    }
}

pub async fn save_graph(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateUserGraphRequest>,
) -> impl IntoResponse {
    info!("POST /api/graphs - request: {:?}", request);

    match state.graph_service.save_graph(&current.user, request).await {
        Ok(graph) => (StatusCode::CREATED, Json(graph)).into_response(),
        Err(e) => error_response("Failed to save graph", e),
    }
}

pub async fn delete_graph(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(graph_id): Path<String>,
) -> impl IntoResponse {
    info!("DELETE /api/graphs/{}", graph_id);

    match state.graph_service.delete_graph(&current.user, &graph_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("Failed to delete graph", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::io::rest::test_support::{associated_pair, parse, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;
    use shared::UserGraph;

    #[tokio::test]
    async fn test_graph_endpoints() {
        let (router, _) = test_app().await;
        let (guardian, _, child_id) = associated_pair(&router).await;

        let (status, body) = send(
            &router,
            "POST",
            "/api/graphs",
            Some(&guardian),
            Some(json!({
                "child_id": child_id,
                "title": "March heart rate",
                "start_date": "2025-03-01T00:00:00Z",
                "end_date": "2025-03-31T23:59:59Z",
                "image_url": null
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let graph: UserGraph = parse(&body);

        let (_, body) = send(&router, "GET", "/api/graphs", Some(&guardian), None).await;
        let graphs: Vec<UserGraph> = parse(&body);
        assert_eq!(graphs, vec![graph.clone()]);

        let uri = format!("/api/graphs/{}", graph.id);
        let (status, _) = send(&router, "DELETE", &uri, Some(&guardian), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, "DELETE", &uri, Some(&guardian), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
