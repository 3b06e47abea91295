use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;

use super::{error_response, CurrentUser};
use crate::AppState;

// Query parameters for calendar month API
#[derive(Debug, Deserialize)]
pub struct CalendarMonthQuery {
    pub month: u32,
    pub year: u32,
}

/// Create a router for calendar related APIs
pub fn router() -> Router<AppState> {
    Router::new().route("/children/:child_id/calendar/month", get(get_episode_month))
}

/// Month grid of a child's meltdown episodes
async fn get_episode_month(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Query(query): Query<CalendarMonthQuery>,
) -> impl IntoResponse {
    info!("GET /api/children/{}/calendar/month - query: {:?}", child_id, query);

    match state
        .calendar_service
        .episode_month(&current.user, &child_id, query.month, query.year)
        .await
    {
        Ok(month) => (StatusCode::OK, Json(month)).into_response(),
        Err(e) => error_response("Failed to build calendar month", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::io::rest::test_support::{associated_pair, parse, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;
    use shared::{CalendarDayType, EpisodeCalendarMonth};

    #[tokio::test]
    async fn test_month_with_episode() {
        let (router, _) = test_app().await;
        let (guardian, child, child_id) = associated_pair(&router).await;

        send(
            &router,
            "POST",
            "/api/telemetry/meltdowns",
            Some(&child),
            Some(json!({
                "start_time": "2025-03-10T14:00:00Z",
                "end_time": "2025-03-10T14:20:00Z",
                "severity": 3,
                "trigger": null,
                "notes": null
            })),
        )
        .await;

        let (status, body) = send(
            &router,
            "GET",
            &format!("/api/children/{}/calendar/month?month=3&year=2025", child_id),
            Some(&guardian),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let month: EpisodeCalendarMonth = parse(&body);
        // March 1st 2025 is a Saturday
        assert_eq!(month.first_day_of_week, 6);
        let day = month
            .days
            .iter()
            .find(|d| d.day_type == CalendarDayType::MonthDay && d.day == 10)
            .unwrap();
        assert_eq!(day.episodes.len(), 1);
        assert_eq!(day.episodes[0].duration_seconds, 1200);

        let (status, _) = send(
            &router,
            "GET",
            &format!("/api/children/{}/calendar/month?month=13&year=2025", child_id),
            Some(&guardian),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
