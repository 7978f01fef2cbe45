use crate::error::Result as WebResult;
use crate::params::stats::StatsQuery;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use service::AppState;
use sse::{ConnectionSnapshot, Selector};

/// GET /api/sse/stats - hub statistics, optionally with the connection list.
#[utoipa::path(
    get,
    path = "/api/sse/stats",
    params(StatsQuery),
    responses(
        (status = 200, description = "Hub statistics snapshot")
    )
)]
pub(crate) async fn index(
    State(app_state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> WebResult<impl IntoResponse> {
    let stats = app_state.hub.stats();

    let mut body = json!({
        "stats": stats,
        "requestInfo": {
            "timestamp": Utc::now().to_rfc3339(),
            "filters": {
                "userId": query.user_id,
                "sessionId": query.session_id,
            },
        },
    });

    if query.wants_connections() {
        let selector = Selector {
            user_id: query.user_id.clone(),
            session_id: query.session_id.clone(),
            ..Selector::default()
        };
        let connections: Vec<ConnectionSnapshot> = app_state
            .hub
            .list_connections(&selector)
            .iter()
            .map(|connection| connection.snapshot())
            .collect();
        body["connections"] = json!(connections);
    }

    Ok(Json(body))
}
