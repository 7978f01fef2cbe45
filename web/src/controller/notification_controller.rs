use crate::error::{Error as WebError, Result as WebResult, WebErrorKind};
use crate::extractors::caller_identity::CallerIdentity;
use crate::params::notification::NotificationParams;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde_json::json;
use service::AppState;
use sse::event::is_reserved_event_type;
use sse::Event;

/// POST /api/sse/notifications - producer endpoint.
///
/// Validates the payload, routes to the targeted user's connections or
/// broadcasts, and reports the delivery counts.
#[utoipa::path(
    post,
    path = "/api/sse/notifications",
    request_body = NotificationParams,
    responses(
        (status = 200, description = "Event accepted and fanned out"),
        (status = 400, description = "Missing or invalid eventType/data"),
        (status = 401, description = "Authentication required but no caller identity supplied")
    )
)]
pub(crate) async fn create(
    State(app_state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Json(params): Json<NotificationParams>,
) -> WebResult<impl IntoResponse> {
    if app_state.config.protect_notifications && user_id.is_none() {
        return Err(WebError::Web(WebErrorKind::Auth));
    }

    if params.event_type.trim().is_empty() {
        return Err(WebError::input("eventType must be a non-empty string"));
    }
    if is_reserved_event_type(&params.event_type) {
        return Err(WebError::input(
            "eventType is reserved for internal hub events",
        ));
    }
    if params.data.is_null() {
        return Err(WebError::input("data is required"));
    }

    let mut event = Event::new(&params.event_type, params.data);
    if let Some(options) = params.options {
        event = event.with_options(options.into());
    }

    let target_user = params.target.and_then(|target| target.user_id);
    let outcome = match &target_user {
        Some(target_user) => app_state.hub.send_to_user(target_user, &event),
        None => app_state.hub.broadcast(&event),
    };

    debug!(
        "Notification {} routed to {:?}: sent={} failed={}",
        params.event_type, target_user, outcome.sent, outcome.failed
    );

    Ok(Json(json!({
        "success": true,
        "eventType": params.event_type,
        "sent": outcome.sent,
        "failed": outcome.failed,
        "message": format!("event delivered to {} connection(s)", outcome.sent),
    })))
}
