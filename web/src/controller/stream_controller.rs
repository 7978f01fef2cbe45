use crate::error::{Error as WebError, Result as WebResult, WebErrorKind};
use crate::extractors::caller_identity::CallerIdentity;
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use log::*;
use serde_json::{json, Value};
use service::AppState;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Query parameter carrying the caller-chosen session id; everything else in
/// the query string passes through as connection metadata.
const SESSION_ID_PARAM: &str = "sessionId";

/// GET /api/sse - upgrade the request to a long-lived event stream.
///
/// The response body stays open until the client disconnects, the connection
/// is evicted, or the hub shuts down. The first frame on it is the
/// `connected` handshake carrying the server-minted connection id.
#[utoipa::path(
    get,
    path = "/api/sse",
    params(
        ("sessionId" = Option<String>, Query, description = "Logical session grouping; derived from the caller identity when absent")
    ),
    responses(
        (status = 200, description = "Event stream established", content_type = "text/event-stream"),
        (status = 401, description = "Authentication required but no caller identity supplied"),
        (status = 503, description = "Connection limit reached or server shutting down")
    )
)]
pub(crate) async fn stream(
    State(app_state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> WebResult<Response> {
    if app_state.config.require_auth && user_id.is_none() {
        return Err(WebError::Web(WebErrorKind::Auth));
    }

    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let now = Utc::now();
    let session_id = query
        .get(SESSION_ID_PARAM)
        .cloned()
        .unwrap_or_else(|| match &user_id {
            Some(user_id) => format!("auth_{}_{}", user_id, now.timestamp_millis()),
            None => {
                let mut digest =
                    BASE64.encode(format!("{ip}|{user_agent}|{}", now.timestamp_millis()));
                digest.truncate(16);
                format!("anon_{digest}")
            }
        });

    let mut metadata: HashMap<String, Value> = HashMap::from([
        ("ip".to_string(), json!(ip)),
        ("userAgent".to_string(), json!(user_agent)),
        ("isAuthenticated".to_string(), json!(user_id.is_some())),
        ("connectionTime".to_string(), json!(now.to_rfc3339())),
    ]);
    for (key, value) in &query {
        if key != SESSION_ID_PARAM {
            metadata.insert(key.clone(), json!(value));
        }
    }

    let (connection, stream) =
        app_state
            .hub
            .create_connection(user_id, Some(session_id), metadata)?;
    debug!("Established SSE stream for connection {}", connection.id);

    let mut response = Response::new(Body::from_stream(stream));
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

/// Prefer the proxy-reported client address over the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(addr)), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(addr)), "127.0.0.1");
        assert_eq!(client_ip(&headers, None), "unknown");
    }
}
