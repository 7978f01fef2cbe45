use crate::controller::{
    health_check_controller, notification_controller, stats_controller, stream_controller,
};
use crate::params;
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use service::AppState;
use tower_http::cors::{Any, CorsLayer};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Pulse Event Hub API"
        ),
        paths(
            stream_controller::stream,
            notification_controller::create,
            stats_controller::index,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                params::notification::NotificationParams,
                params::notification::TargetParams,
                params::notification::OptionsParams,
            )
        ),
        tags(
            (name = "pulse_hub", description = "Server-sent event fan-out API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(sse_routes(app_state))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(cors_layer())
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sse", get(stream_controller::stream))
        .route("/api/sse/notifications", post(notification_controller::create))
        .route("/api/sse/stats", get(stats_controller::index))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

// Streams are consumed cross-origin by browser dashboards; the preflight
// must admit the Cache-Control header EventSource polyfills send.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CACHE_CONTROL,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use service::config::Config;
    use sse::codec::FrameDecoder;
    use sse::{Hub, HubConfig};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app(args: &[&str]) -> (Router, Arc<Hub>) {
        let mut argv = vec!["pulse-hub"];
        argv.extend_from_slice(args);
        let config = <Config as clap::Parser>::parse_from(argv);
        let hub = Hub::new(HubConfig {
            enable_heartbeat: false,
            ..config.hub_config()
        });
        let app_state = AppState::new(config, &hub);
        (define_routes(app_state), hub)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_responds_ok() {
        let (app, _hub) = test_app(&[]);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_first_frame_is_connected() {
        let (app, hub) = test_app(&[]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sse?sessionId=s1&channel=alpha")
                    .header("x-user-id", "u1")
                    .header("user-agent", "test-agent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
        assert_eq!(response.headers()["cache-control"], "no-cache");

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("timed out waiting for handshake")
            .expect("stream ended")
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(&chunk);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "connected");
        let connection_id = events[0].data["connectionId"].as_str().unwrap().to_string();

        // The registry reflects the identity, session and metadata.
        let connection = hub
            .get_connection(&connection_id.as_str().into())
            .expect("connection registered");
        assert_eq!(connection.user_id.as_deref(), Some("u1"));
        assert_eq!(connection.session_id.as_deref(), Some("s1"));
        assert_eq!(connection.metadata["channel"], json!("alpha"));
        assert_eq!(connection.metadata["isAuthenticated"], json!(true));

        // Dropping the body is the client disconnect; the hub deregisters.
        drop(body);
        assert!(hub.get_connection(&connection_id.as_str().into()).is_none());
    }

    #[tokio::test]
    async fn test_stream_requires_auth_when_configured() {
        let (app, hub) = test_app(&["--require-auth"]);
        let response = app
            .oneshot(Request::builder().uri("/api/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_derives_anonymous_session_id() {
        let (app, hub) = test_app(&[]);
        let response = app
            .oneshot(Request::builder().uri("/api/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let connection = hub
            .list_connections(&sse::Selector::all())
            .pop()
            .expect("connection registered");
        let session_id = connection.session_id.as_deref().unwrap();
        assert!(session_id.starts_with("anon_"));
        assert!(session_id.len() <= "anon_".len() + 16);
    }

    #[tokio::test]
    async fn test_capacity_exhaustion_maps_to_503() {
        let (app, hub) = test_app(&["--max-connections", "1"]);
        let (_, _stream) = hub.create_connection(None, None, HashMap::new()).unwrap();

        let response = app
            .oneshot(Request::builder().uri("/api/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_notifications_validate_event_type_and_data() {
        let (app, _hub) = test_app(&[]);
        for body in [
            json!({"eventType": "", "data": {"n": 1}}),
            json!({"eventType": "t", "data": null}),
            json!({"eventType": "heartbeat", "data": {"n": 1}}),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/sse/notifications")
                        .header("content-type", "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        }
    }

    #[tokio::test]
    async fn test_notifications_target_user_and_report_counts() {
        let (app, hub) = test_app(&[]);
        let (_, _u1_stream) = hub
            .create_connection(Some("u1".into()), None, HashMap::new())
            .unwrap();
        let (_, _u2_stream) = hub
            .create_connection(Some("u2".into()), None, HashMap::new())
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sse/notifications")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "eventType": "user.message",
                            "data": {"n": 1},
                            "target": {"userId": "u1"},
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["eventType"], json!("user.message"));
        assert_eq!(body["sent"], json!(1));
        assert_eq!(body["failed"], json!(0));

        // Without a target the event broadcasts.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sse/notifications")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"eventType": "user.message", "data": {"n": 2}}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["sent"], json!(2));
    }

    #[tokio::test]
    async fn test_notifications_auth_policy_flag() {
        let (app, _hub) = test_app(&["--protect-notifications"]);
        let request = |user_header: Option<&str>| {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/api/sse/notifications")
                .header("content-type", "application/json");
            if let Some(user_id) = user_header {
                builder = builder.header("x-user-id", user_id);
            }
            builder
                .body(Body::from(
                    json!({"eventType": "t", "data": {}}).to_string(),
                ))
                .unwrap()
        };

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request(Some("u1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_include_connection_list_on_request() {
        let (app, hub) = test_app(&[]);
        let (_, _stream) = hub
            .create_connection(Some("u1".into()), Some("s1".into()), HashMap::new())
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/sse/stats?showConnections=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["stats"]["totalConnections"], json!(1));
        assert_eq!(body["connections"].as_array().unwrap().len(), 1);
        assert!(body["requestInfo"]["timestamp"].is_string());

        // A filter alone also yields the list; a bare request does not.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/sse/stats?userId=u2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["connections"].as_array().unwrap().len(), 0);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sse/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert!(body.get("connections").is_none());
    }

    #[tokio::test]
    async fn test_preflight_gets_permissive_cors() {
        let (app, _hub) = test_app(&[]);
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/sse")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "GET")
                    .header("access-control-request-headers", "cache-control")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let allow_methods = response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .to_string();
        assert!(allow_methods.contains("GET"));
        assert!(allow_methods.contains("OPTIONS"));
        let allow_headers = response.headers()["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .to_lowercase();
        assert!(allow_headers.contains("cache-control"));
    }
}
