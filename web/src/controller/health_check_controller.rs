use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Liveness probe for load balancers and deploy checks.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Hub process is serving requests", body = String)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
