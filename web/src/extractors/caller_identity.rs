use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Header the upstream auth layer sets for authenticated requests.
/// Authentication itself happens outside this service; an empty or missing
/// header means the caller is anonymous.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

/// The caller identity injected by the reverse proxy, or `None` for an
/// anonymous request. Whether anonymous callers are allowed is decided per
/// endpoint against the deployment configuration.
pub(crate) struct CallerIdentity(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(CallerIdentity(user_id))
    }
}
