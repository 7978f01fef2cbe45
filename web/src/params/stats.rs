use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters of `GET /api/sse/stats`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Restrict the connection list to one user.
    pub user_id: Option<String>,
    /// Restrict the connection list to one session.
    pub session_id: Option<String>,
    /// Include the per-connection list in the response.
    pub show_connections: Option<bool>,
}

impl StatsQuery {
    /// A connection list is returned when explicitly requested or when any
    /// filter is supplied.
    pub fn wants_connections(&self) -> bool {
        self.show_connections.unwrap_or(false)
            || self.user_id.is_some()
            || self.session_id.is_some()
    }
}
