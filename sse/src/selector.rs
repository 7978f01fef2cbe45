//! Routing predicates for fan-out.

use serde_json::Value;
use std::collections::HashMap;

/// Which connections an event should be delivered to.
///
/// The primary axes are mutually exclusive at the registry level: a specific
/// connection wins over everything else, user and session intersect when both
/// are set, and a selector with neither matches every open connection. The
/// optional metadata predicate is applied as a post-filter in all cases.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub connection_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

impl Selector {
    /// Matches every open connection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn connection(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            ..Self::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Narrows to connections belonging to both the user and the session.
    pub fn user_in_session(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Equality post-filter: every (key, value) pair in the predicate must be
    /// present and equal in the connection's metadata. A connection with no
    /// metadata fails any non-empty predicate.
    pub fn metadata_matches(&self, connection_metadata: &HashMap<String, Value>) -> bool {
        match &self.metadata {
            None => true,
            Some(predicate) => predicate
                .iter()
                .all(|(key, value)| connection_metadata.get(key) == Some(value)),
        }
    }
}
