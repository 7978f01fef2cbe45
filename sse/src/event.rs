//! Event and delivery-outcome types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event type reserved for the handshake frame the hub writes when a
/// connection is registered. Producers must not use it.
pub const CONNECTED_EVENT: &str = "connected";

/// Event type reserved for the periodic liveness pulse. Producers must not
/// use it; clients consume it internally without forwarding to handlers.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Returns true for event types the hub and client handle internally.
pub fn is_reserved_event_type(event_type: &str) -> bool {
    event_type == CONNECTED_EVENT || event_type == HEARTBEAT_EVENT
}

/// One message to deliver to a set of connections.
///
/// `id` and `retry` are optional wire-level fields: `id` is echoed verbatim
/// in the frame, `retry` is a reconnection-delay hint in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            id: None,
            retry: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Apply optional wire-level fields supplied by a producer.
    pub fn with_options(mut self, options: EventOptions) -> Self {
        self.id = options.id;
        self.retry = options.retry;
        self
    }

    /// The handshake frame written as the very first bytes of a new stream.
    pub(crate) fn connected(connection_id: &str, timestamp: &str) -> Self {
        Self::new(
            CONNECTED_EVENT,
            json!({ "connectionId": connection_id, "timestamp": timestamp }),
        )
    }

    /// The periodic liveness pulse.
    pub(crate) fn heartbeat(timestamp: &str) -> Self {
        Self::new(HEARTBEAT_EVENT, json!({ "timestamp": timestamp }))
    }
}

/// Optional wire-level fields a producer may attach to an event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventOptions {
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Per-call delivery counts returned by `Hub::send` and its wrappers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub sent: usize,
    pub failed: usize,
}
