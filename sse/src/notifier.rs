//! Producer-facing helpers over the shared hub.
//!
//! Host-application code that wants to push an event does not deal with
//! selectors or encoding; it calls one of these typed wrappers and gets the
//! delivery counts back.

use crate::connection::ConnectionSnapshot;
use crate::event::{Event, EventOptions, SendOutcome};
use crate::global::global;
use crate::hub::HubStats;
use crate::selector::Selector;
use serde_json::Value;

fn build_event(event_type: &str, data: Value, options: Option<EventOptions>) -> Event {
    let event = Event::new(event_type, data);
    match options {
        Some(options) => event.with_options(options),
        None => event,
    }
}

/// Deliver to every open connection of one user.
pub fn notify_user(
    user_id: &str,
    event_type: &str,
    data: Value,
    options: Option<EventOptions>,
) -> SendOutcome {
    global().send_to_user(user_id, &build_event(event_type, data, options))
}

/// Deliver to every connection sharing one session.
pub fn notify_session(
    session_id: &str,
    event_type: &str,
    data: Value,
    options: Option<EventOptions>,
) -> SendOutcome {
    global().send_to_session(session_id, &build_event(event_type, data, options))
}

/// Deliver to a single connection.
pub fn notify_connection(
    connection_id: &str,
    event_type: &str,
    data: Value,
    options: Option<EventOptions>,
) -> SendOutcome {
    global().send_to_connection(connection_id, &build_event(event_type, data, options))
}

/// Deliver to every open connection.
pub fn broadcast(event_type: &str, data: Value, options: Option<EventOptions>) -> SendOutcome {
    global().broadcast(&build_event(event_type, data, options))
}

/// Deliver to whatever the selector matches.
pub fn notify_filtered(
    selector: &Selector,
    event_type: &str,
    data: Value,
    options: Option<EventOptions>,
) -> SendOutcome {
    global().send(&build_event(event_type, data, options), selector)
}

pub fn get_stats() -> HubStats {
    global().stats()
}

pub fn get_active_connections(selector: Option<&Selector>) -> Vec<ConnectionSnapshot> {
    let all = Selector::all();
    global()
        .list_connections(selector.unwrap_or(&all))
        .iter()
        .map(|connection| connection.snapshot())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::{init_global, reset_global};
    use crate::hub::{Hub, HubConfig};
    use serde_json::json;
    use std::collections::HashMap;

    // One test owns the process-wide hub for its whole lifetime; splitting
    // these assertions into separate #[test] functions would race on it.
    #[tokio::test]
    async fn test_notifier_routes_through_the_global_hub() {
        let hub = init_global(Hub::new(HubConfig::default()));

        let (_, _user_stream) = hub
            .create_connection(Some("u1".into()), Some("s1".into()), HashMap::new())
            .unwrap();
        let (connection, _anon_stream) = hub
            .create_connection(None, None, HashMap::new())
            .unwrap();

        assert_eq!(
            notify_user("u1", "t", json!({"n": 1}), None),
            SendOutcome { sent: 1, failed: 0 }
        );
        assert_eq!(
            notify_session("s1", "t", json!(null), None),
            SendOutcome { sent: 1, failed: 0 }
        );
        assert_eq!(
            notify_connection(connection.id.as_str(), "t", json!(null), None),
            SendOutcome { sent: 1, failed: 0 }
        );
        assert_eq!(
            broadcast("t", json!(null), None),
            SendOutcome { sent: 2, failed: 0 }
        );
        assert_eq!(
            notify_filtered(&Selector::user_in_session("u1", "s1"), "t", json!(null), None),
            SendOutcome { sent: 1, failed: 0 }
        );

        let stats = get_stats();
        assert_eq!(stats.registry.total_connections, 2);
        assert_eq!(stats.registry.authenticated_connections, 1);
        assert_eq!(stats.total_events_sent, 6);

        assert_eq!(get_active_connections(None).len(), 2);
        assert_eq!(
            get_active_connections(Some(&Selector::user("u1"))).len(),
            1
        );

        reset_global();
        // A fresh default hub appears on next use and is empty.
        assert_eq!(get_stats().registry.total_connections, 0);
        reset_global();
    }
}
