//! Client-local handler registry.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Subscribing under this type receives every non-internal event, after the
/// exact-type handlers have run.
pub const WILDCARD: &str = "*";

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Mapping `event type -> {handler id -> handler}`. Entries whose handler
/// set empties are removed with their key.
pub(crate) struct SubscriptionRegistry {
    handlers: DashMap<String, HashMap<u64, Handler>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn insert(&self, event_type: &str, handler: Handler) -> u64 {
        let handler_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .insert(handler_id, handler);
        handler_id
    }

    pub fn remove(&self, event_type: &str, handler_id: u64) {
        if let Some(mut entry) = self.handlers.get_mut(event_type) {
            entry.remove(&handler_id);
            if entry.is_empty() {
                drop(entry); // Release lock before removal
                self.handlers.remove(event_type);
            }
        }
    }

    /// Handlers registered under exactly this type.
    pub fn handlers_for(&self, event_type: &str) -> Vec<Handler> {
        self.handlers
            .get(event_type)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn type_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Unsubscribe capability returned by `SseClient::subscribe`. Calling
/// [`Subscription::unsubscribe`] more than once is a no-op.
pub struct Subscription {
    registry: Arc<SubscriptionRegistry>,
    event_type: String,
    handler_id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        registry: Arc<SubscriptionRegistry>,
        event_type: String,
        handler_id: u64,
    ) -> Self {
        Self {
            registry,
            event_type,
            handler_id,
            active: AtomicBool::new(true),
        }
    }

    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.registry.remove(&self.event_type, self.handler_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_insert_and_lookup() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry.insert(
            "x.y",
            Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            }),
        );

        for handler in registry.handlers_for("x.y") {
            handler(&json!(null));
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(registry.handlers_for("other").is_empty());
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_prunes_empty_types() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handler_id = registry.insert("x.y", Arc::new(|_| {}));
        let subscription = Subscription::new(registry.clone(), "x.y".to_string(), handler_id);

        assert_eq!(registry.type_count(), 1);
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(registry.type_count(), 0);
        assert!(registry.handlers_for("x.y").is_empty());
    }

    #[test]
    fn test_unsubscribing_one_handler_keeps_the_other() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let first = registry.insert("t", Arc::new(|_| {}));
        let _second = registry.insert("t", Arc::new(|_| {}));

        Subscription::new(registry.clone(), "t".to_string(), first).unsubscribe();
        assert_eq!(registry.handlers_for("t").len(), 1);
        assert_eq!(registry.type_count(), 1);
    }
}
