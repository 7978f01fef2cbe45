//! Process-wide hub accessor.
//!
//! The producer-facing helpers in [`crate::notifier`] route through a single
//! shared hub. It is lazily created with defaults on first use; deployments
//! that want specific tuning call [`init_global`] during startup, and tests
//! substitute or tear down the instance via [`init_global`] / [`reset_global`].

use crate::hub::{Hub, HubConfig};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

static GLOBAL_HUB: OnceLock<Mutex<Option<Arc<Hub>>>> = OnceLock::new();

fn cell() -> &'static Mutex<Option<Arc<Hub>>> {
    GLOBAL_HUB.get_or_init(|| Mutex::new(None))
}

/// The shared hub, creating one with default configuration on first use.
/// The lazily-created instance does not run a heartbeat loop; call
/// [`init_global`] with `Hub::start` semantics for that.
pub fn global() -> Arc<Hub> {
    let mut guard = cell().lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_ref() {
        Some(hub) => hub.clone(),
        None => {
            let hub = Hub::new(HubConfig::default());
            *guard = Some(hub.clone());
            hub
        }
    }
}

/// Install a configured hub as the shared instance, shutting down any
/// previous one. Returns the installed hub.
pub fn init_global(hub: Arc<Hub>) -> Arc<Hub> {
    let mut guard = cell().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = guard.replace(hub.clone()) {
        previous.shutdown();
    }
    hub
}

/// Shut down and discard the shared instance. The next [`global`] call
/// lazily creates a fresh default hub.
pub fn reset_global() {
    let mut guard = cell().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = guard.take() {
        previous.shutdown();
    }
}
