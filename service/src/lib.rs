use config::Config;
use sse::Hub;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, hub: &Arc<Hub>) -> Self {
        Self {
            hub: Arc::clone(hub),
            config: app_config,
        }
    }

    pub fn hub_ref(&self) -> &Hub {
        self.hub.as_ref()
    }
}
