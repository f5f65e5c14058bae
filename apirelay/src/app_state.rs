use crate::config::Config;
use crate::relay::{RelayError, RemoteRelay};
use crate::store::ConfigStore;

/// Shared per-process handles passed to every request
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: ConfigStore,
    pub relay: RemoteRelay,
    pub max_body_size: usize,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(store: ConfigStore, config: &Config) -> Result<Self, RelayError> {
        Ok(Self {
            store,
            relay: RemoteRelay::new(&config.relay)?,
            max_body_size: config.upload.max_body_size,
            metrics_enabled: config.metrics_enabled(),
        })
    }
}
