//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::peer::PeerBroker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub broker: Arc<PeerBroker>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            broker: Arc::new(PeerBroker::new()),
        }
    }
}
