//! Application state for the Rt API

use std::sync::Arc;

use crate::gateway::EstimationGateway;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<EstimationGateway>,
}

impl AppState {
    pub fn new(gateway: EstimationGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }

    /// Create AppState around an already shared gateway
    pub fn with_gateway(gateway: Arc<EstimationGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &EstimationGateway {
        &self.gateway
    }
}
