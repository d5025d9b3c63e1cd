use std::sync::Arc;

use crate::gateway::ServiceGateway;
use crate::jobs::registry::HandlerRegistry;
use crate::jobs::store::JobStore;

/// Shared application state injected into all route handlers via Axum
/// extractors.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub gateway: Arc<ServiceGateway>,
    /// Used at enqueue time to reject job types nothing can process.
    pub registry: Arc<HandlerRegistry>,
}
