use portal_loop_core::EndpointCell;
use prometheus::Registry;

/// Shared state passed to the monitoring handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub endpoint: EndpointCell,
}

impl AppState {
    pub fn new(registry: Registry, endpoint: EndpointCell) -> Self {
        Self { registry, endpoint }
    }
}
