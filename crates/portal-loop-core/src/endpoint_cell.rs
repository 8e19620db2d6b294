use crate::instance::Endpoint;
use std::sync::Arc;
use tokio::sync::watch;

/// Last-published active endpoint.
///
/// Written only by the orchestrator, read by the monitoring task. Readers
/// may observe a stale value for a moment after a swap.
#[derive(Debug, Clone)]
pub struct EndpointCell {
    tx: Arc<watch::Sender<Option<Endpoint>>>,
}

impl EndpointCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, endpoint: Endpoint) {
        self.tx.send_replace(Some(endpoint));
    }

    pub fn current(&self) -> Option<Endpoint> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Endpoint>> {
        self.tx.subscribe()
    }

    /// Resolve once an endpoint has been published at least once.
    pub async fn wait_published(&self) -> Endpoint {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(endpoint) = rx.borrow_and_update().clone() {
                return endpoint;
            }
            if rx.changed().await.is_err() {
                // `self` holds the sender, so this is unreachable in practice.
                return std::future::pending().await;
            }
        }
    }
}

impl Default for EndpointCell {
    fn default() -> Self {
        Self::new()
    }
}
