//! Chain-height recorder.
//!
//! Polls the active node's `/status` and exports the latest block height, so
//! a stalled portal loop is visible on the metrics endpoint.

use portal_loop_core::probe::StatusSource;
use portal_loop_core::EndpointCell;
use prometheus::{register_int_gauge_with_registry, IntGauge, Registry};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ChainMetrics {
    pub latest_block_height: IntGauge,
}

impl ChainMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            latest_block_height: register_int_gauge_with_registry!(
                "portal_loop_latest_block_height",
                "Latest block height reported by the active portal loop",
                registry,
            )
            .expect("this is a valid metrics registration"),
        }
    }
}

/// Record the active endpoint's height every `interval`, forever.
///
/// Waits for the first published endpoint, then follows whatever endpoint is
/// current at each tick. Failed polls leave the gauge at its last value.
pub async fn record_chain_height(
    source: Arc<dyn StatusSource>,
    endpoint: EndpointCell,
    metrics: ChainMetrics,
    interval: Duration,
) {
    let mut active = endpoint.wait_published().await;
    loop {
        if let Some(current) = endpoint.current() {
            active = current;
        }
        match source.latest_height(&active).await {
            Ok(height) => metrics.latest_block_height.set(height as i64),
            Err(e) => tracing::debug!(endpoint = %active, error = %e, "height poll failed"),
        }
        tokio::time::sleep(interval).await;
    }
}
