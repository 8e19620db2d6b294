//! Readiness probe for a freshly launched node.
//!
//! A node is ready once `/status` reports a block height at or above the
//! policy target. This is a liveness check, not a sync check: the target is
//! a small bootstrap height.

use crate::config::ProbePolicy;
use crate::error::{LoopError, Result};
use crate::instance::Endpoint;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a single status poll.
#[derive(Debug)]
pub enum PollStatus {
    /// Height reached the target.
    Ready(u64),
    /// Node answered but is still below the target. Retried silently.
    Behind(u64),
    /// Transport or decoding failure. Logged, then retried.
    Failed(LoopError),
}

/// Reports the latest block height of a node.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn latest_height(&self, endpoint: &Endpoint) -> Result<u64>;
}

/// Classify one poll against `target`.
pub async fn poll_once<S>(source: &S, endpoint: &Endpoint, target: u64) -> PollStatus
where
    S: StatusSource + ?Sized,
{
    match source.latest_height(endpoint).await {
        Ok(h) if h >= target => PollStatus::Ready(h),
        Ok(h) => PollStatus::Behind(h),
        Err(e) => PollStatus::Failed(e),
    }
}

/// Poll `endpoint` until it is ready or `policy.deadline` elapses.
///
/// The deadline is checked before each poll, so a node that never becomes
/// ready is polled `deadline / poll_interval + 1` times. Returns the height
/// that satisfied the policy.
pub async fn wait_ready<S>(source: &S, endpoint: &Endpoint, policy: &ProbePolicy) -> Result<u64>
where
    S: StatusSource + ?Sized,
{
    let started = Instant::now();
    loop {
        if started.elapsed() > policy.deadline {
            return Err(LoopError::ProbeTimeout);
        }
        match poll_once(source, endpoint, policy.target_height).await {
            PollStatus::Ready(height) => {
                tracing::info!(%endpoint, height, "new portal loop is ready");
                return Ok(height);
            }
            PollStatus::Behind(height) => {
                tracing::debug!(%endpoint, "blocks: {height}/{}", policy.target_height);
            }
            PollStatus::Failed(e) => {
                tracing::error!(%endpoint, error = %e, "status poll failed");
            }
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

// ---------------------------------------------------------------------------
// HTTP status source
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

#[derive(Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Deserialize)]
struct SyncInfo {
    latest_block_height: String,
}

/// Parse a Tendermint-style `/status` body.
pub fn parse_status(body: &[u8]) -> Result<u64> {
    let status: StatusResponse = serde_json::from_slice(body)?;
    let raw = status.result.sync_info.latest_block_height;
    raw.trim()
        .parse()
        .map_err(|_| LoopError::InvalidStatus(format!("latest_block_height {raw:?}")))
}

/// Queries `GET <endpoint>/status`.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
}

impl HttpStatusSource {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn latest_height(&self, endpoint: &Endpoint) -> Result<u64> {
        let resp = self
            .client
            .get(endpoint.join("/status"))
            .send()
            .await?
            .error_for_status()?;
        let body = resp.bytes().await?;
        parse_status(&body)
    }
}
