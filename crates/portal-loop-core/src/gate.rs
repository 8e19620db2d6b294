use crate::error::Result;
use crate::instance::Endpoint;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Normal,
    ReadOnly,
}

impl GateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GateMode::Normal => "normal",
            GateMode::ReadOnly => "read-only",
        }
    }
}

/// Reverse-proxy controls. Both operations must be atomic for anyone reading
/// the proxy configuration concurrently.
#[async_trait]
pub trait TrafficGate: Send + Sync {
    async fn set_mode(&self, mode: GateMode) -> Result<()>;

    async fn repoint(&self, endpoint: &Endpoint) -> Result<()>;

    /// Endpoint traffic is currently routed to, if one is configured.
    async fn upstream(&self) -> Result<Option<Endpoint>>;
}

/// Run `body` with the gate held in read-only mode.
///
/// Normal mode is restored after `body` finishes, whether it returned `Ok`,
/// `Err`, or panicked (the panic resumes once the gate is restored). A failed
/// restore is logged and does not change the result of `body`.
///
/// If switching to read-only fails, `body` is not run.
pub async fn with_read_only<G, F, T>(gate: &G, body: F) -> Result<T>
where
    G: TrafficGate + ?Sized,
    F: Future<Output = Result<T>>,
{
    gate.set_mode(GateMode::ReadOnly).await?;
    tracing::info!("traffic gate set to read-only");

    let outcome = AssertUnwindSafe(body).catch_unwind().await;

    match gate.set_mode(GateMode::Normal).await {
        Ok(()) => tracing::info!("traffic gate restored to normal"),
        Err(e) => tracing::error!(error = %e, "failed to restore traffic gate to normal mode"),
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
