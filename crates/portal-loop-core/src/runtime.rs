use crate::error::Result;
use crate::instance::Instance;
use async_trait::async_trait;

/// How an old instance is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container if it is still running.
    pub force: bool,
    /// Remove anonymous volumes attached to the container.
    pub remove_volumes: bool,
    /// Remove the named link instead of the container. Always left `false`;
    /// the runtime garbage-collects links.
    pub remove_links: bool,
}

impl RemoveOptions {
    /// Force-stop, drop volumes, leave links alone.
    pub fn superseded() -> Self {
        Self {
            force: true,
            remove_volumes: true,
            remove_links: false,
        }
    }
}

/// Container runtime operations the orchestrator depends on.
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// Pull the node image. Returns the local id of the tracked image after
    /// the pull, `None` if it is still absent.
    async fn pull(&self) -> Result<Option<String>>;

    /// All instances carrying the node's identity label, newest first.
    async fn list(&self) -> Result<Vec<Instance>>;

    /// Create and start a new instance. The returned value carries its
    /// published port mappings.
    async fn launch(&self) -> Result<Instance>;

    async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<()>;

    async fn remove_volume(&self, name: &str) -> Result<()>;
}

/// Whether `pulled` is a different image from the one `running` was started
/// from. Unknown ids on either side never trigger a swap.
pub fn is_newer(pulled: Option<&str>, running: &Instance) -> bool {
    match (pulled, running.image_id.as_deref()) {
        (Some(pulled), Some(running)) => pulled != running,
        _ => false,
    }
}
