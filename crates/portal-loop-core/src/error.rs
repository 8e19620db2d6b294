use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image pull failed: {0}")]
    ImagePull(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("instance {0} has no published rpc port (26657/tcp)")]
    MissingRpcPort(String),

    #[error("invalid traffic gate config: {0}")]
    InvalidGateConfig(String),

    #[error("invalid status response: {0}")]
    InvalidStatus(String),

    #[error("timeout getting latest block")]
    ProbeTimeout,

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoopError>;
