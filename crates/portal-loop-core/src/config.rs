use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Internal RPC port of the node container.
pub const RPC_PORT: u16 = 26657;

/// Label carried by every container this supervisor manages.
pub const DEFAULT_LABEL: &str = "the-portal-loop";

// ---------------------------------------------------------------------------
// ProbePolicy
// ---------------------------------------------------------------------------

/// Readiness policy for a freshly launched instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbePolicy {
    #[serde(default = "default_probe_deadline", with = "secs")]
    pub deadline: Duration,
    #[serde(default = "default_poll_interval", with = "secs")]
    pub poll_interval: Duration,
    #[serde(default = "default_target_height")]
    pub target_height: u64,
}

fn default_probe_deadline() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_target_height() -> u64 {
    5
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            deadline: default_probe_deadline(),
            poll_interval: default_poll_interval(),
            target_height: default_target_height(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContainerSpec
// ---------------------------------------------------------------------------

/// How a new portal loop container is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_entrypoint")]
    pub entrypoint: Vec<String>,
    #[serde(default = "default_env")]
    pub env: Vec<String>,
}

fn default_image() -> String {
    "ghcr.io/gnolang/gno/gnoland:master".to_string()
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

fn default_name_prefix() -> String {
    "portal-loop".to_string()
}

fn default_entrypoint() -> Vec<String> {
    vec!["/scripts/start.sh".to_string()]
}

fn default_env() -> Vec<String> {
    vec![
        "MONIKER=the-portal-loop".to_string(),
        "GENESIS_BACKUP_FILE=/backups/backup.jsonl".to_string(),
    ]
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            label: default_label(),
            name_prefix: default_name_prefix(),
            entrypoint: default_entrypoint(),
            env: default_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateSpec
// ---------------------------------------------------------------------------

/// Names inside the Traefik dynamic configuration the gate edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSpec {
    #[serde(default = "default_gate_file")]
    pub file: PathBuf,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_readonly_middleware")]
    pub readonly_middleware: String,
}

fn default_gate_file() -> PathBuf {
    PathBuf::from("./traefik/gno.yml")
}

fn default_service() -> String {
    "portal-loop".to_string()
}

fn default_readonly_middleware() -> String {
    "portal-loop-readonly".to_string()
}

impl Default for GateSpec {
    fn default() -> Self {
        Self {
            file: default_gate_file(),
            service: default_service(),
            readonly_middleware: default_readonly_middleware(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host path of the working directory; bind mounts are resolved against it.
    #[serde(default = "default_host_pwd")]
    pub host_pwd: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_prom_addr")]
    pub prom_addr: String,
    #[serde(default = "default_cycle_interval", with = "secs")]
    pub cycle_interval: Duration,
    #[serde(default)]
    pub container: ContainerSpec,
    #[serde(default)]
    pub gate: GateSpec,
    #[serde(default)]
    pub probe: ProbePolicy,
}

/// `$PWD`, else the process working directory.
pub fn default_host_pwd() -> PathBuf {
    std::env::var_os("PWD")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_rpc_url() -> String {
    "http://rpc.portal.gno.local:81".to_string()
}

fn default_prom_addr() -> String {
    ":9090".to_string()
}

fn default_cycle_interval() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    pub fn new(host_pwd: impl Into<PathBuf>) -> Self {
        Self {
            host_pwd: host_pwd.into(),
            backup_dir: default_backup_dir(),
            rpc_url: default_rpc_url(),
            prom_addr: default_prom_addr(),
            cycle_interval: default_cycle_interval(),
            container: ContainerSpec::default(),
            gate: GateSpec::default(),
            probe: ProbePolicy::default(),
        }
    }

    /// Load a YAML config file. Missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Backup directory as seen from the host, for bind mounting.
    pub fn host_backup_dir(&self) -> PathBuf {
        if self.backup_dir.is_absolute() {
            self.backup_dir.clone()
        } else {
            let relative = self
                .backup_dir
                .strip_prefix(".")
                .unwrap_or(&self.backup_dir);
            self.host_pwd.join(relative)
        }
    }

    /// Metrics bind address with a bare `:port` expanded to all interfaces.
    pub fn metrics_bind_addr(&self) -> String {
        normalize_bind_addr(&self.prom_addr)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_host_pwd())
    }
}

/// Expand `:9090` to `0.0.0.0:9090`; anything else is returned unchanged.
pub fn normalize_bind_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
