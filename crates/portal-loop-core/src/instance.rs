//! Runtime-agnostic view of a node container and the address it serves on.

use crate::config::RPC_PORT;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PortMapping / Mount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub host_ip: Option<String>,
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(private_port: u16, public_port: u16) -> Self {
        Self {
            private_port,
            public_port: Some(public_port),
            host_ip: None,
            protocol: Protocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Volume,
    Bind,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub kind: MountKind,
    pub name: Option<String>,
}

impl Mount {
    pub fn volume(name: impl Into<String>) -> Self {
        Self {
            kind: MountKind::Volume,
            name: Some(name.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// A running (or recently stopped) portal loop container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    /// Content id of the image the container runs (`sha256:...`).
    pub image_id: Option<String>,
    /// Unix seconds.
    pub created: i64,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<Mount>,
}

impl Instance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            image: None,
            image_id: None,
            created: 0,
            ports: Vec::new(),
            mounts: Vec::new(),
        }
    }

    pub fn with_port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Endpoint of the RPC port: the first 26657/tcp mapping with a published
    /// port. `None` when no mapping qualifies.
    pub fn rpc_endpoint(&self) -> Option<Endpoint> {
        self.ports
            .iter()
            .filter(|p| p.protocol == Protocol::Tcp && p.private_port == RPC_PORT)
            .find_map(|p| p.public_port)
            .map(Endpoint::localhost)
    }

    /// Names of the named volumes attached to this instance.
    pub fn volume_names(&self) -> impl Iterator<Item = &str> {
        self.mounts
            .iter()
            .filter(|m| m.kind == MountKind::Volume)
            .filter_map(|m| m.name.as_deref())
    }

    /// Short id for log lines.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Externally reachable base URL of an instance's RPC port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into().trim_end_matches('/').to_string())
    }

    pub fn localhost(port: u16) -> Self {
        Self(format!("http://localhost:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<endpoint><path>`, with `path` expected to start with `/`.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
