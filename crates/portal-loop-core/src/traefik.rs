//! [`TrafficGate`] that edits a Traefik dynamic-configuration file.
//!
//! Routers whose `service` is the node service are the write-capable routes.
//! Read-only mode attaches the read-only middleware to each of them; the
//! upstream target is the single server of the service's load balancer.
//! Traefik's file provider picks up the change without a restart.

use crate::config::GateSpec;
use crate::error::{LoopError, Result};
use crate::gate::{GateMode, TrafficGate};
use crate::instance::Endpoint;
use crate::io::atomic_write;
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct TraefikGate {
    path: PathBuf,
    service: String,
    middleware: String,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl TraefikGate {
    pub fn new(spec: &GateSpec) -> Self {
        Self {
            path: spec.file.clone(),
            service: spec.service.clone(),
            middleware: spec.readonly_middleware.clone(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode currently recorded in the file.
    pub async fn mode(&self) -> Result<GateMode> {
        let _guard = self.lock.lock().await;
        let doc = load(&self.path)?;
        current_mode(&doc, &self.service, &self.middleware)
    }

    async fn edit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Value) -> Result<()>,
    {
        let _guard = self.lock.lock().await;
        let mut doc = load(&self.path)?;
        f(&mut doc)?;
        let out = serde_yaml::to_string(&doc)?;
        atomic_write(&self.path, out.as_bytes())
    }
}

#[async_trait]
impl TrafficGate for TraefikGate {
    async fn set_mode(&self, mode: GateMode) -> Result<()> {
        self.edit(|doc| {
            let touched = apply_mode(doc, &self.service, &self.middleware, mode)?;
            tracing::debug!(mode = mode.as_str(), routers = touched, "traefik mode applied");
            Ok(())
        })
        .await
    }

    async fn repoint(&self, endpoint: &Endpoint) -> Result<()> {
        self.edit(|doc| apply_upstream(doc, &self.service, endpoint.as_str()))
            .await?;
        tracing::info!(%endpoint, file = %self.path.display(), "traefik upstream repointed");
        Ok(())
    }

    async fn upstream(&self) -> Result<Option<Endpoint>> {
        let _guard = self.lock.lock().await;
        let doc = load(&self.path)?;
        Ok(current_upstream(&doc, &self.service).map(Endpoint::new))
    }
}

// ---------------------------------------------------------------------------
// Document edits
// ---------------------------------------------------------------------------

fn load(path: &Path) -> Result<Value> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&data)?)
}

fn invalid(msg: impl Into<String>) -> LoopError {
    LoopError::InvalidGateConfig(msg.into())
}

fn routers_mut(doc: &mut Value) -> Result<&mut Mapping> {
    doc.get_mut("http")
        .ok_or_else(|| invalid("missing `http` section"))?
        .get_mut("routers")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid("missing `http.routers` mapping"))
}

/// Traefik lets routers reference `name@provider`.
fn targets_service(router: &Value, service: &str) -> bool {
    router
        .get("service")
        .and_then(Value::as_str)
        .map(|s| s.split('@').next() == Some(service))
        .unwrap_or(false)
}

/// Add (read-only) or remove (normal) the middleware on every router of
/// `service`. Returns how many routers matched.
pub fn apply_mode(doc: &mut Value, service: &str, middleware: &str, mode: GateMode) -> Result<usize> {
    let routers = routers_mut(doc)?;
    let mut touched = 0;
    for (_, router) in routers.iter_mut() {
        if !targets_service(router, service) {
            continue;
        }
        touched += 1;
        let router = router
            .as_mapping_mut()
            .ok_or_else(|| invalid("router is not a mapping"))?;
        let key = Value::from("middlewares");
        let has_list = router.get(&key).is_some();
        match mode {
            GateMode::ReadOnly => {
                if !has_list {
                    router.insert(key.clone(), Value::Sequence(Vec::new()));
                }
                let list = router
                    .get_mut(&key)
                    .and_then(Value::as_sequence_mut)
                    .ok_or_else(|| invalid("`middlewares` is not a list"))?;
                if !list.iter().any(|m| m.as_str() == Some(middleware)) {
                    list.push(Value::from(middleware));
                }
            }
            GateMode::Normal => {
                if !has_list {
                    continue;
                }
                let list = router
                    .get_mut(&key)
                    .and_then(Value::as_sequence_mut)
                    .ok_or_else(|| invalid("`middlewares` is not a list"))?;
                list.retain(|m| m.as_str() != Some(middleware));
                if list.is_empty() {
                    router.remove(&key);
                }
            }
        }
    }
    if touched == 0 {
        return Err(invalid(format!("no router targets service `{service}`")));
    }
    Ok(touched)
}

/// Point the service's load balancer at `url` as its only server.
pub fn apply_upstream(doc: &mut Value, service: &str, url: &str) -> Result<()> {
    let http = doc
        .get_mut("http")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid("missing `http` section"))?;
    let services = child_mapping(http, "services")?;
    let svc = child_mapping(services, service)?;
    let lb = child_mapping(svc, "loadBalancer")?;

    let mut server = Mapping::new();
    server.insert(Value::from("url"), Value::from(url));
    lb.insert(
        Value::from("servers"),
        Value::Sequence(vec![Value::Mapping(server)]),
    );
    Ok(())
}

fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> Result<&'a mut Mapping> {
    let key = Value::from(key);
    if parent.get(&key).is_none() {
        parent.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    parent
        .get_mut(&key)
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid(format!("`{}` is not a mapping", key.as_str().unwrap_or("?"))))
}

/// Read-only if any router of `service` carries the middleware.
pub fn current_mode(doc: &Value, service: &str, middleware: &str) -> Result<GateMode> {
    let routers = doc
        .get("http")
        .and_then(|h| h.get("routers"))
        .and_then(Value::as_mapping)
        .ok_or_else(|| invalid("missing `http.routers` mapping"))?;
    let read_only = routers
        .iter()
        .filter(|(_, r)| targets_service(r, service))
        .filter_map(|(_, r)| r.get("middlewares").and_then(Value::as_sequence))
        .any(|list| list.iter().any(|m| m.as_str() == Some(middleware)));
    Ok(if read_only {
        GateMode::ReadOnly
    } else {
        GateMode::Normal
    })
}

/// Upstream URL currently configured for `service`, if any.
pub fn current_upstream(doc: &Value, service: &str) -> Option<String> {
    doc.get("http")?
        .get("services")?
        .get(service)?
        .get("loadBalancer")?
        .get("servers")?
        .as_sequence()?
        .first()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}
