//! Blue-green swap orchestration.
//!
//! One deployment cycle:
//!
//! ```text
//! pull ─► list ─┬─ none ──────────► launch ─► repoint ─► publish
//!               ├─ some, same image ► (adopt endpoint if unknown)
//!               └─ some, new image ─► [read-only] backup ─► launch ─► probe
//!                                       ─► repoint ─► publish ─► remove old [normal]
//! ```
//!
//! The "active" instance is the one behind the published endpoint, not
//! necessarily the newest: a failed swap leaves its never-ready container
//! in the list. Freshness compares the pulled image with the active one, so
//! a failed swap is retried on the next cycle.
//!
//! Cycles run sequentially; a swap is never interrupted by shutdown.

use crate::backup::BackupAgent;
use crate::config::{Config, ProbePolicy};
use crate::endpoint_cell::EndpointCell;
use crate::error::{LoopError, Result};
use crate::gate::{with_read_only, TrafficGate};
use crate::instance::{Endpoint, Instance};
use crate::metrics::OrchestratorMetrics;
use crate::probe::{wait_ready, StatusSource};
use crate::runtime::{is_newer, RemoveOptions, RuntimeGateway};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// External systems the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub runtime: Arc<dyn RuntimeGateway>,
    pub gate: Arc<dyn TrafficGate>,
    pub backup: Arc<dyn BackupAgent>,
    pub status: Arc<dyn StatusSource>,
}

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was running; a first instance was launched. The endpoint is
    /// `None` when the instance exposes no usable RPC mapping.
    Bootstrapped(Option<Endpoint>),
    /// An existing instance's endpoint was learned (e.g. after a restart).
    Adopted(Endpoint),
    /// Nothing to do.
    Unchanged,
    /// A new instance took over; `removed` old instances were reclaimed.
    Swapped { endpoint: Endpoint, removed: usize },
}

pub struct Orchestrator {
    runtime: Arc<dyn RuntimeGateway>,
    gate: Arc<dyn TrafficGate>,
    backup: Arc<dyn BackupAgent>,
    status: Arc<dyn StatusSource>,
    endpoint: EndpointCell,
    probe: ProbePolicy,
    interval: Duration,
    metrics: OrchestratorMetrics,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, endpoint: EndpointCell, config: &Config) -> Self {
        Self {
            runtime: collaborators.runtime,
            gate: collaborators.gate,
            backup: collaborators.backup,
            status: collaborators.status,
            endpoint,
            probe: config.probe.clone(),
            interval: config.cycle_interval,
            metrics: OrchestratorMetrics::unregistered(),
        }
    }

    pub fn with_metrics(mut self, metrics: OrchestratorMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn endpoint(&self) -> &EndpointCell {
        &self.endpoint
    }

    /// Run cycles forever, sleeping `cycle_interval` between them, until
    /// `shutdown` resolves. Cycle errors are logged and never end the loop.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            match self.run_cycle().await {
                Ok(outcome) => tracing::info!(?outcome, "cycle complete"),
                Err(e) => tracing::error!(error = %e, "cycle failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping orchestrator");
                    return;
                }
            }
        }
    }

    /// Execute exactly one deployment cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.metrics.cycles.inc();
        let result = self.cycle().await;
        if result.is_err() {
            self.metrics.cycle_failures.inc();
        }
        result
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        tracing::info!("starting the portal loop cycle");

        let pulled = self.runtime.pull().await?;
        let instances = self.runtime.list().await?;
        self.metrics.instances.set(instances.len() as i64);

        if instances.is_empty() {
            return self.bootstrap().await;
        }

        let adopted = if self.endpoint.current().is_none() {
            self.adopt(&instances).await?
        } else {
            None
        };

        let active = self.active_instance(&instances);
        if !is_newer(pulled.as_deref(), active) {
            return Ok(adopted.map_or(CycleOutcome::Unchanged, CycleOutcome::Adopted));
        }

        tracing::info!(
            active = active.short_id(),
            instances = instances.len(),
            "new image available, swapping portal loop"
        );
        self.metrics.gate_read_only.set(1);
        let swapped = with_read_only(self.gate.as_ref(), self.swap(active, &instances)).await;
        self.metrics.gate_read_only.set(0);

        let endpoint = swapped?;
        self.metrics.swaps.inc();
        Ok(CycleOutcome::Swapped {
            endpoint,
            removed: instances.len(),
        })
    }

    async fn bootstrap(&self) -> Result<CycleOutcome> {
        tracing::info!("no portal loop instance found, starting one");
        let instance = self.runtime.launch().await?;
        let Some(endpoint) = instance.rpc_endpoint() else {
            tracing::warn!(
                instance = instance.short_id(),
                "launched instance exposes no rpc port, endpoint left unset"
            );
            return Ok(CycleOutcome::Bootstrapped(None));
        };
        self.gate.repoint(&endpoint).await?;
        self.endpoint.publish(endpoint.clone());
        Ok(CycleOutcome::Bootstrapped(Some(endpoint)))
    }

    /// Instance behind the published endpoint, else the newest one.
    fn active_instance<'a>(&self, instances: &'a [Instance]) -> &'a Instance {
        let current = self.endpoint.current();
        instances
            .iter()
            .find(|i| current.is_some() && i.rpc_endpoint() == current)
            .unwrap_or(&instances[0])
    }

    /// Learn the endpoint of an already running instance, preferring the one
    /// the gate already routes to over the newest.
    async fn adopt(&self, instances: &[Instance]) -> Result<Option<Endpoint>> {
        let upstream = match self.gate.upstream().await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(error = %e, "unable to read current upstream");
                None
            }
        };
        let active = instances
            .iter()
            .find(|i| upstream.is_some() && i.rpc_endpoint() == upstream)
            .unwrap_or(&instances[0]);

        let Some(endpoint) = active.rpc_endpoint() else {
            tracing::warn!(
                instance = active.short_id(),
                "running instance exposes no rpc port, endpoint left unset"
            );
            return Ok(None);
        };
        tracing::info!(instance = active.short_id(), %endpoint, "adopting running portal loop");
        self.gate.repoint(&endpoint).await?;
        self.endpoint.publish(endpoint.clone());
        Ok(Some(endpoint))
    }

    /// Body of the swap; runs with the gate held read-only.
    async fn swap(&self, active: &Instance, old: &[Instance]) -> Result<Endpoint> {
        self.backup.backup(active).await?;

        let fresh = self.runtime.launch().await?;
        let endpoint = fresh
            .rpc_endpoint()
            .ok_or_else(|| LoopError::MissingRpcPort(fresh.id.clone()))?;
        tracing::info!(instance = fresh.short_id(), %endpoint, "waiting for new portal loop");

        wait_ready(self.status.as_ref(), &endpoint, &self.probe).await?;

        self.gate.repoint(&endpoint).await?;
        self.endpoint.publish(endpoint.clone());

        self.remove_old(old).await?;
        Ok(endpoint)
    }

    /// Stops at the first failure; the remaining instances stay in place for
    /// the next cycle.
    async fn remove_old(&self, old: &[Instance]) -> Result<()> {
        for instance in old {
            self.runtime
                .remove(&instance.id, RemoveOptions::superseded())
                .await?;
            for volume in instance.volume_names() {
                self.runtime.remove_volume(volume).await?;
            }
            tracing::info!(instance = instance.short_id(), "old portal loop removed");
        }
        Ok(())
    }
}
