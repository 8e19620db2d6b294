//! In-memory collaborators for orchestrator tests. Every call is appended to
//! one shared event log so tests can assert cross-collaborator ordering.

use crate::backup::BackupAgent;
use crate::error::{LoopError, Result};
use crate::gate::{GateMode, TrafficGate};
use crate::instance::{Endpoint, Instance};
use crate::orchestrator::Collaborators;
use crate::probe::StatusSource;
use crate::runtime::{RemoveOptions, RuntimeGateway};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Image id the old instances in tests were started from.
pub const OLD_IMAGE: &str = "sha256:0ld";
/// Image id a pull returns once a new image is published.
pub const NEW_IMAGE: &str = "sha256:4ew";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Pull,
    List,
    Launch(String),
    Backup(String),
    SetMode(GateMode),
    Repoint(String),
    Poll,
    Remove(String),
    RemoveVolume(String),
}

/// Collaborator call that should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Pull,
    Backup,
    Launch,
    Probe,
    Repoint,
    Remove,
}

#[derive(Clone, Default)]
struct Shared {
    log: Arc<Mutex<Vec<Event>>>,
    fail: Arc<Mutex<Option<Step>>>,
}

impl Shared {
    fn record(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }

    fn check(&self, step: Step) -> Result<()> {
        if *self.fail.lock().unwrap() == Some(step) {
            return Err(LoopError::from(std::io::Error::other(format!(
                "injected {step:?} failure"
            ))));
        }
        Ok(())
    }
}

pub struct FakeRuntime {
    shared: Shared,
    new_image: Mutex<bool>,
    instances: Mutex<Vec<Instance>>,
    launches: Mutex<VecDeque<Instance>>,
}

impl FakeRuntime {
    pub fn set_new_image(&self, new: bool) {
        *self.new_image.lock().unwrap() = new;
    }

    pub fn set_instances(&self, instances: Vec<Instance>) {
        *self.instances.lock().unwrap() = instances;
    }

    pub fn queue_launch(&self, instance: Instance) {
        self.launches.lock().unwrap().push_back(instance);
    }
}

#[async_trait]
impl RuntimeGateway for FakeRuntime {
    async fn pull(&self) -> Result<Option<String>> {
        self.shared.record(Event::Pull);
        self.shared.check(Step::Pull)?;
        let image = if *self.new_image.lock().unwrap() {
            NEW_IMAGE
        } else {
            OLD_IMAGE
        };
        Ok(Some(image.to_string()))
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        self.shared.record(Event::List);
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn launch(&self) -> Result<Instance> {
        self.shared.check(Step::Launch)?;
        let instance = self
            .launches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LoopError::InstanceNotFound("no launch queued".into()))?;
        self.shared.record(Event::Launch(instance.id.clone()));
        Ok(instance)
    }

    async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<()> {
        assert_eq!(opts, RemoveOptions::superseded());
        self.shared.record(Event::Remove(id.to_string()));
        self.shared.check(Step::Remove)
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.shared.record(Event::RemoveVolume(name.to_string()));
        Ok(())
    }
}

pub struct FakeGate {
    shared: Shared,
    mode: Mutex<GateMode>,
    upstream: Mutex<Option<Endpoint>>,
}

impl FakeGate {
    pub fn mode(&self) -> GateMode {
        *self.mode.lock().unwrap()
    }

    /// Upstream already configured before the orchestrator starts.
    pub fn set_upstream(&self, endpoint: Endpoint) {
        *self.upstream.lock().unwrap() = Some(endpoint);
    }
}

#[async_trait]
impl TrafficGate for FakeGate {
    async fn set_mode(&self, mode: GateMode) -> Result<()> {
        self.shared.record(Event::SetMode(mode));
        *self.mode.lock().unwrap() = mode;
        Ok(())
    }

    async fn repoint(&self, endpoint: &Endpoint) -> Result<()> {
        self.shared.check(Step::Repoint)?;
        self.shared.record(Event::Repoint(endpoint.to_string()));
        *self.upstream.lock().unwrap() = Some(endpoint.clone());
        Ok(())
    }

    async fn upstream(&self) -> Result<Option<Endpoint>> {
        Ok(self.upstream.lock().unwrap().clone())
    }
}

pub struct FakeBackup {
    shared: Shared,
}

#[async_trait]
impl BackupAgent for FakeBackup {
    async fn backup(&self, source: &Instance) -> Result<()> {
        self.shared.record(Event::Backup(source.id.clone()));
        self.shared.check(Step::Backup)
    }
}

/// Replays scripted heights, then repeats `last`.
pub struct FakeStatus {
    shared: Shared,
    script: Mutex<(VecDeque<Result<u64>>, u64)>,
    polls: Mutex<usize>,
}

impl FakeStatus {
    pub fn script(&self, heights: Vec<Result<u64>>, last: u64) {
        *self.script.lock().unwrap() = (heights.into(), last);
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl StatusSource for FakeStatus {
    async fn latest_height(&self, _endpoint: &Endpoint) -> Result<u64> {
        self.shared.record(Event::Poll);
        *self.polls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        let last = script.1;
        script.0.pop_front().unwrap_or(Ok(last))
    }
}

pub struct Fakes {
    shared: Shared,
    pub runtime: Arc<FakeRuntime>,
    pub gate: Arc<FakeGate>,
    pub backup: Arc<FakeBackup>,
    pub status: Arc<FakeStatus>,
}

impl Fakes {
    pub fn new() -> Self {
        let shared = Shared::default();
        Self {
            runtime: Arc::new(FakeRuntime {
                shared: shared.clone(),
                new_image: Mutex::new(false),
                instances: Mutex::new(Vec::new()),
                launches: Mutex::new(VecDeque::new()),
            }),
            gate: Arc::new(FakeGate {
                shared: shared.clone(),
                mode: Mutex::new(GateMode::Normal),
                upstream: Mutex::new(None),
            }),
            backup: Arc::new(FakeBackup {
                shared: shared.clone(),
            }),
            status: Arc::new(FakeStatus {
                shared: shared.clone(),
                script: Mutex::new((VecDeque::new(), 0)),
                polls: Mutex::new(0),
            }),
            shared,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            runtime: self.runtime.clone(),
            gate: self.gate.clone(),
            backup: self.backup.clone(),
            status: self.status.clone(),
        }
    }

    pub fn fail_at(&self, step: Step) {
        *self.shared.fail.lock().unwrap() = Some(step);
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn repoints(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Repoint(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn removals(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Remove(_) | Event::RemoveVolume(_)))
            .collect()
    }
}
