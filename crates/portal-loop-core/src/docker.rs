//! [`RuntimeGateway`] backed by the local Docker daemon.

use crate::config::{Config, ContainerSpec, RPC_PORT};
use crate::error::{LoopError, Result};
use crate::instance::{Instance, Mount, MountKind, PortMapping, Protocol};
use crate::runtime::{RemoveOptions, RuntimeGateway};
use async_trait::async_trait;
use bollard::{
    models::{ContainerCreateBody, ContainerSummary, HostConfig, PortBinding},
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptions, ListContainersOptions,
        RemoveContainerOptionsBuilder, RemoveVolumeOptionsBuilder, StartContainerOptions,
    },
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct DockerGateway {
    docker: Docker,
    spec: ContainerSpec,
    binds: Vec<String>,
}

impl DockerGateway {
    /// Connect with local defaults (`DOCKER_HOST` or the unix socket) and
    /// ping the daemon so an unreachable runtime fails at startup.
    pub async fn connect(config: &Config) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        Ok(Self::with_client(docker, config))
    }

    pub fn with_client(docker: Docker, config: &Config) -> Self {
        let scripts: PathBuf = config.host_pwd.join("scripts");
        let binds = vec![
            format!("{}:/scripts", scripts.display()),
            format!("{}:/backups", config.host_backup_dir().display()),
        ];
        Self {
            docker,
            spec: config.container.clone(),
            binds,
        }
    }

    async fn image_id(&self) -> Result<Option<String>> {
        match self.docker.inspect_image(&self.spec.image).await {
            Ok(img) => Ok(img.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_filtered(&self, key: &str, value: &str) -> Result<Vec<Instance>> {
        let mut filters = HashMap::new();
        filters.insert(key.to_string(), vec![value.to_string()]);
        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        let mut instances: Vec<Instance> = summaries
            .into_iter()
            .filter_map(instance_from_summary)
            .collect();
        instances.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(instances)
    }
}

#[async_trait]
impl RuntimeGateway for DockerGateway {
    async fn pull(&self) -> Result<Option<String>> {
        let (from_image, tag) = split_image_ref(&self.spec.image);
        let options = CreateImageOptions {
            from_image: Some(from_image.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(message) = info.error_detail.and_then(|d| d.message) {
                return Err(LoopError::ImagePull(message));
            }
            if let Some(status) = info.status {
                tracing::debug!(image = %self.spec.image, %status, "pull progress");
            }
        }

        let pulled = self.image_id().await?;
        tracing::info!(image = %self.spec.image, id = ?pulled, "image pulled");
        Ok(pulled)
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        self.list_filtered("label", &self.spec.label).await
    }

    async fn launch(&self) -> Result<Instance> {
        let name = format!(
            "{}-{}",
            self.spec.name_prefix,
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        );

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            format!("{RPC_PORT}/tcp"),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        );
        let host_config = HostConfig {
            binds: Some(self.binds.clone()),
            publish_all_ports: Some(true),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let mut labels = HashMap::new();
        labels.insert(self.spec.label.clone(), "true".to_string());

        let body = ContainerCreateBody {
            image: Some(self.spec.image.clone()),
            entrypoint: Some(self.spec.entrypoint.clone()),
            env: Some(self.spec.env.clone()),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptionsBuilder::default().name(&name).build());
        let id = self.docker.create_container(options, body).await?.id;
        self.docker
            .start_container(&id, None::<StartContainerOptions>)
            .await?;
        tracing::info!(%name, id = %id, "portal loop container started");

        // Published ports are only assigned once the container is running.
        self.list_filtered("id", &id)
            .await?
            .into_iter()
            .next()
            .ok_or(LoopError::InstanceNotFound(id))
    }

    async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::default()
            .force(opts.force)
            .v(opts.remove_volumes)
            .link(opts.remove_links)
            .build();
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let options = RemoveVolumeOptionsBuilder::default().force(true).build();
        match self.docker.remove_volume(name, Some(options)).await {
            Ok(()) => Ok(()),
            // Already removed along with its container.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split `registry:5000/org/name:tag` into `("registry:5000/org/name", "tag")`.
/// A reference without a tag resolves to `latest`.
pub fn split_image_ref(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn instance_from_summary(summary: ContainerSummary) -> Option<Instance> {
    let id = summary.id?;
    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            let protocol = match p.typ.map(|t| t.to_string()).as_deref() {
                Some("tcp") => Protocol::Tcp,
                Some("udp") => Protocol::Udp,
                Some("sctp") => Protocol::Sctp,
                _ => return None,
            };
            Some(PortMapping {
                private_port: p.private_port,
                public_port: p.public_port,
                host_ip: p.ip,
                protocol,
            })
        })
        .collect();
    let mounts = summary
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| Mount {
            kind: match m.typ.map(|t| t.to_string()).as_deref() {
                Some("volume") => MountKind::Volume,
                Some("bind") => MountKind::Bind,
                _ => MountKind::Other,
            },
            name: m.name,
        })
        .collect();
    Some(Instance {
        id,
        name: summary
            .names
            .and_then(|n| n.into_iter().next())
            .map(|n| n.trim_start_matches('/').to_string()),
        image: summary.image,
        image_id: summary.image_id,
        created: summary.created.unwrap_or_default(),
        ports,
        mounts,
    })
}
