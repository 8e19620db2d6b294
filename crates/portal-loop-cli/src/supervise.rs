use anyhow::Context;
use portal_loop_core::backup::RpcBackupAgent;
use portal_loop_core::config::Config;
use portal_loop_core::docker::DockerGateway;
use portal_loop_core::metrics::OrchestratorMetrics;
use portal_loop_core::probe::{HttpStatusSource, StatusSource};
use portal_loop_core::traefik::TraefikGate;
use portal_loop_core::{Collaborators, Endpoint, EndpointCell, Orchestrator};
use portal_loop_server::{record_chain_height, serve_monitoring, AppState, ChainMetrics};
use prometheus::Registry;
use std::sync::Arc;

pub fn run(config: Config, once: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(supervise(config, once))
}

async fn supervise(config: Config, once: bool) -> anyhow::Result<()> {
    let registry = Registry::new();
    let endpoint = EndpointCell::new();

    let runtime = DockerGateway::connect(&config)
        .await
        .context("connecting to the container runtime")?;
    let status: Arc<dyn StatusSource> =
        Arc::new(HttpStatusSource::new().context("building status client")?);
    let backup = RpcBackupAgent::new(Endpoint::new(config.rpc_url.as_str()), &config.backup_dir)
        .context("building backup agent")?;
    let gate = TraefikGate::new(&config.gate);

    let collaborators = Collaborators {
        runtime: Arc::new(runtime),
        gate: Arc::new(gate),
        backup: Arc::new(backup),
        status: status.clone(),
    };
    let mut orchestrator = Orchestrator::new(collaborators, endpoint.clone(), &config)
        .with_metrics(OrchestratorMetrics::new(&registry));

    if once {
        let outcome = orchestrator.run_cycle().await?;
        tracing::info!(?outcome, "single cycle complete");
        return Ok(());
    }

    let addr = config.metrics_bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding metrics listener on {addr}"))?;

    let chain = ChainMetrics::new(&registry);
    let state = AppState::new(registry, endpoint.clone());
    tokio::spawn(async move {
        if let Err(e) = serve_monitoring(listener, state).await {
            tracing::error!(error = %e, "monitoring server stopped");
        }
    });
    tokio::spawn(record_chain_height(
        status,
        endpoint,
        chain,
        config.cycle_interval,
    ));

    tracing::info!(
        image = %config.container.image,
        gate = %config.gate.file.display(),
        "portal loop supervisor started"
    );
    orchestrator.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "unable to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
