mod supervise;

use anyhow::Context;
use clap::Parser;
use portal_loop_core::config::Config;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "portal-loop",
    about = "Zero-downtime blue-green supervisor for the gno portal loop node",
    version
)]
struct Cli {
    /// YAML config file; flags and env vars override its values
    #[arg(long, env = "PORTAL_LOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Host working directory used to resolve bind mounts (default: $PWD)
    #[arg(long, env = "HOST_PWD")]
    host_pwd: Option<PathBuf>,

    /// Directory transaction backups are written to (default: ./backups)
    #[arg(long, env = "BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// RPC endpoint used for backups when the active node publishes no port
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Metrics listen address; `:port` binds all interfaces (default: :9090)
    #[arg(long, env = "PROM_ADDR")]
    prom_addr: Option<String>,

    /// Traefik dynamic configuration file holding the node routers
    #[arg(long, env = "TRAEFIK_GNO_FILE")]
    traefik_gno_file: Option<PathBuf>,

    /// Node image to track
    #[arg(long, env = "PORTAL_LOOP_IMAGE")]
    image: Option<String>,

    /// Seconds to sleep between deployment cycles (default: 10)
    #[arg(long, env = "CYCLE_INTERVAL_SECS")]
    cycle_interval_secs: Option<u64>,

    /// Run a single deployment cycle and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags and env vars.
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(v) = &self.host_pwd {
            config.host_pwd = v.clone();
        }
        if let Some(v) = &self.backup_dir {
            config.backup_dir = v.clone();
        }
        if let Some(v) = &self.rpc_url {
            config.rpc_url = v.clone();
        }
        if let Some(v) = &self.prom_addr {
            config.prom_addr = v.clone();
        }
        if let Some(v) = &self.traefik_gno_file {
            config.gate.file = v.clone();
        }
        if let Some(v) = &self.image {
            config.container.image = v.clone();
        }
        if let Some(secs) = self.cycle_interval_secs {
            config.cycle_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let result = cli
        .resolve_config()
        .and_then(|config| supervise::run(config, cli.once));

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
