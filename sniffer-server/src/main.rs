use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use sniffer_core::{
    FfmpegProber, StreamProber,
    probe::{ArtifactStore, ProbeRequest},
};
use sniffer_server::{
    create_app,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader, StorageBackend},
        startup::bootstrap,
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight probes get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "sniffer-server")]
#[command(about = "Scans address ranges for live IPTV streams and serves the results")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SNIFFER_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Keep all state in memory; nothing is written to disk or the database
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Probe a single stream URL once and print the outcome as JSON
    Probe {
        /// Stream URL to probe
        url: String,
        /// Address recorded with the outcome
        #[arg(long, default_value = "adhoc")]
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    match cli.command {
        Some(Command::Probe { url, address }) => probe_once(&config, &address, &url).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    if args.ephemeral {
        config.storage.backend = StorageBackend::Memory;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        storage.backend = %config.storage.backend,
        batch.default_concurrency = config.batch.default_concurrency,
        batch.history_cap = config.batch.history_cap,
        screenshots = %config.screenshots_dir().display(),
        "configuration in effect"
    );

    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = bootstrap(Arc::new(config)).await?;
    let supervisor = state.supervisor.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("stream sniffer listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down background tasks");
    supervisor.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn probe_once(config: &Config, address: &str, url: &str) -> anyhow::Result<()> {
    let artifacts = ArtifactStore::new(config.screenshots_dir());
    artifacts
        .ensure_root()
        .await
        .context("failed to create screenshots directory")?;

    let prober = FfmpegProber::new(config.probe.options());
    let request = ProbeRequest::new(address, url, artifacts.connectivity_artifact(address));
    let outcome = prober.probe(&request).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
