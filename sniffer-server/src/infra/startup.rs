use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use sniffer_core::{
    DocumentStore, FfmpegProber, SharedProbeOptions, StreamProber,
    persistence::{JsonFileStore, MemoryStore, PostgresStore},
};

use crate::infra::{
    app_state::AppState,
    config::{Config, StorageBackend},
};

/// Opens the document store selected by `storage.backend`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.storage.backend {
        StorageBackend::Json => {
            info!(data_dir = %config.data_dir().display(), "using JSON file storage");
            Ok(Arc::new(JsonFileStore::new(config.data_dir())))
        }
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("postgres storage selected without a database URL"))?;
            let store = PostgresStore::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            info!("using PostgreSQL storage");
            Ok(Arc::new(store))
        }
    }
}

/// Builds the ffmpeg prober and the handle its options are retuned through.
pub fn ffmpeg_prober(config: &Config) -> (Arc<dyn StreamProber>, SharedProbeOptions) {
    let options = config.probe.options();
    info!(
        ffmpeg = %options.ffmpeg_path,
        timeout_secs = options.timeout.as_secs(),
        extra_args = ?options.extra_args,
        "probe configuration in effect"
    );
    let shared = SharedProbeOptions::new(options);
    (Arc::new(FfmpegProber::new(shared.clone())), shared)
}

/// Opens storage, restores state and builds the shared application state.
pub async fn bootstrap(config: Arc<Config>) -> Result<AppState> {
    let store = open_store(&config).await?;
    let (prober, probe_options) = ffmpeg_prober(&config);
    AppState::build(config, store, prober, probe_options).await
}
