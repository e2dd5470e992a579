use std::{fmt, sync::Arc};

use anyhow::Context;
use tracing::info;

use sniffer_core::{
    ChannelLibrary, DocumentStore, Persistence, StreamProber,
    orchestration::{
        BatchOrchestrator, OrchestratorParts, RetestWorkflow, RunRegistry,
        TaskSupervisor,
    },
    probe::{ArtifactStore, SharedProbeOptions},
};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub library: Arc<ChannelLibrary>,
    pub orchestrator: BatchOrchestrator,
    pub retests: RetestWorkflow,
    pub persistence: Arc<Persistence>,
    pub artifacts: ArtifactStore,
    pub supervisor: TaskSupervisor,
    /// Probe knobs editable through `/api/v1/config`.
    pub probe_options: SharedProbeOptions,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("channels", &self.library.len())
            .field("runs", &self.orchestrator.registry().len())
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Loads persisted state from `store` and wires the services around it.
    /// `probe_options` must be the handle `prober` reads from.
    pub async fn build(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        prober: Arc<dyn StreamProber>,
        probe_options: SharedProbeOptions,
    ) -> anyhow::Result<Self> {
        let persistence = Arc::new(Persistence::new(store));

        let channels = persistence
            .load_channels()
            .await
            .context("failed to load channels")?;
        let groups = persistence
            .load_groups()
            .await
            .context("failed to load groups")?;
        let runs = persistence
            .load_runs()
            .await
            .context("failed to load batch runs")?;
        info!(
            channels = channels.len(),
            groups = groups.len(),
            runs = runs.len(),
            "restored persisted state"
        );

        let library = Arc::new(ChannelLibrary::from_parts(channels, groups));
        let settings = config.batch.settings();
        let registry = Arc::new(RunRegistry::new(settings.history_cap));
        registry.restore(runs);

        let artifacts = ArtifactStore::new(config.screenshots_dir());
        artifacts.ensure_root().await.with_context(|| {
            format!(
                "failed to create screenshots directory {}",
                config.screenshots_dir().display()
            )
        })?;
        tokio::fs::create_dir_all(config.logos_dir())
            .await
            .with_context(|| {
                format!(
                    "failed to create logos directory {}",
                    config.logos_dir().display()
                )
            })?;

        let supervisor = TaskSupervisor::new();
        let orchestrator = BatchOrchestrator::new(OrchestratorParts {
            registry,
            library: library.clone(),
            prober: prober.clone(),
            artifacts: artifacts.clone(),
            supervisor: supervisor.clone(),
            persistence: persistence.clone(),
            settings,
        });
        let retests = RetestWorkflow::new(
            library.clone(),
            prober,
            artifacts.clone(),
            supervisor.clone(),
            persistence.clone(),
        );

        Ok(Self {
            config,
            library,
            orchestrator,
            retests,
            persistence,
            artifacts,
            supervisor,
            probe_options,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persists the current channel snapshot.
    pub async fn flush_channels(&self) -> bool {
        self.persistence
            .flush_channels(|| self.library.snapshot_channels())
            .await
    }

    pub async fn flush_groups(&self) -> bool {
        self.persistence
            .flush_groups(|| self.library.snapshot_groups())
            .await
    }
}
