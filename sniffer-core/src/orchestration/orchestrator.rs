use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use sniffer_model::{BatchRun, ProbeOutcome, RunId};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::admission::{AdmissionController, DEFAULT_CONCURRENCY};
use super::fold::{ProbeKind, ResultFolder};
use super::monitor::{CompletionMonitor, DEFAULT_MONITOR_INTERVAL};
use super::range::AddressRange;
use super::registry::{DEFAULT_HISTORY_CAP, RunRegistry};
use super::supervisor::TaskSupervisor;
use crate::error::{Result, SnifferError};
use crate::library::ChannelLibrary;
use crate::persistence::Persistence;
use crate::probe::{ArtifactStore, ProbeRequest, StreamProber};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Concurrency for runs submitted without one.
    pub default_concurrency: usize,
    /// Period of the completion monitor's re-tally.
    pub monitor_interval: Duration,
    /// Number of runs the registry retains.
    pub history_cap: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// Request body for a new batch run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRunRequest {
    #[serde(default, alias = "base_url")]
    pub url_template: String,
    #[serde(default, alias = "start_ip")]
    pub start_address: String,
    #[serde(default, alias = "end_ip")]
    pub end_address: String,
    #[serde(default, alias = "threads")]
    pub concurrency: Option<usize>,
}

/// Shared services a [`BatchOrchestrator`] is built from.
pub struct OrchestratorParts {
    pub registry: Arc<RunRegistry>,
    pub library: Arc<ChannelLibrary>,
    pub prober: Arc<dyn StreamProber>,
    pub artifacts: ArtifactStore,
    pub supervisor: TaskSupervisor,
    pub persistence: Arc<Persistence>,
    pub settings: OrchestratorSettings,
}

/// Turns address-range requests into supervised sets of probes.
#[derive(Clone)]
pub struct BatchOrchestrator {
    registry: Arc<RunRegistry>,
    library: Arc<ChannelLibrary>,
    folder: ResultFolder,
    prober: Arc<dyn StreamProber>,
    artifacts: ArtifactStore,
    supervisor: TaskSupervisor,
    persistence: Arc<Persistence>,
    settings: Arc<RwLock<OrchestratorSettings>>,
}

impl fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("runs", &self.registry.len())
            .field("supervisor", &self.supervisor)
            .field("settings", &*self.settings.read())
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    /// Wires an orchestrator over shared services; nothing is spawned yet.
    pub fn new(parts: OrchestratorParts) -> Self {
        let OrchestratorParts {
            registry,
            library,
            prober,
            artifacts,
            supervisor,
            persistence,
            settings,
        } = parts;
        Self {
            folder: ResultFolder::new(registry.clone(), library.clone()),
            registry,
            library,
            prober,
            artifacts,
            supervisor,
            persistence,
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Run history shared with the result folder and completion monitor.
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> OrchestratorSettings {
        *self.settings.read()
    }

    /// Changes the concurrency used by later submissions; running batches
    /// keep the value they started with.
    pub fn set_default_concurrency(&self, concurrency: usize) {
        self.settings.write().default_concurrency = concurrency.max(1);
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Validates and starts a batch run. Returns before any probe finishes.
    pub async fn submit(&self, request: SubmitRunRequest) -> Result<RunId> {
        let template = request.url_template.trim();
        if template.is_empty() {
            return Err(SnifferError::invalid("url template is required"));
        }
        let range = AddressRange::parse(&request.start_address, &request.end_address)?;
        if !template.contains("{ip}") {
            warn!(template, "url template has no {{ip}} placeholder; every probe will hit the same url");
        }

        let concurrency = request
            .concurrency
            .unwrap_or_else(|| self.settings.read().default_concurrency)
            .max(1);
        let run = BatchRun::new(
            template,
            request.start_address.trim(),
            request.end_address.trim(),
            range.len(),
            concurrency,
        );
        let run_id = run.id;

        for evicted in self.registry.insert(run) {
            self.supervisor.cancel_run(evicted);
        }
        self.persistence.flush_runs(|| self.registry.snapshot()).await;

        info!(
            run_id = %run_id,
            start = %request.start_address.trim(),
            end = %request.end_address.trim(),
            total = range.len(),
            concurrency,
            "batch run submitted"
        );

        let token = self.supervisor.run_token(run_id);
        let addresses: Vec<String> = range.addresses().collect();
        let dispatcher = self.clone();
        let dispatch_token = token.clone();
        self.supervisor.spawn(async move {
            dispatcher
                .dispatch(run_id, addresses, concurrency, dispatch_token)
                .await;
        });

        let monitor = self.monitor();
        self.supervisor.spawn(async move {
            monitor.watch(run_id, token).await;
        });

        Ok(run_id)
    }

    fn monitor(&self) -> CompletionMonitor {
        CompletionMonitor {
            registry: self.registry.clone(),
            library: self.library.clone(),
            persistence: self.persistence.clone(),
            supervisor: self.supervisor.clone(),
            interval: self.settings.read().monitor_interval,
        }
    }

    /// Admits probes one at a time in address order.
    async fn dispatch(
        &self,
        run_id: RunId,
        addresses: Vec<String>,
        concurrency: usize,
        token: CancellationToken,
    ) {
        let gate = AdmissionController::new(concurrency);
        for address in addresses {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(run_id = %run_id, "dispatch stopped, run cancelled");
                    return;
                }
                permit = gate.acquire() => permit,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(err) => {
                    error!(run_id = %run_id, error = %err, "admission failed");
                    return;
                }
            };

            let worker = self.clone();
            self.supervisor.spawn(async move {
                let _permit = permit;
                worker.probe_address(run_id, address, ProbeKind::Initial).await;
            });
        }
    }

    async fn probe_address(
        &self,
        run_id: RunId,
        address: String,
        kind: ProbeKind,
    ) -> Option<ProbeOutcome> {
        let url = self.registry.get(run_id)?.url_for(&address);
        if !self.folder.mark_testing(run_id, &address, &url) {
            return None;
        }

        let request = ProbeRequest::new(
            address.clone(),
            url,
            self.artifacts.batch_artifact(run_id, &address),
        );
        let outcome = self.prober.probe(&request).await;
        self.folder.fold(run_id, outcome.clone(), kind);

        self.persistence.flush_runs(|| self.registry.snapshot()).await;
        self.persistence
            .flush_channels(|| self.library.snapshot_channels())
            .await;
        Some(outcome)
    }

    /// Snapshot of one retained run.
    pub fn status(&self, run_id: RunId) -> Result<BatchRun> {
        self.registry
            .get(run_id)
            .ok_or_else(|| SnifferError::not_found(format!("run {run_id}")))
    }

    /// Retained runs, newest first.
    pub fn list(&self) -> Vec<BatchRun> {
        self.registry.list()
    }

    /// Re-probes one address of an existing run without touching its
    /// completion count.
    pub fn retry(&self, run_id: RunId, address: &str) -> Result<()> {
        if !self.registry.contains(run_id) {
            return Err(SnifferError::not_found(format!("run {run_id}")));
        }
        let address = address.trim();
        if address.is_empty() {
            return Err(SnifferError::invalid("address is required"));
        }

        info!(run_id = %run_id, address, "retrying probe");
        let worker = self.clone();
        let address = address.to_string();
        self.supervisor.spawn(async move {
            worker.probe_address(run_id, address, ProbeKind::Retry).await;
        });
        Ok(())
    }

    /// Removes a run and its artifacts. Returns how many files were deleted.
    ///
    /// Probes already running finish normally; their outcomes only reach
    /// the channel library.
    pub async fn delete(&self, run_id: RunId) -> Result<usize> {
        self.supervisor.cancel_run(run_id);
        let run = self
            .registry
            .remove(run_id)
            .ok_or_else(|| SnifferError::not_found(format!("run {run_id}")))?;

        let mut removed = 0;
        for (address, outcome) in &run.results {
            removed += self
                .artifacts
                .purge_for_run(run_id, address, outcome.screenshot.as_deref())
                .await;
        }

        self.persistence.flush_runs(|| self.registry.snapshot()).await;
        info!(run_id = %run_id, artifacts = removed, "batch run deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::tests::FakeProber;
    use crate::persistence::{DocumentStore, EntityKind, MemoryStore};
    use sniffer_model::{Connectivity, ProbeStatus, RunStatus};

    struct Harness {
        _dir: tempfile::TempDir,
        orchestrator: BatchOrchestrator,
        library: Arc<ChannelLibrary>,
        store: Arc<MemoryStore>,
        artifacts: ArtifactStore,
    }

    fn harness(prober: FakeProber) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactStore::new(dir.path());
        let library = Arc::new(ChannelLibrary::new());
        let store = Arc::new(MemoryStore::new());
        let orchestrator = BatchOrchestrator::new(OrchestratorParts {
            registry: Arc::new(RunRegistry::default()),
            library: library.clone(),
            prober: Arc::new(prober),
            artifacts: artifacts.clone(),
            supervisor: TaskSupervisor::new(),
            persistence: Arc::new(Persistence::new(store.clone())),
            settings: OrchestratorSettings {
                monitor_interval: Duration::from_millis(10),
                ..Default::default()
            },
        });
        Harness {
            _dir: dir,
            orchestrator,
            library,
            store,
            artifacts,
        }
    }

    fn request(start: &str, end: &str, concurrency: usize) -> SubmitRunRequest {
        SubmitRunRequest {
            url_template: "rtp://{ip}:5000".into(),
            start_address: start.into(),
            end_address: end.into(),
            concurrency: Some(concurrency),
        }
    }

    async fn wait_completed(orchestrator: &BatchOrchestrator, run_id: RunId) -> BatchRun {
        for _ in 0..1000 {
            let run = orchestrator.status(run_id).expect("run");
            if run.status == RunStatus::Completed {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} did not complete");
    }

    #[tokio::test]
    async fn three_address_run_completes() {
        let h = harness(FakeProber::default().failing("10.0.0.2"));
        let run_id = h
            .orchestrator
            .submit(request("10.0.0.1", "10.0.0.3", 2))
            .await
            .expect("submit");

        let run = wait_completed(&h.orchestrator, run_id).await;
        assert_eq!(run.total, 3);
        assert_eq!(run.completed, 3);
        assert_eq!(run.results.len(), 3);
        assert!(run.results.values().all(|o| o.status.is_terminal()));
        let summary = run.summary.expect("summary");
        assert_eq!((summary.success, summary.failed), (2, 1));

        assert_eq!(
            h.library.get("10.0.0.2").expect("record").connectivity,
            Connectivity::Failed
        );
        let persisted = h.store.get_all(EntityKind::Runs).await.expect("runs");
        assert!(persisted.contains_key(&run_id.to_string()));
    }

    #[tokio::test]
    async fn never_exceeds_requested_concurrency() {
        let prober = FakeProber::default().with_delay(Duration::from_millis(20));
        let peak = prober.peak.clone();
        let h = harness(prober);
        let run_id = h
            .orchestrator
            .submit(request("10.0.0.1", "10.0.0.8", 2))
            .await
            .expect("submit");
        wait_completed(&h.orchestrator, run_id).await;
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn rejects_bad_submissions() {
        let h = harness(FakeProber::default());
        let mut bad = request("10.0.0.1", "10.0.0.3", 1);
        bad.url_template = "  ".into();
        assert!(matches!(
            h.orchestrator.submit(bad).await,
            Err(SnifferError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.orchestrator.submit(request("10.0.0.9", "10.0.0.3", 1)).await,
            Err(SnifferError::InvalidRequest(_))
        ));
        assert!(h.orchestrator.list().is_empty());
    }

    #[tokio::test]
    async fn retry_does_not_advance_completed() {
        let prober = FakeProber::default().failing("10.0.0.1");
        let failures = prober.failing.clone();
        let h = harness(prober);
        let run_id = h
            .orchestrator
            .submit(request("10.0.0.1", "10.0.0.1", 1))
            .await
            .expect("submit");
        wait_completed(&h.orchestrator, run_id).await;

        failures.lock().clear();
        h.orchestrator.retry(run_id, "10.0.0.1").expect("retry");
        for _ in 0..200 {
            let run = h.orchestrator.status(run_id).expect("run");
            if run.results["10.0.0.1"].status == ProbeStatus::Success {
                assert_eq!(run.completed, 1);
                assert_eq!(
                    h.library.get("10.0.0.1").expect("record").connectivity,
                    Connectivity::Online
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("retry never folded");
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let h = harness(FakeProber::default());
        let missing = RunId::new();
        assert!(matches!(h.orchestrator.status(missing), Err(SnifferError::NotFound(_))));
        assert!(matches!(
            h.orchestrator.retry(missing, "10.0.0.1"),
            Err(SnifferError::NotFound(_))
        ));
        assert!(matches!(
            h.orchestrator.delete(missing).await,
            Err(SnifferError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_artifacts_and_tolerates_missing() {
        let h = harness(FakeProber::default());
        let run_id = h
            .orchestrator
            .submit(request("10.0.0.1", "10.0.0.2", 2))
            .await
            .expect("submit");
        wait_completed(&h.orchestrator, run_id).await;

        let present = h.artifacts.batch_artifact(run_id, "10.0.0.1");
        tokio::fs::write(&present.path, b"jpeg").await.expect("write");

        let removed = h.orchestrator.delete(run_id).await.expect("delete");
        assert_eq!(removed, 1);
        assert!(!present.path.exists());
        assert!(h.orchestrator.list().is_empty());
        assert!(h.library.contains("10.0.0.1"));
    }

    async fn persisted_state(store: &MemoryStore, run_id: RunId) -> (bool, usize, usize) {
        let runs = store.get_all(EntityKind::Runs).await.expect("runs");
        let channels = store.get_all(EntityKind::Channels).await.expect("channels");
        let Some(run) = runs.get(&run_id.to_string()) else {
            return (false, 0, channels.len());
        };
        let completed = run["completed"].as_u64().unwrap_or_default() as usize;
        (run["status"] == "completed", completed, channels.len())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn final_flush_is_never_overwritten_by_older_snapshots() {
        let h = harness(FakeProber::default());
        let mut stale = Vec::new();

        for round in 0..6 {
            let run_id = h
                .orchestrator
                .submit(request("10.0.0.0", "10.0.0.255", 64))
                .await
                .expect("submit");
            wait_completed(&h.orchestrator, run_id).await;

            let mut state = persisted_state(&h.store, run_id).await;
            for _ in 0..200 {
                if state == (true, 256, 256) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                state = persisted_state(&h.store, run_id).await;
            }
            // Late writers must not roll the store back once it is current.
            tokio::time::sleep(Duration::from_millis(100)).await;
            let settled = persisted_state(&h.store, run_id).await;
            if settled != (true, 256, 256) {
                stale.push((round, settled));
            }
        }

        assert!(stale.is_empty(), "stale persisted state: {stale:?}");
    }
}
