//! Connectivity retests of channels already in the library.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use sniffer_model::{Connectivity, ProbeStatus, RetestEntry, RetestTask, RunStatus, TaskId};
use tracing::{debug, info};

use super::supervisor::TaskSupervisor;
use crate::error::{Result, SnifferError};
use crate::library::ChannelLibrary;
use crate::persistence::Persistence;
use crate::probe::{ArtifactStore, ProbeRequest, StreamProber};

pub const RETEST_HISTORY_CAP: usize = 20;

/// Runs connectivity retests and keeps the most recent tasks in memory.
#[derive(Clone)]
pub struct RetestWorkflow {
    tasks: Arc<RwLock<BTreeMap<TaskId, RetestTask>>>,
    library: Arc<ChannelLibrary>,
    prober: Arc<dyn StreamProber>,
    artifacts: ArtifactStore,
    supervisor: TaskSupervisor,
    persistence: Arc<Persistence>,
    /// One gate per address; retests of the same channel run one at a time
    /// because they share its connectivity artifact.
    address_gates: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for RetestWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetestWorkflow")
            .field("tasks", &self.tasks.read().len())
            .finish_non_exhaustive()
    }
}

impl RetestWorkflow {
    pub fn new(
        library: Arc<ChannelLibrary>,
        prober: Arc<dyn StreamProber>,
        artifacts: ArtifactStore,
        supervisor: TaskSupervisor,
        persistence: Arc<Persistence>,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(BTreeMap::new())),
            library,
            prober,
            artifacts,
            supervisor,
            persistence,
            address_gates: Arc::new(DashMap::new()),
        }
    }

    /// Starts a background retest of every address and returns its task id.
    pub fn start(&self, addresses: &[String]) -> Result<TaskId> {
        let mut addresses: Vec<String> = addresses
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        addresses.sort();
        addresses.dedup();
        if addresses.is_empty() {
            return Err(SnifferError::invalid("no addresses provided"));
        }

        let task = RetestTask::new(&addresses);
        let task_id = task.id;
        let targets: Vec<String> = task.results.keys().cloned().collect();
        {
            let mut tasks = self.tasks.write();
            while tasks.len() >= RETEST_HISTORY_CAP {
                tasks.pop_first();
            }
            tasks.insert(task_id, task);
        }
        info!(task_id = %task_id, total = targets.len(), "connectivity retest started");

        for address in targets {
            let workflow = self.clone();
            self.supervisor.spawn(async move {
                let entry = workflow.retest_address(&address).await;
                workflow.record(task_id, entry).await;
            });
        }
        Ok(task_id)
    }

    async fn record(&self, task_id: TaskId, entry: RetestEntry) {
        let finished = {
            let mut tasks = self.tasks.write();
            match tasks.get_mut(&task_id) {
                Some(task) => {
                    let was_running = task.status == RunStatus::Running;
                    task.record(entry);
                    was_running && task.status == RunStatus::Completed
                }
                None => false,
            }
        };
        if finished {
            info!(task_id = %task_id, "connectivity retest completed");
            self.persistence
                .flush_channels(|| self.library.snapshot_channels())
                .await;
        }
    }

    pub fn status(&self, task_id: TaskId) -> Result<RetestTask> {
        self.tasks
            .read()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| SnifferError::not_found(format!("retest task {task_id}")))
    }

    /// Retests one channel and waits for the result.
    pub async fn probe_now(&self, address: &str) -> Result<RetestEntry> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SnifferError::invalid("address is required"));
        }
        if !self.library.contains(address) {
            return Err(SnifferError::not_found(format!("channel {address}")));
        }
        let entry = self.retest_address(address).await;
        self.persistence
            .flush_channels(|| self.library.snapshot_channels())
            .await;
        Ok(entry)
    }

    fn address_gate(&self, address: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.address_gates
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    async fn retest_address(&self, address: &str) -> RetestEntry {
        let gate = self.address_gate(address);
        let _held = gate.lock().await;

        let Some(record) = self.library.get(address) else {
            return RetestEntry::offline(address, "channel not found");
        };
        if !record.has_url() {
            self.library.update(address, |record| {
                let now = Utc::now();
                record.connectivity = Connectivity::Offline;
                record.connectivity_checked_at = Some(now);
                record.timestamp = Some(now);
            });
            return RetestEntry::offline(address, "no URL");
        }

        let request = ProbeRequest::new(
            address,
            record.url.clone(),
            self.artifacts.connectivity_artifact(address),
        );
        let outcome = self.prober.probe(&request).await;
        let now = Utc::now();

        let connectivity = self
            .library
            .update(address, |record| {
                if outcome.status == ProbeStatus::Success {
                    record.connectivity = Connectivity::Online;
                    if outcome.resolution.is_some() {
                        record.resolution = outcome.resolution;
                    }
                    if outcome.screenshot.is_some() {
                        record.screenshot = outcome.screenshot.clone();
                    }
                } else if record.connectivity == Connectivity::Online {
                    record.connectivity = Connectivity::Offline;
                }
                record.timestamp = Some(now);
                record.connectivity_checked_at = Some(now);
                record.connectivity
            })
            .unwrap_or(Connectivity::Offline);

        debug!(address, connectivity = %connectivity, status = outcome.status.as_str(), "retest folded");
        RetestEntry {
            address: address.to_string(),
            status: outcome.status,
            connectivity,
            resolution: outcome.resolution,
            screenshot: outcome.screenshot,
            message: outcome.error.or(outcome.note),
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::tests::FakeProber;
    use crate::persistence::MemoryStore;
    use sniffer_model::ChannelRecord;
    use std::time::Duration;

    fn workflow(prober: FakeProber, records: Vec<ChannelRecord>) -> (tempfile::TempDir, RetestWorkflow) {
        let dir = tempfile::tempdir().expect("tempdir");
        let workflow = RetestWorkflow::new(
            Arc::new(ChannelLibrary::from_parts(records, Vec::new())),
            Arc::new(prober),
            ArtifactStore::new(dir.path()),
            TaskSupervisor::new(),
            Arc::new(Persistence::new(Arc::new(MemoryStore::new()))),
        );
        (dir, workflow)
    }

    fn channel(address: &str, connectivity: Connectivity) -> ChannelRecord {
        let mut record = ChannelRecord::new(address);
        record.url = format!("rtp://{address}:5000");
        record.connectivity = connectivity;
        record.metadata.name = format!("Channel {address}");
        record
    }

    #[tokio::test]
    async fn failure_downgrades_online_only() {
        let prober = FakeProber::default()
            .failing("10.0.0.1")
            .failing("10.0.0.2");
        let (_dir, workflow) = workflow(
            prober,
            vec![
                channel("10.0.0.1", Connectivity::Online),
                channel("10.0.0.2", Connectivity::Failed),
            ],
        );

        let first = workflow.probe_now("10.0.0.1").await.expect("retest");
        assert_eq!(first.connectivity, Connectivity::Offline);
        let second = workflow.probe_now("10.0.0.2").await.expect("retest");
        assert_eq!(second.connectivity, Connectivity::Failed);

        let record = workflow.library.get("10.0.0.2").expect("record");
        assert!(record.connectivity_checked_at.is_some());
        assert_eq!(record.metadata.name, "Channel 10.0.0.2");
    }

    #[tokio::test]
    async fn success_marks_online() {
        let (_dir, workflow) = workflow(
            FakeProber::default(),
            vec![channel("10.0.0.3", Connectivity::Offline)],
        );
        let entry = workflow.probe_now("10.0.0.3").await.expect("retest");
        assert_eq!(entry.status, ProbeStatus::Success);
        assert_eq!(
            workflow.library.get("10.0.0.3").expect("record").connectivity,
            Connectivity::Online
        );
    }

    #[tokio::test]
    async fn probe_now_rejects_unknown_channel() {
        let (_dir, workflow) = workflow(FakeProber::default(), Vec::new());
        assert!(matches!(
            workflow.probe_now("10.9.9.9").await,
            Err(SnifferError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn background_task_settles_every_address() {
        let mut no_url = channel("10.0.0.5", Connectivity::Online);
        no_url.url.clear();
        let (_dir, workflow) = workflow(
            FakeProber::default(),
            vec![channel("10.0.0.4", Connectivity::Untested), no_url],
        );

        assert!(matches!(workflow.start(&[]), Err(SnifferError::InvalidRequest(_))));

        let addresses = vec!["10.0.0.4".into(), "10.0.0.5".into(), "10.0.0.6".into()];
        let task_id = workflow.start(&addresses).expect("start");

        let mut task = workflow.status(task_id).expect("task");
        for _ in 0..200 {
            if task.status == RunStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            task = workflow.status(task_id).expect("task");
        }
        assert_eq!(task.status, RunStatus::Completed);
        assert_eq!(task.completed, 3);
        assert_eq!(task.results["10.0.0.4"].connectivity, Connectivity::Online);
        assert_eq!(task.results["10.0.0.5"].message.as_deref(), Some("no URL"));
        assert_eq!(
            task.results["10.0.0.6"].message.as_deref(),
            Some("channel not found")
        );
        assert_eq!(
            workflow.library.get("10.0.0.5").expect("record").connectivity,
            Connectivity::Offline
        );
    }

    #[tokio::test]
    async fn keeps_at_most_twenty_tasks() {
        let (_dir, workflow) = workflow(FakeProber::default(), Vec::new());
        let first = workflow.start(&["10.0.0.1".to_string()]).expect("start");
        for _ in 0..RETEST_HISTORY_CAP {
            workflow.start(&["10.0.0.1".to_string()]).expect("start");
        }
        assert!(matches!(workflow.status(first), Err(SnifferError::NotFound(_))));
        assert_eq!(workflow.tasks.read().len(), RETEST_HISTORY_CAP);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_retests_of_one_address_run_one_at_a_time() {
        let prober = FakeProber::default().with_delay(Duration::from_millis(30));
        let peak = prober.peak.clone();
        let (_dir, workflow) = workflow(
            prober,
            vec![channel("10.0.0.1", Connectivity::Untested)],
        );

        let duplicated = vec!["10.0.0.1".to_string(), " 10.0.0.1 ".to_string()];
        let first = workflow.start(&duplicated).expect("start");
        let second = workflow.start(&duplicated).expect("start");
        assert_eq!(workflow.status(first).expect("task").total, 1);

        let entry = workflow.probe_now("10.0.0.1").await.expect("retest");
        assert_eq!(entry.connectivity, Connectivity::Online);

        for task_id in [first, second] {
            let mut task = workflow.status(task_id).expect("task");
            for _ in 0..200 {
                if task.status == RunStatus::Completed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                task = workflow.status(task_id).expect("task");
            }
            assert_eq!(task.status, RunStatus::Completed);
            assert_eq!(task.completed, 1);
            assert_eq!(task.results["10.0.0.1"].connectivity, Connectivity::Online);
        }
        assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
