use std::fmt;
use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use sniffer_model::RunId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Owns every background task spawned by the orchestrator.
///
/// Each batch run gets a child cancellation token; cancelling it stops the
/// run's dispatcher and completion monitor. Probes already admitted keep
/// running to completion.
#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    root: CancellationToken,
    runs: std::sync::Arc<DashMap<RunId, CancellationToken>>,
}

impl fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("live_tasks", &self.tracker.len())
            .field("runs", &self.runs.len())
            .field("cancelled", &self.root.is_cancelled())
            .finish()
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
            runs: Default::default(),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Token scoped to one run; cancelled by [`cancel_run`](Self::cancel_run)
    /// or shutdown.
    pub fn run_token(&self, run_id: RunId) -> CancellationToken {
        self.runs
            .entry(run_id)
            .or_insert_with(|| self.root.child_token())
            .clone()
    }

    pub fn cancel_run(&self, run_id: RunId) -> bool {
        match self.runs.remove(&run_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the run's token once its background work has finished.
    pub fn release_run(&self, run_id: RunId) {
        self.runs.remove(&run_id);
    }

    pub fn live_tasks(&self) -> usize {
        self.tracker.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancels everything and waits up to `grace` for tasks to drain.
    pub async fn shutdown(&self, grace: Duration) {
        self.root.cancel();
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(remaining = self.tracker.len(), "background tasks still running after shutdown grace");
        } else {
            info!("background tasks drained");
        }
    }
}
