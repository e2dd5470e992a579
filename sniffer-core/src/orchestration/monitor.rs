use std::sync::Arc;
use std::time::Duration;

use sniffer_model::{RunId, RunStatus, RunSummary};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::RunRegistry;
use super::supervisor::TaskSupervisor;
use crate::library::ChannelLibrary;
use crate::persistence::Persistence;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(1000);

/// How a monitor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Completed,
    RunRemoved,
    Cancelled,
}

enum Check {
    Pending,
    Closed(RunSummary, usize),
    AlreadyClosed,
}

/// Watches one run until every initial probe has been folded, then closes it.
#[derive(Debug, Clone)]
pub struct CompletionMonitor {
    pub(crate) registry: Arc<RunRegistry>,
    pub(crate) library: Arc<ChannelLibrary>,
    pub(crate) persistence: Arc<Persistence>,
    pub(crate) supervisor: TaskSupervisor,
    pub(crate) interval: Duration,
}

impl CompletionMonitor {
    pub async fn watch(&self, run_id: RunId, token: CancellationToken) -> MonitorExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(run_id = %run_id, "completion monitor cancelled");
                    return MonitorExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }

            let closed = self.registry.update(run_id, |run| {
                if run.status == RunStatus::Completed {
                    Check::AlreadyClosed
                } else if run.is_settled() {
                    Check::Closed(run.finish(), run.total)
                } else {
                    Check::Pending
                }
            });

            match closed {
                None => {
                    debug!(run_id = %run_id, "run removed, stopping monitor");
                    return MonitorExit::RunRemoved;
                }
                Some(Check::Pending) => continue,
                Some(Check::AlreadyClosed) => {
                    self.supervisor.release_run(run_id);
                    return MonitorExit::Completed;
                }
                Some(Check::Closed(summary, total)) => {
                    info!(
                        run_id = %run_id,
                        total,
                        success = summary.success,
                        failed = summary.failed,
                        success_ratio = summary.success_ratio,
                        "batch run completed"
                    );
                    self.persistence
                        .flush_runs(|| self.registry.snapshot())
                        .await;
                    self.persistence
                        .flush_channels(|| self.library.snapshot_channels())
                        .await;
                    self.supervisor.release_run(run_id);
                    return MonitorExit::Completed;
                }
            }
        }
    }
}
