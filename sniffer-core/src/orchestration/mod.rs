//! Batch probe orchestration: admission, run state, folding, completion and
//! connectivity retests.

pub mod admission;
pub mod fold;
pub mod monitor;
pub mod orchestrator;
pub mod range;
pub mod registry;
pub mod retest;
pub mod supervisor;

pub use admission::{AdmissionController, AdmissionPermit, DEFAULT_CONCURRENCY};
pub use fold::{FoldReport, ProbeKind, ResultFolder};
pub use monitor::{CompletionMonitor, DEFAULT_MONITOR_INTERVAL, MonitorExit};
pub use orchestrator::{
    BatchOrchestrator, OrchestratorParts, OrchestratorSettings, SubmitRunRequest,
};
pub use range::AddressRange;
pub use registry::{DEFAULT_HISTORY_CAP, RunRegistry};
pub use retest::{RETEST_HISTORY_CAP, RetestWorkflow};
pub use supervisor::TaskSupervisor;

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sniffer_model::{ProbeOutcome, Resolution};

    use crate::probe::{ProbeRequest, StreamProber};

    /// Succeeds with 1920x1080 unless the address was marked failing.
    #[derive(Default)]
    pub(crate) struct FakeProber {
        pub failing: Arc<Mutex<HashSet<String>>>,
        pub delay: Option<Duration>,
        pub current: Arc<AtomicUsize>,
        pub peak: Arc<AtomicUsize>,
    }

    impl FakeProber {
        pub fn failing(self, address: &str) -> Self {
            self.failing.lock().insert(address.to_string());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl StreamProber for FakeProber {
        async fn probe(&self, request: &ProbeRequest) -> ProbeOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().contains(&request.address) {
                ProbeOutcome::failed(&request.address, &request.url, "stream not accessible")
            } else {
                ProbeOutcome::success(&request.address, &request.url, Resolution::new(1920, 1080))
            }
        }
    }
}
