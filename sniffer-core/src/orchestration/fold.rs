use std::sync::Arc;

use sniffer_model::{ChannelRecord, ProbeOutcome, RunId};
use tracing::debug;

use super::registry::RunRegistry;
use crate::library::ChannelLibrary;

/// Whether a probe is part of the run's initial sweep or an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Counts towards the run's completion tally.
    Initial,
    /// Replaces the address's result without touching the tally.
    Retry,
}

/// What a fold changed.
#[derive(Debug, Clone)]
pub struct FoldReport {
    /// False when the run was deleted before the outcome arrived.
    pub run_updated: bool,
    pub record: ChannelRecord,
}

/// Applies probe outcomes to run state and to the channel library.
#[derive(Debug, Clone)]
pub struct ResultFolder {
    registry: Arc<RunRegistry>,
    library: Arc<ChannelLibrary>,
}

impl ResultFolder {
    pub fn new(registry: Arc<RunRegistry>, library: Arc<ChannelLibrary>) -> Self {
        Self { registry, library }
    }

    /// Records a `testing` placeholder for a probe that is starting. The
    /// placeholder never counts towards completion.
    pub fn mark_testing(&self, run_id: RunId, address: &str, url: &str) -> bool {
        self.registry
            .update(run_id, |run| {
                run.results
                    .insert(address.to_string(), ProbeOutcome::testing(address, url));
            })
            .is_some()
    }

    /// Stores `outcome` in the run and the channel library. Only terminal
    /// initial outcomes advance `completed`.
    pub fn fold(
        &self,
        run_id: RunId,
        outcome: ProbeOutcome,
        kind: ProbeKind,
    ) -> FoldReport {
        let run_updated = self
            .registry
            .update(run_id, |run| {
                let counts = kind == ProbeKind::Initial && outcome.status.is_terminal();
                run.results.insert(outcome.address.clone(), outcome.clone());
                if counts {
                    run.record_completion();
                }
            })
            .is_some();

        if !run_updated {
            debug!(
                run_id = %run_id,
                address = %outcome.address,
                "run no longer exists, folding into channel record only"
            );
        }

        let record = self.library.fold_probe(&outcome);
        FoldReport {
            run_updated,
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniffer_model::{BatchRun, Connectivity, ProbeStatus};

    fn setup() -> (ResultFolder, Arc<RunRegistry>, Arc<ChannelLibrary>, RunId) {
        let registry = Arc::new(RunRegistry::default());
        let library = Arc::new(ChannelLibrary::new());
        let run = BatchRun::new("rtp://{ip}:5000", "10.0.0.1", "10.0.0.2", 2, 1);
        let run_id = run.id;
        registry.insert(run);
        (
            ResultFolder::new(registry.clone(), library.clone()),
            registry,
            library,
            run_id,
        )
    }

    #[test]
    fn retry_updates_outcome_but_not_completed() {
        let (folder, registry, library, run_id) = setup();

        let failed = ProbeOutcome::failed("10.0.0.1", "rtp://10.0.0.1:5000", "stream not accessible");
        assert!(folder.fold(run_id, failed, ProbeKind::Initial).run_updated);
        assert_eq!(registry.get(run_id).expect("run").completed, 1);

        let ok = ProbeOutcome::success("10.0.0.1", "rtp://10.0.0.1:5000", None);
        folder.fold(run_id, ok, ProbeKind::Retry);

        let run = registry.get(run_id).expect("run");
        assert_eq!(run.completed, 1);
        assert_eq!(run.results["10.0.0.1"].status, ProbeStatus::Success);
        assert_eq!(
            library.get("10.0.0.1").expect("record").connectivity,
            Connectivity::Online
        );
    }

    #[test]
    fn placeholder_does_not_count() {
        let (folder, registry, _library, run_id) = setup();
        assert!(folder.mark_testing(run_id, "10.0.0.2", "rtp://10.0.0.2:5000"));
        let run = registry.get(run_id).expect("run");
        assert_eq!(run.completed, 0);
        assert_eq!(run.results["10.0.0.2"].status, ProbeStatus::Testing);
    }

    #[test]
    fn late_outcome_after_delete_still_updates_channel() {
        let (folder, registry, library, run_id) = setup();
        registry.remove(run_id);

        let ok = ProbeOutcome::success("10.0.0.2", "rtp://10.0.0.2:5000", None);
        let report = folder.fold(run_id, ok, ProbeKind::Initial);
        assert!(!report.run_updated);
        assert!(library.contains("10.0.0.2"));
        assert!(!folder.mark_testing(run_id, "10.0.0.2", "x"));
    }
}
