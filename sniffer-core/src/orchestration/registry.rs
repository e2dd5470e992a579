use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use sniffer_model::{BatchRun, RunId, RunStatus};
use tracing::{info, warn};

pub const DEFAULT_HISTORY_CAP: usize = 10;

/// Retained batch runs, bounded by a history cap.
///
/// Run ids are time ordered, so the smallest key is always the oldest run.
pub struct RunRegistry {
    runs: RwLock<BTreeMap<RunId, BatchRun>>,
    history_cap: usize,
}

impl fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRegistry")
            .field("runs", &self.runs.read().len())
            .field("history_cap", &self.history_cap)
            .finish()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl RunRegistry {
    pub fn new(history_cap: usize) -> Self {
        Self {
            runs: RwLock::new(BTreeMap::new()),
            history_cap: history_cap.max(1),
        }
    }

    /// Loads persisted runs. Runs left `running` by a previous process have
    /// no probes or monitor any more; they are closed with a summary over
    /// whatever results were recorded.
    pub fn restore(&self, runs: Vec<BatchRun>) {
        let mut guard = self.runs.write();
        for mut run in runs {
            if run.status == RunStatus::Running {
                warn!(run_id = %run.id, completed = run.completed, total = run.total, "closing interrupted run");
                run.finish();
            }
            guard.insert(run.id, run);
        }
        while guard.len() > self.history_cap {
            guard.pop_first();
        }
    }

    /// Stores `run`, evicting the oldest runs beyond the history cap.
    pub fn insert(&self, run: BatchRun) -> Vec<RunId> {
        let mut guard = self.runs.write();
        let mut evicted = Vec::new();
        while guard.len() >= self.history_cap {
            match guard.pop_first() {
                Some((id, _)) => {
                    info!(run_id = %id, "evicted oldest run from history");
                    evicted.push(id);
                }
                None => break,
            }
        }
        guard.insert(run.id, run);
        evicted
    }

    pub fn contains(&self, id: RunId) -> bool {
        self.runs.read().contains_key(&id)
    }

    /// Cloned snapshot of a retained run.
    pub fn get(&self, id: RunId) -> Option<BatchRun> {
        self.runs.read().get(&id).cloned()
    }

    /// Runs `f` against the run while holding the write lock.
    pub fn update<F, R>(&self, id: RunId, f: F) -> Option<R>
    where
        F: FnOnce(&mut BatchRun) -> R,
    {
        self.runs.write().get_mut(&id).map(f)
    }

    pub fn remove(&self, id: RunId) -> Option<BatchRun> {
        self.runs.write().remove(&id)
    }

    /// Snapshots, newest first.
    pub fn list(&self) -> Vec<BatchRun> {
        self.runs.read().values().rev().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<BatchRun> {
        self.runs.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> BatchRun {
        BatchRun::new("rtp://{ip}:5000", "10.0.0.1", "10.0.0.1", 1, 1)
    }

    #[test]
    fn eleventh_insert_evicts_exactly_the_oldest() {
        let registry = RunRegistry::new(10);
        let ids: Vec<RunId> = (0..10)
            .map(|_| {
                let run = run();
                let id = run.id;
                assert!(registry.insert(run).is_empty());
                id
            })
            .collect();

        let newest = run();
        let newest_id = newest.id;
        let evicted = registry.insert(newest);
        assert_eq!(evicted, vec![ids[0]]);
        assert_eq!(registry.len(), 10);
        assert!(!registry.contains(ids[0]));
        assert!(registry.contains(ids[1]));
        assert_eq!(registry.list()[0].id, newest_id);
    }

    #[test]
    fn restore_closes_interrupted_runs() {
        let registry = RunRegistry::default();
        let interrupted = run();
        let id = interrupted.id;
        registry.restore(vec![interrupted]);

        let restored = registry.get(id).expect("restored");
        assert_eq!(restored.status, RunStatus::Completed);
        assert!(restored.summary.is_some());
    }
}
