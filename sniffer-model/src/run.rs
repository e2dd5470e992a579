use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::probe::{ProbeOutcome, ProbeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
}

/// Final statistics computed once a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: usize,
    pub failed: usize,
    /// Fraction of terminal results that succeeded, in `0.0..=1.0`.
    pub success_ratio: f64,
}

impl RunSummary {
    pub fn from_results<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a ProbeOutcome>,
    {
        let (mut success, mut failed) = (0usize, 0usize);
        for outcome in outcomes {
            match outcome.status {
                ProbeStatus::Success => success += 1,
                ProbeStatus::Failed => failed += 1,
                ProbeStatus::Testing => {}
            }
        }
        let settled = success + failed;
        let success_ratio = if settled == 0 {
            0.0
        } else {
            success as f64 / settled as f64
        };
        Self {
            success,
            failed,
            success_ratio,
        }
    }
}

/// One batch probing request over a contiguous address range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub id: RunId,
    pub url_template: String,
    pub start_address: String,
    pub end_address: String,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub concurrency: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: BTreeMap<String, ProbeOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl BatchRun {
    pub fn new(
        url_template: impl Into<String>,
        start_address: impl Into<String>,
        end_address: impl Into<String>,
        total: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            id: RunId::new(),
            url_template: url_template.into(),
            start_address: start_address.into(),
            end_address: end_address.into(),
            status: RunStatus::Running,
            total,
            completed: 0,
            concurrency,
            started_at: Utc::now(),
            finished_at: None,
            results: BTreeMap::new(),
            summary: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.completed >= self.total
    }

    /// Counts one more finished initial probe, never past `total`.
    pub fn record_completion(&mut self) {
        if self.completed < self.total {
            self.completed += 1;
        }
    }

    pub fn finish(&mut self) -> RunSummary {
        let summary = RunSummary::from_results(self.results.values());
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.summary = Some(summary);
        summary
    }

    /// Expands the URL template for one address.
    pub fn url_for(&self, address: &str) -> String {
        self.url_template.replace("{ip}", address)
    }
}
