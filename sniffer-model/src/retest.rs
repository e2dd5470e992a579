use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Connectivity;
use crate::ids::TaskId;
use crate::probe::{ProbeStatus, Resolution};
use crate::run::RunStatus;

/// Per-address result of a connectivity retest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetestEntry {
    pub address: String,
    pub status: ProbeStatus,
    pub connectivity: Connectivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RetestEntry {
    pub fn testing(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: ProbeStatus::Testing,
            connectivity: Connectivity::Testing,
            resolution: None,
            screenshot: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Entry for a channel that could not be probed at all.
    pub fn offline(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Failed,
            connectivity: Connectivity::Offline,
            message: Some(message.into()),
            ..Self::testing(address)
        }
    }
}

/// A connectivity retest over a set of existing channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetestTask {
    pub id: TaskId,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    #[serde(default)]
    pub results: BTreeMap<String, RetestEntry>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RetestTask {
    pub fn new(addresses: &[String]) -> Self {
        let results = addresses
            .iter()
            .map(|a| (a.clone(), RetestEntry::testing(a.clone())))
            .collect::<BTreeMap<_, _>>();
        Self {
            id: TaskId::new(),
            status: RunStatus::Running,
            total: results.len(),
            completed: 0,
            results,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, entry: RetestEntry) {
        self.results.insert(entry.address.clone(), entry);
        if self.completed < self.total {
            self.completed += 1;
        }
        if self.completed >= self.total {
            self.status = RunStatus::Completed;
            self.finished_at = Some(Utc::now());
        }
    }
}
