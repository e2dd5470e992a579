//! Core data model definitions shared across the sniffer crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod channel;
pub mod error;
pub mod group;
pub mod ids;
pub mod probe;
pub mod retest;
pub mod run;

// Intentionally curated re-exports for downstream consumers.
pub use channel::{ChannelMetadata, ChannelPatch, ChannelRecord, Connectivity};
pub use error::{ModelError, Result as ModelResult};
pub use group::Group;
pub use ids::{GroupId, RunId, TaskId};
pub use probe::{ProbeOutcome, ProbeStatus, Resolution};
pub use retest::{RetestEntry, RetestTask};
pub use run::{BatchRun, RunStatus, RunSummary};
