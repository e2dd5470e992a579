//! # Sniffer Core
//!
//! Probing and library logic for the stream sniffer.
//!
//! - [`probe`]: ffmpeg-backed stream prober and artifact storage
//! - [`orchestration`]: batch runs, admission control, result folding,
//!   completion monitoring and connectivity retests
//! - [`library`]: channel records, groups, listing and statistics
//! - [`playlist`]: M3U import and export
//! - [`persistence`]: document stores (JSON files, Postgres, memory)
//!
//! ## Feature Flags
//!
//! - `database`: enables the Postgres document store (SQLx)

#![allow(missing_docs)]

/// Error types shared across the crate
pub mod error;

/// Channel records and groups held in memory
pub mod library;

/// Batch run orchestration and connectivity retests
pub mod orchestration;

/// Snapshot persistence backends
pub mod persistence;

/// M3U playlist codec
pub mod playlist;

/// Stream probing via ffmpeg
pub mod probe;

pub use error::{Result, SnifferError};
pub use library::ChannelLibrary;
pub use orchestration::{BatchOrchestrator, RetestWorkflow, TaskSupervisor};
pub use persistence::{DocumentStore, Persistence};
pub use probe::{FfmpegProber, ProbeOptions, SharedProbeOptions, StreamProber};
