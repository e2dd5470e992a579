//! Stream probing through the external ffmpeg tool.
//!
//! A probe runs up to three ffmpeg invocations against one URL: a short
//! resolution pre-probe, a single-frame capture and, when capture yields no
//! frame, a plain `-i` inspection. The outcome is classified once and never
//! revisited.

pub mod artifact;
pub mod command;
pub mod ffmpeg;
pub mod output;
pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sniffer_model::ProbeOutcome;

pub use artifact::{Artifact, ArtifactStore};
pub use ffmpeg::FfmpegProber;
pub use output::MarkerPolicy;
pub use runner::{ProcessRunner, ToolOutput, ToolRun, ToolRunner};

/// Default per-capture timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Knobs shared by every probe issued from one process.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub ffmpeg_path: String,
    /// Inserted verbatim before `-i` on the capture command.
    pub extra_args: Vec<String>,
    pub markers: MarkerPolicy,
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            extra_args: Vec::new(),
            markers: MarkerPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProbeOptions {
    /// Non-positive timeouts fall back to the default.
    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        let secs = if secs <= 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            secs as u64
        };
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// [`ProbeOptions`] that can be retuned while the process runs. Every
/// probe works from the snapshot taken when it starts.
#[derive(Debug, Clone, Default)]
pub struct SharedProbeOptions(Arc<RwLock<ProbeOptions>>);

impl SharedProbeOptions {
    pub fn new(options: ProbeOptions) -> Self {
        Self(Arc::new(RwLock::new(options)))
    }

    pub fn snapshot(&self) -> ProbeOptions {
        self.0.read().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ProbeOptions) -> R) -> R {
        f(&mut self.0.write())
    }
}

impl From<ProbeOptions> for SharedProbeOptions {
    fn from(options: ProbeOptions) -> Self {
        Self::new(options)
    }
}

/// A single probe to perform.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub address: String,
    pub url: String,
    pub artifact: Artifact,
}

impl ProbeRequest {
    pub fn new(
        address: impl Into<String>,
        url: impl Into<String>,
        artifact: Artifact,
    ) -> Self {
        Self {
            address: address.into(),
            url: url.into(),
            artifact,
        }
    }
}

/// Probes one stream and classifies the result.
///
/// Transient failures are reported through a `failed` outcome rather than
/// an error.
#[async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> ProbeOutcome;
}
