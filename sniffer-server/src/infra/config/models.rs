use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sniffer_core::orchestration::OrchestratorSettings;
use sniffer_core::playlist::RenderOptions;
use sniffer_core::probe::ProbeOptions;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub probe: ProbeConfig,
    pub batch: BatchConfig,
    pub playlist: PlaylistConfig,
    pub cors: CorsConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Json => "json",
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "file" => Ok(StorageBackend::Json),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    /// Uploaded channel logos, served under `/logos`.
    pub logos_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub ffmpeg_path: String,
    /// Seconds per capture; already normalised to a positive value.
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
    pub screenshots_dir: PathBuf,
}

impl ProbeConfig {
    pub fn options(&self) -> ProbeOptions {
        ProbeOptions {
            ffmpeg_path: self.ffmpeg_path.clone(),
            extra_args: self.extra_args.clone(),
            ..ProbeOptions::default()
        }
        .with_timeout_secs(self.timeout_secs as i64)
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub default_concurrency: usize,
    pub history_cap: usize,
    pub monitor_interval_ms: u64,
}

impl BatchConfig {
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_concurrency: self.default_concurrency,
            monitor_interval: Duration::from_millis(self.monitor_interval_ms),
            history_cap: self.history_cap,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistConfig {
    pub epg_url: Option<String>,
    pub external_url_template: Option<String>,
}

impl PlaylistConfig {
    /// Options for the internal playlist, which keeps each channel's own URL.
    pub fn internal(&self) -> RenderOptions {
        RenderOptions {
            epg_url: self.epg_url.clone(),
            external_url_template: None,
        }
    }

    pub fn external(&self) -> RenderOptions {
        RenderOptions {
            epg_url: self.epg_url.clone(),
            external_url_template: self.external_url_template.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Config {
    pub fn screenshots_dir(&self) -> &Path {
        &self.probe.screenshots_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.storage.data_dir
    }

    pub fn logos_dir(&self) -> &Path {
        &self.storage.logos_dir
    }
}
