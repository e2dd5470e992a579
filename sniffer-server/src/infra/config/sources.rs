use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
    #[serde(default)]
    pub probe: FileProbeConfig,
    #[serde(default)]
    pub batch: FileBatchConfig,
    #[serde(default)]
    pub playlist: FilePlaylistConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logos_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileProbeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_cap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePlaylistConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url_template: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub storage_backend: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub logos_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<String>,
    pub probe_timeout_secs: Option<i64>,
    pub probe_extra_args: Option<Vec<String>>,
    pub screenshots_dir: Option<PathBuf>,
    pub batch_concurrency: Option<usize>,
    pub batch_history_cap: Option<usize>,
    pub monitor_interval_ms: Option<u64>,
    pub epg_url: Option<String>,
    pub external_url_template: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: var("SNIFFER_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            storage_backend: var("STORAGE_BACKEND"),
            data_dir: var("DATA_DIR").map(PathBuf::from),
            database_url: var("DATABASE_URL"),
            logos_dir: var("LOGOS_DIR").map(PathBuf::from),
            ffmpeg_path: var("FFMPEG_PATH"),
            probe_timeout_secs: parse_var("PROBE_TIMEOUT_SECS"),
            probe_extra_args: var("PROBE_EXTRA_ARGS").map(|raw| split_args(&raw)),
            screenshots_dir: var("SCREENSHOTS_DIR").map(PathBuf::from),
            batch_concurrency: parse_var("BATCH_CONCURRENCY"),
            batch_history_cap: parse_var("BATCH_HISTORY_CAP"),
            monitor_interval_ms: parse_var("MONITOR_INTERVAL_MS"),
            epg_url: var("EPG_URL"),
            external_url_template: var("EXTERNAL_URL_TEMPLATE"),
            cors_allowed_origins: parse_csv_var("CORS_ALLOWED_ORIGINS"),
        }
    }
}

/// Whitespace-separated ffmpeg arguments.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|raw| raw.trim().parse().ok())
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    var(name).map(|raw| {
        raw.split(',')
            .filter_map(|part| {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect()
    })
}
