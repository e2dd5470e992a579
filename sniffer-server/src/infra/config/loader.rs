use once_cell::sync::Lazy;
use std::{fs, path::PathBuf};
use thiserror::Error;

use sniffer_core::orchestration::{DEFAULT_CONCURRENCY, DEFAULT_HISTORY_CAP};
use sniffer_core::probe::DEFAULT_TIMEOUT_SECS;

use super::{
    models::{
        BatchConfig, Config, ConfigMetadata, CorsConfig, PlaylistConfig,
        ProbeConfig, ServerConfig, StorageBackend, StorageConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{ConfigWarnings, collect_warnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("sniffer.toml"),
        PathBuf::from("config/sniffer.toml"),
    ]
});

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Resolves configuration from `.env`, the environment and an optional TOML
/// file. Environment values win over the file; defaults fill the rest.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Builds the configuration from already gathered environment values.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            compose_config(file_config, env, config_path, env_file_loaded)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (&self.options.config_path, &env.config_path) {
            (Some(path), _) | (None, Some(path)) => (path.clone(), true),
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => (path.clone(), false),
                None => return Ok((None, None)),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|source| {
            ConfigLoadError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if file_config.is_none() {
        warnings.push_with_hint(
            "No sniffer.toml detected; using environment variables and defaults",
            "Create sniffer.toml or point SNIFFER_CONFIG at a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        storage: file_storage,
        probe: file_probe,
        batch: file_batch,
        playlist: file_playlist,
        cors: file_cors,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let backend = match env.storage_backend.or(file_storage.backend) {
        Some(raw) => raw
            .parse::<StorageBackend>()
            .map_err(|value| ConfigLoadError::InvalidBackend { value })?,
        None => StorageBackend::default(),
    };
    let database_url = env
        .database_url
        .or(file_storage.database_url)
        .filter(|url| !url.trim().is_empty());
    if backend == StorageBackend::Postgres {
        match database_url.as_deref() {
            None => return Err(ConfigLoadError::MissingDatabaseUrl),
            Some(url)
                if !(url.starts_with("postgres://")
                    || url.starts_with("postgresql://")) =>
            {
                return Err(ConfigLoadError::InvalidDatabaseUrl {
                    url: url.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    let storage = StorageConfig {
        backend,
        data_dir: env
            .data_dir
            .or(file_storage.data_dir)
            .unwrap_or_else(|| PathBuf::from("./data")),
        database_url,
        logos_dir: env
            .logos_dir
            .or(file_storage.logos_dir)
            .unwrap_or_else(|| PathBuf::from("./logos")),
    };

    let timeout_secs = env
        .probe_timeout_secs
        .or(file_probe.timeout_secs)
        .filter(|secs| *secs > 0)
        .map(|secs| secs as u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let probe = ProbeConfig {
        ffmpeg_path: env
            .ffmpeg_path
            .or(file_probe.ffmpeg_path)
            .unwrap_or_else(|| "ffmpeg".to_string()),
        timeout_secs,
        extra_args: env
            .probe_extra_args
            .or(file_probe.extra_args)
            .unwrap_or_default(),
        screenshots_dir: env
            .screenshots_dir
            .or(file_probe.screenshots_dir)
            .unwrap_or_else(|| PathBuf::from("./screenshots")),
    };

    let default_concurrency = env
        .batch_concurrency
        .or(file_batch.default_concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    if default_concurrency == 0 {
        warnings.push("batch default_concurrency of 0 is treated as 1");
    }
    let batch = BatchConfig {
        default_concurrency: default_concurrency.max(1),
        history_cap: env
            .batch_history_cap
            .or(file_batch.history_cap)
            .unwrap_or(DEFAULT_HISTORY_CAP)
            .max(1),
        monitor_interval_ms: env
            .monitor_interval_ms
            .or(file_batch.monitor_interval_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_MONITOR_INTERVAL_MS),
    };

    let playlist = PlaylistConfig {
        epg_url: env
            .epg_url
            .or(file_playlist.epg_url)
            .filter(|url| !url.trim().is_empty()),
        external_url_template: env
            .external_url_template
            .or(file_playlist.external_url_template)
            .filter(|template| !template.trim().is_empty()),
    };

    let cors = CorsConfig {
        allowed_origins: env
            .cors_allowed_origins
            .or(file_cors.allowed_origins)
            .unwrap_or_default(),
    };

    let config = Config {
        server,
        storage,
        probe,
        batch,
        playlist,
        cors,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
        },
    };

    warnings.extend(collect_warnings(&config));
    Ok((config, warnings))
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown storage backend '{value}' (expected json, postgres or memory)")]
    InvalidBackend { value: String },
    #[error("postgres storage requires DATABASE_URL or storage.database_url")]
    MissingDatabaseUrl,
    #[error("invalid database URL '{url}': must start with postgres:// or postgresql://")]
    InvalidDatabaseUrl { url: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(file: Option<&str>, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = match file {
            Some(contents) => {
                let path = dir.path().join("sniffer.toml");
                fs::write(&path, contents).expect("write config");
                ConfigLoader::new().with_config_path(path)
            }
            None => ConfigLoader::new(),
        };
        loader.load_with_env(env, false)
    }

    #[test]
    fn defaults_without_file() {
        let ConfigLoad { config, warnings } =
            load(None, EnvConfig::default()).expect("config");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.probe.timeout_secs, 10);
        assert_eq!(config.batch.default_concurrency, 5);
        assert_eq!(config.batch.history_cap, 10);
        assert_eq!(config.batch.monitor_interval_ms, 1000);
        assert_eq!(config.logos_dir(), std::path::Path::new("./logos"));
        assert!(!warnings.is_empty());
    }

    #[test]
    fn env_overrides_file() {
        let env = EnvConfig {
            server_port: Some(9000),
            probe_extra_args: Some(vec!["-rtsp_transport".into(), "tcp".into()]),
            ..Default::default()
        };
        let ConfigLoad { config, .. } = load(
            Some(
                r#"
                [server]
                port = 8080
                host = "127.0.0.1"

                [probe]
                timeout_secs = -3
                extra_args = ["-fflags", "+genpts"]
                "#,
            ),
            env,
        )
        .expect("config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.probe.timeout_secs, 10);
        assert_eq!(config.probe.extra_args, vec!["-rtsp_transport", "tcp"]);
        assert!(config.metadata.config_path.is_some());
    }

    #[test]
    fn postgres_requires_database_url() {
        let env = EnvConfig {
            storage_backend: Some("postgres".into()),
            ..Default::default()
        };
        assert!(matches!(
            load(None, env.clone()),
            Err(ConfigLoadError::MissingDatabaseUrl)
        ));

        let env = EnvConfig {
            database_url: Some("mysql://localhost/db".into()),
            ..env
        };
        assert!(matches!(
            load(None, env),
            Err(ConfigLoadError::InvalidDatabaseUrl { .. })
        ));
    }

    #[test]
    fn rejects_unknown_backend_and_missing_explicit_file() {
        let env = EnvConfig {
            storage_backend: Some("redis".into()),
            ..Default::default()
        };
        assert!(matches!(
            load(None, env),
            Err(ConfigLoadError::InvalidBackend { .. })
        ));

        let missing = ConfigLoader::new()
            .with_config_path("/definitely/not/here/sniffer.toml")
            .load_with_env(EnvConfig::default(), false);
        assert!(matches!(missing, Err(ConfigLoadError::MissingConfig { .. })));
    }

    #[test]
    fn template_without_placeholder_warns() {
        let env = EnvConfig {
            external_url_template: Some("http://proxy/static".into()),
            ..Default::default()
        };
        let ConfigLoad { warnings, .. } = load(None, env).expect("config");
        assert!(
            warnings
                .items
                .iter()
                .any(|w| w.message.contains("external_url_template"))
        );
    }
}
