use std::{collections::HashSet, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use sniffer_core::{
    SharedProbeOptions, StreamProber,
    persistence::MemoryStore,
    probe::ProbeRequest,
};
use sniffer_model::{ProbeOutcome, Resolution};
use sniffer_server::{
    AppState, create_app,
    infra::config::{
        BatchConfig, Config, ConfigMetadata, CorsConfig, PlaylistConfig, ProbeConfig,
        ServerConfig, StorageBackend, StorageConfig,
    },
};
use tempfile::TempDir;
use tower::ServiceExt;

/// Succeeds at 1080p for every address except the failing ones.
#[derive(Debug, Default)]
pub struct FakeProber {
    failing: HashSet<String>,
}

#[allow(unused)]
impl FakeProber {
    pub fn failing<I: IntoIterator<Item = &'static str>>(addresses: I) -> Self {
        Self {
            failing: addresses.into_iter().map(str::to_string).collect(),
        }
    }
}

#[async_trait]
impl StreamProber for FakeProber {
    async fn probe(&self, request: &ProbeRequest) -> ProbeOutcome {
        if self.failing.contains(&request.address) {
            ProbeOutcome::failed(&request.address, &request.url, "no frame captured")
        } else {
            ProbeOutcome::success(&request.address, &request.url, Resolution::new(1920, 1080))
                .with_screenshot(request.artifact.public_path.clone())
        }
    }
}

#[allow(unused)]
#[derive(Debug)]
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _tempdir: TempDir,
}

pub fn test_config(root: PathBuf) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            data_dir: root.join("data"),
            database_url: None,
            logos_dir: root.join("logos"),
        },
        probe: ProbeConfig {
            ffmpeg_path: "ffmpeg".into(),
            timeout_secs: 1,
            extra_args: Vec::new(),
            screenshots_dir: root.join("screenshots"),
        },
        batch: BatchConfig {
            default_concurrency: 2,
            history_cap: 5,
            monitor_interval_ms: 20,
        },
        playlist: PlaylistConfig {
            epg_url: None,
            external_url_template: Some("http://proxy.lan:4022/udp/{ip}:5000".into()),
        },
        cors: CorsConfig::default(),
        metadata: ConfigMetadata::default(),
    }
}

#[allow(unused)]
pub async fn build_test_app(prober: FakeProber) -> TestApp {
    let tempdir = TempDir::new().expect("tempdir");
    let config = Arc::new(test_config(tempdir.path().to_path_buf()));
    let probe_options = SharedProbeOptions::new(config.probe.options());
    let state = AppState::build(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(prober),
        probe_options,
    )
    .await
    .expect("build app state");
    TestApp {
        router: create_app(state.clone()),
        state,
        _tempdir: tempdir,
    }
}

#[allow(unused)]
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[allow(unused)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[allow(unused)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}
