use std::time::Duration;

use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::ApiResponse;
use crate::infra::{
    app_state::AppState,
    config::sources::split_args,
    errors::{AppError, AppResult},
};

/// Settings that can change while the server runs. They live in memory
/// only; a restart returns to the loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub timeout_secs: u64,
    pub default_concurrency: usize,
    pub extra_args: Vec<String>,
}

/// ffmpeg arguments as a JSON list or as one whitespace-separated line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtraArgs {
    List(Vec<String>),
    Line(String),
}

impl ExtraArgs {
    fn into_args(self) -> Vec<String> {
        match self {
            ExtraArgs::List(args) => args
                .into_iter()
                .map(|arg| arg.trim().to_string())
                .filter(|arg| !arg.is_empty())
                .collect(),
            ExtraArgs::Line(line) => split_args(&line),
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct RuntimeSettingsUpdate {
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<i64>,
    #[serde(default, alias = "queue_size")]
    pub default_concurrency: Option<i64>,
    #[serde(default, alias = "custom_params")]
    pub extra_args: Option<ExtraArgs>,
}

fn current(state: &AppState) -> RuntimeSettings {
    let probe = state.probe_options.snapshot();
    RuntimeSettings {
        timeout_secs: probe.timeout.as_secs(),
        default_concurrency: state.orchestrator.settings().default_concurrency,
        extra_args: probe.extra_args,
    }
}

pub async fn get_settings_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<RuntimeSettings>> {
    Json(ApiResponse::success(current(&state)))
}

pub async fn update_settings_handler(
    State(state): State<AppState>,
    Json(update): Json<RuntimeSettingsUpdate>,
) -> AppResult<Json<ApiResponse<RuntimeSettings>>> {
    let timeout = match update.timeout_secs {
        Some(secs) if secs <= 0 => {
            return Err(AppError::bad_request("timeout_secs must be positive"));
        }
        Some(secs) => Some(Duration::from_secs(secs as u64)),
        None => None,
    };
    let concurrency = match update.default_concurrency {
        Some(n) if n < 1 => {
            return Err(AppError::bad_request("default_concurrency must be at least 1"));
        }
        Some(n) => Some(n as usize),
        None => None,
    };
    let extra_args = update.extra_args.map(ExtraArgs::into_args);

    state.probe_options.update(|options| {
        if let Some(timeout) = timeout {
            options.timeout = timeout;
        }
        if let Some(args) = extra_args {
            options.extra_args = args;
        }
    });
    if let Some(concurrency) = concurrency {
        state.orchestrator.set_default_concurrency(concurrency);
    }

    let settings = current(&state);
    info!(
        timeout_secs = settings.timeout_secs,
        default_concurrency = settings.default_concurrency,
        extra_args = ?settings.extra_args,
        "runtime settings updated"
    );
    Ok(Json(
        ApiResponse::success(settings).with_message("settings apply to probes started from now on"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_legacy_field_names_and_argument_lines() {
        let update: RuntimeSettingsUpdate = serde_json::from_str(
            r#"{"timeout": 4, "queue_size": 8, "custom_params": " -rtsp_transport  tcp "}"#,
        )
        .expect("update");
        assert_eq!(update.timeout_secs, Some(4));
        assert_eq!(update.default_concurrency, Some(8));
        assert_eq!(
            update.extra_args.map(ExtraArgs::into_args),
            Some(vec!["-rtsp_transport".to_string(), "tcp".to_string()])
        );

        let update: RuntimeSettingsUpdate =
            serde_json::from_str(r#"{"extra_args": ["-fflags", " ", "+genpts"]}"#).expect("update");
        assert_eq!(
            update.extra_args.map(ExtraArgs::into_args),
            Some(vec!["-fflags".to_string(), "+genpts".to_string()])
        );
    }
}
