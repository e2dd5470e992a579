use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "storage": state.config().storage.backend.as_str(),
            "channels": state.library.len(),
            "runs": state.orchestrator.registry().len(),
            "live_tasks": state.supervisor.live_tasks(),
            "screenshots_dir": state.config().screenshots_dir().exists(),
        }
    }))
}
