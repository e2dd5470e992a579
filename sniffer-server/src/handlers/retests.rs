use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sniffer_model::{RetestEntry, RetestTask, TaskId};

use crate::api::ApiResponse;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// A single address or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Addresses {
    One(String),
    Many(Vec<String>),
}

impl Default for Addresses {
    fn default() -> Self {
        Addresses::Many(Vec::new())
    }
}

impl Addresses {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Addresses::One(address) => vec![address],
            Addresses::Many(addresses) => addresses,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRetestRequest {
    #[serde(default, alias = "ips")]
    pub addresses: Addresses,
}

#[derive(Debug, Serialize)]
pub struct RetestAccepted {
    pub task_id: TaskId,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SyncRetestRequest {
    #[serde(default, alias = "ip")]
    pub address: String,
}

pub async fn start_retest_handler(
    State(state): State<AppState>,
    Json(request): Json<StartRetestRequest>,
) -> AppResult<impl IntoResponse> {
    let addresses = request.addresses.into_vec();
    let task_id = state.retests.start(&addresses)?;
    let total = state.retests.status(task_id)?.total;

    Ok((
        StatusCode::ACCEPTED,
        Json(
            ApiResponse::success(RetestAccepted { task_id, total })
                .with_message("connectivity test started in background"),
        ),
    ))
}

pub async fn get_retest_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RetestTask>>> {
    let task_id: TaskId = id
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid task id: {id}")))?;
    Ok(Json(ApiResponse::success(state.retests.status(task_id)?)))
}

pub async fn sync_retest_handler(
    State(state): State<AppState>,
    Json(request): Json<SyncRetestRequest>,
) -> AppResult<Json<ApiResponse<RetestEntry>>> {
    let entry = state.retests.probe_now(&request.address).await?;
    Ok(Json(ApiResponse::success(entry)))
}
