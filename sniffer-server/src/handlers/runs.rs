use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sniffer_core::orchestration::SubmitRunRequest;
use sniffer_model::{BatchRun, RunId};

use crate::api::ApiResponse;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    #[serde(default, alias = "ip")]
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct RetryAccepted {
    pub run_id: RunId,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct RunDeleted {
    pub run_id: RunId,
    pub deleted_artifacts: usize,
}

pub(crate) fn parse_run_id(raw: &str) -> AppResult<RunId> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid run id: {raw}")))
}

pub async fn submit_run_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRunRequest>,
) -> AppResult<impl IntoResponse> {
    let run_id = state.orchestrator.submit(request).await?;
    let total = state.orchestrator.status(run_id)?.total;

    Ok((
        StatusCode::ACCEPTED,
        Json(
            ApiResponse::success(RunAccepted { run_id, total })
                .with_message("batch run started"),
        ),
    ))
}

pub async fn list_runs_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<BatchRun>>> {
    Json(ApiResponse::success(state.orchestrator.list()))
}

pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<BatchRun>>> {
    let run = state.orchestrator.status(parse_run_id(&id)?)?;
    Ok(Json(ApiResponse::success(run)))
}

pub async fn delete_run_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RunDeleted>>> {
    let run_id = parse_run_id(&id)?;
    let deleted_artifacts = state.orchestrator.delete(run_id).await?;
    Ok(Json(ApiResponse::success(RunDeleted {
        run_id,
        deleted_artifacts,
    })))
}

pub async fn retry_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RetryRequest>,
) -> AppResult<impl IntoResponse> {
    let run_id = parse_run_id(&id)?;
    state.orchestrator.retry(run_id, &request.address)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(RetryAccepted {
            run_id,
            address: request.address.trim().to_string(),
        })),
    ))
}
