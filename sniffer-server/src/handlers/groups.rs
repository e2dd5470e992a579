use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sniffer_model::{Group, GroupId};
use tracing::info;

use crate::api::ApiResponse;
use crate::handlers::retests::Addresses;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct GroupNameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub order: Vec<GroupId>,
}

#[derive(Debug, Deserialize)]
pub struct GroupChannelsRequest {
    #[serde(default, alias = "channels", alias = "ips")]
    pub addresses: Addresses,
}

#[derive(Debug, Serialize)]
pub struct Affected {
    pub affected: usize,
}

fn parse_group_id(raw: &str) -> AppResult<GroupId> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid group id: {raw}")))
}

pub async fn list_groups_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<Group>>> {
    Json(ApiResponse::success(state.library.snapshot_groups()))
}

pub async fn create_group_handler(
    State(state): State<AppState>,
    Json(request): Json<GroupNameRequest>,
) -> AppResult<impl IntoResponse> {
    let group = state.library.create_group(&request.name)?;
    state.flush_groups().await;
    info!(group = %group.id, name = %group.name, "group created");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(group))))
}

pub async fn rename_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GroupNameRequest>,
) -> AppResult<Json<ApiResponse<Group>>> {
    let group = state
        .library
        .rename_group(parse_group_id(&id)?, &request.name)?;
    state.flush_groups().await;
    Ok(Json(ApiResponse::success(group)))
}

pub async fn delete_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Group>>> {
    let group = state.library.delete_group(parse_group_id(&id)?)?;
    state.flush_groups().await;
    info!(group = %group.id, "group deleted");
    Ok(Json(ApiResponse::success(group)))
}

pub async fn reorder_groups_handler(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let affected = state.library.reorder_groups(&request.order)?;
    state.flush_groups().await;
    Ok(Json(ApiResponse::success(Affected { affected })))
}

pub async fn add_channels_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GroupChannelsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let addresses = request.addresses.into_vec();
    let affected = state
        .library
        .add_to_group(parse_group_id(&id)?, &addresses)?;
    state.flush_groups().await;
    Ok(Json(ApiResponse::success(Affected { affected })))
}

pub async fn remove_channels_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GroupChannelsRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    let addresses = request.addresses.into_vec();
    let affected = state
        .library
        .remove_from_group(parse_group_id(&id)?, &addresses)?;
    state.flush_groups().await;
    Ok(Json(ApiResponse::success(Affected { affected })))
}
