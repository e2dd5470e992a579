use std::path::Path as FsPath;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sniffer_core::library::{ChannelListing, ChannelQuery, GroupFilter, ResolutionBucket};
use sniffer_core::playlist::{ImportReport, export_playlist, import_playlist};
use sniffer_model::{ChannelPatch, ChannelRecord, Connectivity};
use tracing::info;

use crate::api::ApiResponse;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Listing filters as they arrive in the query string. Empty values and
/// `all` mean no filter.
#[derive(Debug, Default, Deserialize)]
pub struct ChannelListParams {
    pub group: Option<String>,
    pub resolution: Option<String>,
    pub connectivity: Option<String>,
    pub search: Option<String>,
}

fn active(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl ChannelListParams {
    pub fn to_query(&self) -> AppResult<ChannelQuery> {
        let group = match active(self.group.as_deref()) {
            Some(raw) => raw.parse::<GroupFilter>().map_err(AppError::bad_request)?,
            None => GroupFilter::All,
        };
        let resolution = active(self.resolution.as_deref())
            .map(str::parse::<ResolutionBucket>)
            .transpose()
            .map_err(AppError::bad_request)?;
        let connectivity = active(self.connectivity.as_deref())
            .map(str::parse::<Connectivity>)
            .transpose()
            .map_err(AppError::bad_request)?;
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(ChannelQuery {
            group,
            resolution,
            connectivity,
            search,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct NamesCleared {
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct LogoUploaded {
    pub address: String,
    pub logo: String,
}

/// `{address}{ext}` with every character outside `[A-Za-z0-9-]` replaced by
/// an underscore. The extension comes from the uploaded name, `.png` when it
/// has none usable.
pub fn logo_file_name(address: &str, uploaded: &str) -> String {
    let stem: String = address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let ext = FsPath::new(uploaded)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "png".to_string());
    format!("{stem}.{ext}")
}

pub async fn list_channels_handler(
    State(state): State<AppState>,
    Query(params): Query<ChannelListParams>,
) -> AppResult<Json<ApiResponse<ChannelListing>>> {
    let query = params.to_query()?;
    Ok(Json(ApiResponse::success(state.library.list(&query))))
}

pub async fn patch_channel_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(patch): Json<ChannelPatch>,
) -> AppResult<Json<ApiResponse<ChannelRecord>>> {
    if patch.is_empty() {
        return Err(AppError::bad_request("no fields to update"));
    }
    let record = state.library.apply_patch(&address, &patch)?;
    state.flush_channels().await;
    info!(address = %address, "channel metadata updated");
    Ok(Json(ApiResponse::success(record)))
}

/// Multipart upload with an `address` (or `ip`) text field and a `logo`
/// file field. The file lands in the logos directory and the channel's
/// `logo` points at its `/logos/` URL.
pub async fn upload_logo_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<LogoUploaded>>> {
    let mut address: Option<String> = None;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "address" | "ip" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
                address = Some(value.trim().to_string());
            }
            "logo" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.body_text()))?;
                upload = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    let address = address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::bad_request("address is required"))?;
    let (uploaded, bytes) =
        upload.ok_or_else(|| AppError::bad_request("no logo file provided"))?;
    if uploaded.trim().is_empty() {
        return Err(AppError::bad_request("no file selected"));
    }
    if !state.library.contains(&address) {
        return Err(AppError::not_found(format!("channel {address} not found")));
    }

    let file_name = logo_file_name(&address, &uploaded);
    let path = state.config().logos_dir().join(&file_name);
    tokio::fs::write(&path, &bytes).await.map_err(|err| {
        AppError::internal(format!("failed to save logo {}: {err}", path.display()))
    })?;

    let logo = format!("/logos/{file_name}");
    state
        .library
        .update(&address, |record| record.metadata.logo = logo.clone())
        .ok_or_else(|| AppError::not_found(format!("channel {address} not found")))?;
    state.flush_channels().await;
    info!(address = %address, logo = %logo, bytes = bytes.len(), "channel logo uploaded");

    Ok(Json(ApiResponse::success(LogoUploaded { address, logo })))
}

pub async fn clear_names_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<NamesCleared>> {
    let cleared = state.library.clear_names();
    state.flush_channels().await;
    info!(cleared, "cleared channel names");
    Json(ApiResponse::success(NamesCleared { cleared }))
}

pub async fn import_handler(
    State(state): State<AppState>,
    body: String,
) -> AppResult<Json<ApiResponse<ImportReport>>> {
    if body.trim().is_empty() {
        return Err(AppError::bad_request("playlist body is empty"));
    }
    let report = import_playlist(&state.library, &body)?;
    state.flush_channels().await;
    state.flush_groups().await;
    let message = format!(
        "imported {} new and updated {} existing channels",
        report.imported, report.updated
    );
    Ok(Json(ApiResponse::success(report).with_message(message)))
}

pub async fn export_handler(State(state): State<AppState>) -> Response {
    let body = export_playlist(&state.library, &state.config().playlist.internal());
    let disposition = format!(
        "attachment; filename=channels_{}.m3u",
        Utc::now().format("%Y%m%d")
    );

    let mut response = (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
