use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::{
    AppState,
    handlers::{channels, groups, retests, runs, settings},
};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .merge(create_run_routes())
        .merge(create_retest_routes())
        .merge(create_channel_routes())
        .merge(create_group_routes())
        .merge(create_settings_routes())
}

fn create_run_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/runs",
            post(runs::submit_run_handler).get(runs::list_runs_handler),
        )
        .route(
            "/runs/{id}",
            get(runs::get_run_handler).delete(runs::delete_run_handler),
        )
        .route("/runs/{id}/retry", post(runs::retry_handler))
}

fn create_retest_routes() -> Router<AppState> {
    Router::new()
        .route("/retests", post(retests::start_retest_handler))
        .route("/retests/sync", post(retests::sync_retest_handler))
        .route("/retests/{id}", get(retests::get_retest_handler))
}

fn create_channel_routes() -> Router<AppState> {
    Router::new()
        .route("/channels", get(channels::list_channels_handler))
        .route("/channels/clear-names", post(channels::clear_names_handler))
        .route("/channels/import", post(channels::import_handler))
        .route("/channels/export", get(channels::export_handler))
        .route("/channels/upload-logo", post(channels::upload_logo_handler))
        .route(
            "/channels/{address}",
            patch(channels::patch_channel_handler),
        )
}

fn create_group_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/groups",
            get(groups::list_groups_handler).post(groups::create_group_handler),
        )
        .route("/groups/reorder", post(groups::reorder_groups_handler))
        .route(
            "/groups/{id}",
            put(groups::rename_group_handler).delete(groups::delete_group_handler),
        )
        .route(
            "/groups/{id}/channels",
            post(groups::add_channels_handler).delete(groups::remove_channels_handler),
        )
}

fn create_settings_routes() -> Router<AppState> {
    Router::new().route(
        "/config",
        get(settings::get_settings_handler).post(settings::update_settings_handler),
    )
}
