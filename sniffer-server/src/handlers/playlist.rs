use axum::{extract::State, http::header, response::IntoResponse};
use sniffer_core::playlist::export_playlist;

use crate::infra::app_state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Playlist with the probed stream URLs, for use inside the network.
pub async fn internal_playlist_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = export_playlist(&state.library, &state.config().playlist.internal());
    ([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body)
}

/// Playlist rewritten through `playlist.external_url_template`.
pub async fn external_playlist_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = export_playlist(&state.library, &state.config().playlist.external());
    ([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body)
}
