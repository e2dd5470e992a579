//! HTTP surface of the stream sniffer.
//!
//! The binary in `main.rs` loads configuration, calls
//! [`infra::startup::bootstrap`] and serves [`create_app`]. Integration tests
//! build an [`AppState`] over an in-memory store and drive the router
//! directly.

pub mod api;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{
    Router,
    http::{HeaderValue, header},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::handlers::{external_playlist_handler, health_handler, internal_playlist_handler};

/// Builds the full router: versioned API, playlists, screenshots, logos and
/// health.
pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config()
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };
    let cors_layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    // Screenshots are overwritten in place on every probe.
    let screenshots = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .service(ServeDir::new(state.config().screenshots_dir()));

    Router::new()
        .route("/health", get(health_handler))
        .route("/m3u", get(internal_playlist_handler))
        .route("/net", get(external_playlist_handler))
        .nest_service("/screenshots", screenshots)
        .nest_service("/logos", ServeDir::new(state.config().logos_dir()))
        .merge(routes::create_api_router())
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
