//! HTTP request handlers organized by functionality

pub mod channels;
pub mod groups;
pub mod health;
pub mod playlist;
pub mod retests;
pub mod runs;
pub mod settings;

pub use health::health_handler;
pub use playlist::{external_playlist_handler, internal_playlist_handler};
