pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    BatchConfig, Config, ConfigMetadata, CorsConfig, PlaylistConfig, ProbeConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
