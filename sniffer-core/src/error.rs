use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnifferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnifferError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SnifferError::NotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        SnifferError::InvalidRequest(reason.into())
    }
}

impl From<tokio::task::JoinError> for SnifferError {
    fn from(err: tokio::task::JoinError) -> Self {
        SnifferError::Internal(format!("task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SnifferError>;
