//! Error types for dbmon

use thiserror::Error;

/// Core error type for dbmon operations
#[derive(Error, Debug)]
pub enum DbmonError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid pool key: {0}")]
    InvalidKey(String),

    #[error("Connection is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DbmonError {
    /// Whether the error means the underlying session is gone and the
    /// connection should be evicted rather than reused.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DbmonError::Connection(_) | DbmonError::Closed)
    }
}

/// Result type alias for dbmon operations
pub type Result<T> = std::result::Result<T, DbmonError>;
