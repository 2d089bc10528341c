use thiserror::Error;

use crate::embeddings::EmbeddingError;

#[derive(Error, Debug)]
pub enum SqlsageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Failures that abort session creation. Nothing is left on disk when one is returned.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Schema extraction failed: {0}")]
    Extraction(#[source] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] SqlsageError),

    #[error("Fragment index build failed: {0}")]
    Index(#[from] EmbeddingError),
}

/// Statement execution failures. Rendered into a text response, never propagated to callers.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    Connection(#[source] sqlx::Error),

    #[error("{0}")]
    Statement(#[source] sqlx::Error),
}
