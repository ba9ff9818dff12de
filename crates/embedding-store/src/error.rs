use pantry_protocol::{EmbeddingId, OwnerError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingStoreError>;

#[derive(Error, Debug)]
pub enum EmbeddingStoreError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Ownership error: {0}")]
    Owner(#[from] OwnerError),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Embedding {0} is owned by a general item and cannot be deleted directly")]
    DeletionRestricted(EmbeddingId),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Vector backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
