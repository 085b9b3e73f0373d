//! Error types for the core domain

use thiserror::Error;

/// Core domain errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// An index or store has not been built/loaded yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Identity-property resolution was ambiguous or absent
    #[error("Malformed entity: {0}")]
    MalformedEntity(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    /// The backing graph store raised an error
    #[error("Graph store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
