//! Database error types

use talkgraph_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Record not found: {0} with key {1}")]
    NotFound(String, String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    /// The vector index has not been built or loaded
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    #[error("Invalid index data: {0}")]
    InvalidIndex(String),

    #[error("Index file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(inner) => inner,
            DbError::NotReady(what) => CoreError::NotReady(what),
            DbError::InvalidEmbeddingDimension { expected, actual } => {
                CoreError::InvalidEmbeddingDimension { expected, actual }
            }
            other => CoreError::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
