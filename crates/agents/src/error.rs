//! Agent error types

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Database error: {0}")]
    Database(#[from] talkgraph_db::DbError),

    #[error("Graph store error: {0}")]
    Core(#[from] talkgraph_core::CoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Run `future` under a deadline, mapping expiry to [`AgentError::Timeout`]
pub async fn bounded<T, E, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    AgentError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(AgentError::from),
        Err(_) => Err(AgentError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AgentError>(1)
        };
        let err = bounded("slow call", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));
        assert!(err.to_string().starts_with("slow call timed out"));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let fast = async { Ok::<_, AgentError>(7) };
        assert_eq!(bounded("fast", Duration::from_secs(1), fast).await.unwrap(), 7);
    }
}
