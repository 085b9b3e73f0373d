//! Embedding similarity search and entity-name extraction for graph seeds

use crate::error::{bounded, AgentError, Result};
use crate::inference::Embedder;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use talkgraph_core::SemanticResult;
use talkgraph_db::VectorIndex;
use tracing::{instrument, warn};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_SEED_ENTITIES: usize = 5;

pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            timeout: Duration::from_secs(crate::config::DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// False when the index has not been built or cannot be read
    pub async fn is_ready(&self) -> bool {
        match self.index.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Vector index readiness check failed: {}", e);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SemanticResult>> {
        if !bounded("index readiness", self.timeout, self.index.is_ready()).await? {
            return Err(AgentError::NotReady(
                "vector index is not loaded; run build-index first".into(),
            ));
        }
        let vector = bounded("query embedding", self.timeout, self.embedder.embed(query)).await?;
        bounded("vector search", self.timeout, self.index.search(&vector, k)).await
    }
}

/// Seed names for graph expansion: identities from the top semantic hits,
/// then capitalized words of the question, deduplicated case-insensitively.
pub fn extract_entity_names(semantic: &[SemanticResult], query: &str) -> Vec<String> {
    let from_hits = semantic
        .iter()
        .take(MAX_SEED_ENTITIES)
        .filter_map(|r| r.identity().map(str::to_string));
    let from_query = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| ".,!?;:".contains(c)))
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase) && w.chars().count() > 2)
        .map(str::to_string);

    let mut seen = HashSet::new();
    from_hits
        .chain(from_query)
        .filter(|name| seen.insert(name.to_lowercase()))
        .take(MAX_SEED_ENTITIES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use talkgraph_core::NodeType;

    fn hit(metadata: serde_json::Value) -> SemanticResult {
        SemanticResult {
            node_type: NodeType::Talk,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            similarity_score: 0.9,
        }
    }

    #[test]
    fn test_entity_names_merge_hits_and_query() {
        let semantic = vec![
            hit(json!({"title": "Graph Thinking"})),
            hit(json!({"keyword": "graphs"})),
            hit(json!({"description": "no identity"})),
        ];
        let names = extract_entity_names(&semantic, "How does Jane relate to graphs and Graph Thinking?");
        assert_eq!(names, vec!["Graph Thinking", "graphs", "How", "Jane", "Graph"]);
    }

    #[test]
    fn test_entity_names_capped() {
        let names = extract_entity_names(&[], "Alpha Beta Gamma Delta Epsilon Zeta");
        assert_eq!(names.len(), MAX_SEED_ENTITIES);
    }

    #[tokio::test]
    async fn test_search_requires_loaded_index() {
        struct Never;
        #[async_trait::async_trait]
        impl Embedder for Never {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                unreachable!("index check comes first")
            }
        }
        let db = talkgraph_db::init_memory().await.unwrap();
        let retriever = SemanticRetriever::new(Arc::new(Never), Arc::new(VectorIndex::new(db)));
        assert!(!retriever.is_ready().await);
        let err = retriever.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, AgentError::NotReady(_)));
    }
}
