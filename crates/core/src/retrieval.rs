//! Retrieval result types produced by the retrievers and consumed by the
//! context assembler.

use crate::node::{identity_of, NodeType};
use serde::{Deserialize, Serialize};

/// A node returned by the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticResult {
    pub node_type: NodeType,

    /// Node properties captured at embedding time (title, speaker, talks, ...)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Inner product of normalized vectors, in [-1, 1]
    pub similarity_score: f32,
}

impl SemanticResult {
    pub fn meta_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(|v| v.as_str())
    }

    /// The populated identity property in the metadata, if any
    pub fn identity(&self) -> Option<&str> {
        identity_of(
            self.meta_str("name"),
            self.meta_str("title"),
            self.meta_str("keyword"),
        )
    }
}

/// A neighbor reached from a seed node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConnection {
    pub source_type: NodeType,
    pub source_identity: String,

    /// Type of the first relationship on the path
    pub relationship: String,

    /// Every relationship type along the shortest path, in order
    pub relationship_chain: Vec<String>,

    pub neighbor_type: NodeType,
    pub neighbor_identity: String,
    pub path_length: usize,
}

/// A talk whose transcript matched the query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResult {
    pub title: String,

    #[serde(default)]
    pub speakers: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// One or more transcript excerpts joined by `" | "`
    pub snippet: String,

    /// Segment start as stored, e.g. "12:04"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Deep link to the matched moment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_link: Option<String>,

    pub transcript_length: usize,
}

/// A node on a multi-hop path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathNode {
    pub node_type: NodeType,
    pub name: String,
}

/// A shortest path between two resolved entities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiHopPath {
    pub nodes: Vec<PathNode>,
    pub relationship_types: Vec<String>,
    pub length: usize,
}

impl MultiHopPath {
    /// `A -[R]- B -[S]- C`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                let rel = self
                    .relationship_types
                    .get(i - 1)
                    .map(String::as_str)
                    .unwrap_or("?");
                out.push_str(&format!(" -[{}]- ", rel));
            }
            out.push_str(&node.name);
        }
        out
    }
}

/// A talk matched by plain keyword search over title/description/category
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KeywordMatch {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Another node in the same community as a looked-up node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityMember {
    pub node_type: NodeType,
    pub name: String,
    pub community_id: String,
}

/// Any one piece of retrieved evidence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalResult {
    Semantic(SemanticResult),
    Graph(GraphConnection),
    Transcript(TranscriptResult),
    MultiHop(MultiHopPath),
    Keyword(KeywordMatch),
}

/// Result counts reported back to callers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalStats {
    pub semantic: usize,
    pub graph: usize,
    pub transcript: usize,
    pub multi_hop_paths: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_semantic_identity_checks_all_properties() {
        let result = SemanticResult {
            node_type: NodeType::Tag,
            metadata: json!({"keyword": "ontology"}).as_object().unwrap().clone(),
            similarity_score: 0.8,
        };
        assert_eq!(result.identity(), Some("ontology"));

        let blank = SemanticResult {
            node_type: NodeType::Talk,
            metadata: json!({"title": "  "}).as_object().unwrap().clone(),
            similarity_score: 0.1,
        };
        assert_eq!(blank.identity(), None);
    }

    #[test]
    fn test_path_render() {
        let path = MultiHopPath {
            nodes: vec![
                PathNode { node_type: NodeType::Speaker, name: "Jane Doe".into() },
                PathNode { node_type: NodeType::Talk, name: "Graphs".into() },
                PathNode { node_type: NodeType::Tag, name: "ontology".into() },
            ],
            relationship_types: vec!["GIVES_TALK".into(), "IS_DESCRIBED_BY".into()],
            length: 2,
        };
        assert_eq!(
            path.render(),
            "Jane Doe -[GIVES_TALK]- Graphs -[IS_DESCRIBED_BY]- ontology"
        );
    }

    #[test]
    fn test_tagged_result_serialization() {
        let result = RetrievalResult::MultiHop(MultiHopPath {
            nodes: vec![],
            relationship_types: vec![],
            length: 0,
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["kind"], "multi_hop");
    }
}
