//! Node types - speakers, talks, tags and the other graph entities

use crate::transcript::TranscriptSegment;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// The label of a node in the talk graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Speaker,
    Talk,
    Tag,
    Event,
    Category,
    Organization,
    Product,
    Concept,
    Community,
    /// Any label this engine does not know about
    Unknown,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Speaker => "Speaker",
            NodeType::Talk => "Talk",
            NodeType::Tag => "Tag",
            NodeType::Event => "Event",
            NodeType::Category => "Category",
            NodeType::Organization => "Organization",
            NodeType::Product => "Product",
            NodeType::Concept => "Concept",
            NodeType::Community => "Community",
            NodeType::Unknown => "Unknown",
        }
    }

    /// Parse a label case-insensitively
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "speaker" => NodeType::Speaker,
            "talk" => NodeType::Talk,
            "tag" => NodeType::Tag,
            "event" => NodeType::Event,
            "category" => NodeType::Category,
            "organization" | "organisation" => NodeType::Organization,
            "product" => NodeType::Product,
            "concept" => NodeType::Concept,
            "community" => NodeType::Community,
            _ => NodeType::Unknown,
        }
    }
}

impl From<String> for NodeType {
    fn from(label: String) -> Self {
        NodeType::from_label(&label)
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pick the populated identity property, checking all three.
pub fn identity_of<'a>(
    name: Option<&'a str>,
    title: Option<&'a str>,
    keyword: Option<&'a str>,
) -> Option<&'a str> {
    name.or(title)
        .or(keyword)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A node as stored in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable key used by relationships (`<type>:<canonical identity>`)
    #[serde(default)]
    pub key: String,

    pub node_type: NodeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Full transcript text (talks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Time-coded transcript segments (talks only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript_segments: Vec<TranscriptSegment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Anything else the ingestion pipeline attached
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl Node {
    fn bare(node_type: NodeType) -> Self {
        Self {
            key: String::new(),
            node_type,
            name: None,
            title: None,
            keyword: None,
            description: None,
            category: None,
            transcript: None,
            transcript_segments: Vec::new(),
            youtube_id: None,
            url: None,
            properties: serde_json::Value::Null,
        }
    }

    /// A node identified by `name` (speakers, organizations, ...)
    pub fn named(node_type: NodeType, name: impl Into<String>) -> Self {
        let mut node = Self::bare(node_type);
        node.name = Some(name.into());
        node.key = node.derive_key();
        node
    }

    /// A node identified by `title` (talks)
    pub fn titled(node_type: NodeType, title: impl Into<String>) -> Self {
        let mut node = Self::bare(node_type);
        node.title = Some(title.into());
        node.key = node.derive_key();
        node
    }

    /// A node identified by `keyword` (tags)
    pub fn keyword(node_type: NodeType, keyword: impl Into<String>) -> Self {
        let mut node = Self::bare(node_type);
        node.keyword = Some(keyword.into());
        node.key = node.derive_key();
        node
    }

    /// Builder: set transcript text and segments
    pub fn with_transcript(
        mut self,
        transcript: impl Into<String>,
        segments: Vec<TranscriptSegment>,
    ) -> Self {
        self.transcript = Some(transcript.into());
        self.transcript_segments = segments;
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set the platform video id
    pub fn with_youtube_id(mut self, youtube_id: impl Into<String>) -> Self {
        self.youtube_id = Some(youtube_id.into());
        self
    }

    /// Builder: set a generic video url
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn identity(&self) -> Option<&str> {
        identity_of(
            self.name.as_deref(),
            self.title.as_deref(),
            self.keyword.as_deref(),
        )
    }

    /// Canonicalize an identity for keys and comparisons
    pub fn canonicalize(value: &str) -> String {
        value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn derive_key(&self) -> String {
        let identity = self.identity().map(Self::canonicalize).unwrap_or_default();
        format!("{}:{}", self.node_type.as_str().to_lowercase(), identity)
    }

    /// Check that exactly one identity property is populated, filling in
    /// the key when it is missing.
    pub fn validate(mut self) -> Result<Self> {
        let populated = [&self.name, &self.title, &self.keyword]
            .iter()
            .filter(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
            .count();

        match populated {
            0 => {
                return Err(CoreError::MalformedEntity(format!(
                    "{} node has no name, title or keyword",
                    self.node_type
                )))
            }
            1 => {}
            _ => {
                return Err(CoreError::MalformedEntity(format!(
                    "{} node has more than one identity property",
                    self.node_type
                )))
            }
        }

        if self.key.trim().is_empty() {
            self.key = self.derive_key();
        }
        Ok(self)
    }

    /// Lightweight reference used in traversal results
    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            key: self.key.clone(),
            node_type: self.node_type,
            name: self.name.clone(),
            title: self.title.clone(),
            keyword: self.keyword.clone(),
        }
    }
}

/// How a search string is matched against identity properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMatch {
    /// Case-insensitive equality
    Exact,
    /// Case-insensitive equality or substring
    Contains,
}

/// A node's key, label and identity properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    pub key: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl NodeRef {
    pub fn identity(&self) -> Option<&str> {
        identity_of(
            self.name.as_deref(),
            self.title.as_deref(),
            self.keyword.as_deref(),
        )
    }

    pub fn display_name(&self) -> String {
        self.identity().unwrap_or("Unknown").to_string()
    }

    /// Match `needle` against all three identity properties
    pub fn matches(&self, needle: &str, mode: IdentityMatch) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        [&self.name, &self.title, &self.keyword]
            .iter()
            .filter_map(|v| v.as_deref())
            .map(str::to_lowercase)
            .any(|value| match mode {
                IdentityMatch::Exact => value == needle,
                IdentityMatch::Contains => value == needle || value.contains(&needle),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_keys() {
        let speaker = Node::named(NodeType::Speaker, "Jane  Doe");
        assert_eq!(speaker.key, "speaker:jane doe");

        let tag = Node::keyword(NodeType::Tag, "Knowledge Graphs");
        assert_eq!(tag.key, "tag:knowledge graphs");
        assert_eq!(tag.identity(), Some("Knowledge Graphs"));
    }

    #[test]
    fn test_validate_rejects_ambiguous_identity() {
        let mut node = Node::named(NodeType::Talk, "Graph Thinking");
        node.title = Some("Graph Thinking".into());
        assert!(matches!(node.validate(), Err(CoreError::MalformedEntity(_))));

        let mut empty = Node::named(NodeType::Tag, "x");
        empty.name = None;
        assert!(matches!(empty.validate(), Err(CoreError::MalformedEntity(_))));
    }

    #[test]
    fn test_validate_fills_missing_key() {
        let node: Node =
            serde_json::from_str(r#"{"node_type": "talk", "title": "Graph Thinking"}"#).unwrap();
        let node = node.validate().unwrap();
        assert_eq!(node.node_type, NodeType::Talk);
        assert_eq!(node.key, "talk:graph thinking");
    }

    #[test]
    fn test_identity_matching_checks_all_properties() {
        let node = Node::keyword(NodeType::Tag, "Semantic Web").to_ref();
        assert!(node.matches("semantic web", IdentityMatch::Exact));
        assert!(!node.matches("semantic", IdentityMatch::Exact));
        assert!(node.matches("SEMANTIC", IdentityMatch::Contains));
        assert!(!node.matches("  ", IdentityMatch::Contains));
    }

    #[test]
    fn test_unknown_label() {
        assert_eq!(NodeType::from_label("Venue"), NodeType::Unknown);
        assert_eq!(String::from(NodeType::Organization), "Organization");
    }
}
