//! Relationship types - typed, directed edges between nodes

use serde::{Deserialize, Serialize};

/// Relationship types produced by the ingestion pipeline
pub mod rel {
    pub const GIVES_TALK: &str = "GIVES_TALK";
    pub const IS_DESCRIBED_BY: &str = "IS_DESCRIBED_BY";
    pub const IS_PART_OF: &str = "IS_PART_OF";
    pub const IS_CATEGORIZED_AS: &str = "IS_CATEGORIZED_AS";
    pub const WORKS_FOR: &str = "WORKS_FOR";
    pub const MENTIONS: &str = "MENTIONS";
    pub const DISCUSSES: &str = "DISCUSSES";
    pub const BELONGS_TO: &str = "BELONGS_TO";
}

/// A directed edge in the talk graph. Traversal ignores direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    /// Key of the "from" node
    pub from_key: String,

    /// Key of the "to" node
    pub to_key: String,

    /// Relationship type, e.g. `GIVES_TALK`
    pub rel_type: String,

    #[serde(default)]
    pub properties: serde_json::Value,
}

impl Relationship {
    pub fn new(
        from_key: impl Into<String>,
        to_key: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            from_key: from_key.into(),
            to_key: to_key.into(),
            rel_type: rel_type.into(),
            properties: serde_json::Value::Null,
        }
    }

    /// The endpoint opposite `key`, if `key` is one of the endpoints
    pub fn other_end(&self, key: &str) -> Option<&str> {
        if self.from_key == key {
            Some(&self.to_key)
        } else if self.to_key == key {
            Some(&self.from_key)
        } else {
            None
        }
    }
}

/// Bounded number of hops for traversal queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "usize", into = "usize")]
pub struct HopLimit(usize);

impl HopLimit {
    pub const MIN: usize = 1;
    pub const MAX: usize = 4;

    /// Clamp any requested depth into the supported range
    pub fn new(hops: usize) -> Self {
        Self(hops.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for HopLimit {
    fn default() -> Self {
        Self(2)
    }
}

impl From<usize> for HopLimit {
    fn from(hops: usize) -> Self {
        HopLimit::new(hops)
    }
}

impl From<HopLimit> for usize {
    fn from(limit: HopLimit) -> Self {
        limit.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_end() {
        let rel = Relationship::new("speaker:jane doe", "talk:graphs", rel::GIVES_TALK);
        assert_eq!(rel.other_end("speaker:jane doe"), Some("talk:graphs"));
        assert_eq!(rel.other_end("talk:graphs"), Some("speaker:jane doe"));
        assert_eq!(rel.other_end("tag:x"), None);
    }

    #[test]
    fn test_hop_limit_clamps() {
        assert_eq!(HopLimit::new(0).get(), 1);
        assert_eq!(HopLimit::new(3).get(), 3);
        assert_eq!(HopLimit::new(99).get(), 4);
        assert_eq!(HopLimit::default().get(), 2);

        let parsed: HopLimit = serde_json::from_str("12").unwrap();
        assert_eq!(parsed.get(), 4);
    }
}
