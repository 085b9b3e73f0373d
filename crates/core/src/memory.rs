//! In-memory [`GraphStore`] for tests

use crate::node::{IdentityMatch, Node, NodeRef, NodeType};
use crate::relationship::{rel, Relationship};
use crate::retrieval::KeywordMatch;
use crate::store::{talk_record, Adjacent, GraphSnapshot, GraphStore};
use crate::transcript::{TalkRecord, TranscriptFilter};
use crate::Result;
use async_trait::async_trait;

/// A graph held in two vectors. Lookups are linear scans.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            nodes: snapshot.nodes,
            relationships: snapshot.relationships,
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a relationship, inserting either endpoint not yet present
    pub fn with_edge(mut self, from: &Node, rel_type: &str, to: &Node) -> Self {
        for end in [from, to] {
            if self.node(&end.key).is_none() {
                self.nodes.push(end.clone());
            }
        }
        self.relationships
            .push(Relationship::new(&from.key, &to.key, rel_type));
        self
    }

    fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }

    fn linked(&self, talk_key: &str, rel_type: &str, node_type: NodeType) -> Vec<String> {
        self.relationships
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .filter_map(|r| r.other_end(talk_key))
            .filter_map(|key| self.node(key))
            .filter(|n| n.node_type == node_type)
            .filter_map(|n| n.identity().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn find_nodes(&self, needle: &str, mode: IdentityMatch) -> Result<Vec<NodeRef>> {
        Ok(self
            .nodes
            .iter()
            .map(Node::to_ref)
            .filter(|n| n.matches(needle, mode))
            .collect())
    }

    async fn nodes_by_keys(&self, keys: &[String]) -> Result<Vec<NodeRef>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.node(k))
            .map(Node::to_ref)
            .collect())
    }

    async fn neighbors(&self, keys: &[String]) -> Result<Vec<Adjacent>> {
        let mut adjacent = Vec::new();
        for r in &self.relationships {
            for origin in keys {
                let (other, outgoing) = if &r.from_key == origin {
                    (&r.to_key, true)
                } else if &r.to_key == origin {
                    (&r.from_key, false)
                } else {
                    continue;
                };
                let Some(node) = self.node(other) else {
                    continue;
                };
                adjacent.push(Adjacent {
                    origin: origin.clone(),
                    rel_type: r.rel_type.clone(),
                    outgoing,
                    node: node.to_ref(),
                });
            }
        }
        Ok(adjacent)
    }

    async fn search_transcripts(
        &self,
        filter: &TranscriptFilter,
        limit: usize,
    ) -> Result<Vec<TalkRecord>> {
        let mut talks: Vec<TalkRecord> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Talk)
            .map(|talk| {
                talk_record(
                    talk,
                    self.linked(&talk.key, rel::GIVES_TALK, NodeType::Speaker),
                    self.linked(&talk.key, rel::IS_DESCRIBED_BY, NodeType::Tag),
                )
            })
            .filter(|talk| filter.matches(talk))
            .collect();
        talks.sort_by_key(|talk| (filter.priority(talk), std::cmp::Reverse(talk.transcript.chars().count())));
        talks.truncate(limit);
        Ok(talks)
    }

    async fn search_talks_by_keyword(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<KeywordMatch>> {
        let hit = |field: &Option<String>| {
            field.as_deref().is_some_and(|value| {
                let value = value.to_lowercase();
                keywords.iter().any(|kw| value.contains(kw.as_str()))
            })
        };

        Ok(self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Talk)
            .filter(|n| hit(&n.title) || hit(&n.description) || hit(&n.category))
            .take(limit)
            .map(|talk| {
                let mut tags = self.linked(&talk.key, rel::IS_DESCRIBED_BY, NodeType::Tag);
                tags.truncate(5);
                KeywordMatch {
                    title: talk.identity().unwrap_or("Unknown").to_string(),
                    description: talk.description.clone(),
                    category: talk.category.clone(),
                    speaker: self
                        .linked(&talk.key, rel::GIVES_TALK, NodeType::Speaker)
                        .into_iter()
                        .next(),
                    tags,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryGraphStore {
        let jane = Node::named(NodeType::Speaker, "Jane Doe");
        let talk = Node::titled(NodeType::Talk, "Graph Thinking")
            .with_description("Thinking in graphs")
            .with_transcript("We think in graphs.", vec![]);
        let silent = Node::titled(NodeType::Talk, "No Transcript");
        let tag = Node::keyword(NodeType::Tag, "graphs");
        let community = Node::named(NodeType::Community, "7");

        MemoryGraphStore::new()
            .with_node(jane.clone())
            .with_node(talk.clone())
            .with_node(silent.clone())
            .with_node(tag.clone())
            .with_node(community.clone())
            .with_edge(&jane, rel::GIVES_TALK, &talk)
            .with_edge(&talk, rel::IS_DESCRIBED_BY, &tag)
            .with_edge(&jane, rel::BELONGS_TO, &community)
            .with_edge(&tag, rel::BELONGS_TO, &community)
            .with_edge(&talk, rel::BELONGS_TO, &community)
    }

    #[tokio::test]
    async fn test_search_transcripts_skips_empty() {
        let talks = store()
            .search_transcripts(&TranscriptFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(talks.len(), 1);
        assert_eq!(talks[0].title, "Graph Thinking");
        assert_eq!(talks[0].speakers, vec!["Jane Doe"]);
        assert_eq!(talks[0].tags, vec!["graphs"]);
    }

    #[tokio::test]
    async fn test_neighbors_both_directions() {
        let adjacent = store().neighbors(&["talk:graph thinking".to_string()]).await.unwrap();
        assert_eq!(adjacent.len(), 3);

        let speaker = adjacent.iter().find(|a| a.rel_type == rel::GIVES_TALK).unwrap();
        assert!(!speaker.outgoing);
        assert_eq!(speaker.node.display_name(), "Jane Doe");
        assert!(adjacent.iter().filter(|a| a.rel_type != rel::GIVES_TALK).all(|a| a.outgoing));
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let hits = store()
            .search_talks_by_keyword(&["thinking".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].speaker.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_community_members_excludes_self() {
        let members = store().community_members("jane doe").await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["graphs", "Graph Thinking"]);
        assert!(members.iter().all(|m| m.community_id == "7"));
    }

    #[tokio::test]
    async fn test_community_members_unknown_node() {
        assert!(store().community_members("nobody").await.unwrap().is_empty());
    }
}
