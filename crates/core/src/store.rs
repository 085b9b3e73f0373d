//! Graph store abstraction
//!
//! Retrievers talk to the property graph only through [`GraphStore`], so the
//! SurrealDB repository and the in-memory test store are interchangeable.

use crate::node::{IdentityMatch, Node, NodeRef, NodeType};
use crate::relationship::{rel, Relationship};
use crate::retrieval::{CommunityMember, KeywordMatch};
use crate::transcript::{TalkRecord, TranscriptFilter};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum members returned for one community lookup
pub const COMMUNITY_MEMBER_LIMIT: usize = 20;

/// One edge seen from a node being expanded
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacent {
    /// Key of the expanded node
    pub origin: String,
    pub rel_type: String,
    /// Whether the edge points away from `origin`
    pub outgoing: bool,
    /// The node at the other end
    pub node: NodeRef,
}

/// Read access to the talk graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Resolve nodes whose name, title or keyword matches `needle`
    /// case-insensitively.
    async fn find_nodes(&self, needle: &str, mode: IdentityMatch) -> Result<Vec<NodeRef>>;

    /// Look up nodes by key. Unknown keys are skipped.
    async fn nodes_by_keys(&self, keys: &[String]) -> Result<Vec<NodeRef>>;

    /// Every edge touching a node in `keys`, in either direction, with the
    /// node at the other end. A self-loop is reported once.
    async fn neighbors(&self, keys: &[String]) -> Result<Vec<Adjacent>>;

    /// Talks with a non-empty transcript that pass `filter`, best
    /// [`TranscriptFilter::priority`] first, longer transcripts first
    /// within a priority.
    async fn search_transcripts(
        &self,
        filter: &TranscriptFilter,
        limit: usize,
    ) -> Result<Vec<TalkRecord>>;

    /// Talks whose title, description or category contains any keyword
    async fn search_talks_by_keyword(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<KeywordMatch>>;

    /// Other members of the community (via `BELONGS_TO`) that the node
    /// identified by `identity` belongs to.
    async fn community_members(&self, identity: &str) -> Result<Vec<CommunityMember>> {
        let seeds = self.find_nodes(identity, IdentityMatch::Exact).await?;
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let seed_keys: Vec<String> = seeds.iter().map(|n| n.key.clone()).collect();

        let mut communities: Vec<NodeRef> = Vec::new();
        for adj in self.neighbors(&seed_keys).await? {
            if adj.rel_type == rel::BELONGS_TO
                && adj.outgoing
                && adj.node.node_type == NodeType::Community
                && !communities.iter().any(|c| c.key == adj.node.key)
            {
                communities.push(adj.node);
            }
        }
        if communities.is_empty() {
            return Ok(Vec::new());
        }
        let community_keys: Vec<String> = communities.iter().map(|c| c.key.clone()).collect();

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for adj in self.neighbors(&community_keys).await? {
            if adj.rel_type != rel::BELONGS_TO
                || adj.outgoing
                || seed_keys.contains(&adj.node.key)
                || !seen.insert(adj.node.key.clone())
            {
                continue;
            }
            let Some(community) = communities.iter().find(|c| c.key == adj.origin) else {
                continue;
            };
            members.push(CommunityMember {
                node_type: adj.node.node_type,
                name: adj.node.display_name(),
                community_id: community.display_name(),
            });
            if members.len() >= COMMUNITY_MEMBER_LIMIT {
                break;
            }
        }
        Ok(members)
    }
}

/// A serialized graph: the interchange format for imports and fixtures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl GraphSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate every node, filling in missing keys
    pub fn validated(self) -> Result<Self> {
        let nodes = self
            .nodes
            .into_iter()
            .map(Node::validate)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            nodes,
            relationships: self.relationships,
        })
    }
}

/// Assemble a [`TalkRecord`] from a talk node and its neighbors
pub fn talk_record(talk: &Node, speakers: Vec<String>, tags: Vec<String>) -> TalkRecord {
    TalkRecord {
        key: talk.key.clone(),
        title: talk.identity().unwrap_or("Unknown").to_string(),
        description: talk.description.clone(),
        category: talk.category.clone(),
        transcript: talk.transcript.clone().unwrap_or_default(),
        segments: talk.transcript_segments.clone(),
        youtube_id: talk.youtube_id.clone(),
        url: talk.url.clone(),
        speakers,
        tags,
    }
}
