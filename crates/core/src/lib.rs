//! Core domain types for TalkGraph
//!
//! This crate defines the fundamental data structures used throughout
//! the application: graph nodes and relationships, transcript segments,
//! retrieval results, conversation turns, and the [`GraphStore`] trait the
//! retrievers query through.

pub mod conversation;
pub mod error;
pub mod node;
pub mod relationship;
pub mod retrieval;
pub mod store;
pub mod transcript;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use conversation::{parse_history, ConversationTurn, MessageRole};
pub use error::{CoreError, Result};
pub use node::{IdentityMatch, Node, NodeRef, NodeType};
pub use relationship::{rel, HopLimit, Relationship};
pub use retrieval::{
    CommunityMember, GraphConnection, KeywordMatch, MultiHopPath, PathNode, RetrievalResult,
    RetrievalStats, SemanticResult, TranscriptResult,
};
pub use store::{Adjacent, GraphSnapshot, GraphStore};
pub use transcript::{TalkRecord, TranscriptFilter, TranscriptSegment};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryGraphStore;
