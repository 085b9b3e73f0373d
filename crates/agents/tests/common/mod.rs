//! Shared fixtures: a seeded in-memory SurrealDB graph with its vector
//! index, a bag-of-words embedder, scripted generators and stores that
//! fail or stall on purpose.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkgraph_agents::{
    AgentError, EngineConfig, Embedder, GenerationRequest, Generator, Orchestrator, Result,
};
use talkgraph_core::{
    Adjacent, CoreError, GraphSnapshot, GraphStore, IdentityMatch, KeywordMatch, Node, NodeRef,
    NodeType, TalkRecord, TranscriptFilter,
};
use talkgraph_db::{init_memory, EmbeddingRecord, IndexKind, Repository, VectorIndex};

pub const TALK_GRAPH: &str = include_str!("../../../db/tests/fixtures/talk_graph.json");

const DIMENSION: usize = 512;

/// Hashes each lowercase word into one of `DIMENSION` buckets
pub struct WordEmbedder;

fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

pub fn embed_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        vector[bucket(&word.to_lowercase())] += 1.0;
    }
    // keep the vector non-zero for texts with no words
    vector[0] += 0.01;
    vector
}

#[async_trait]
impl Embedder for WordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_words(text))
    }
}

/// Returns a fixed answer and remembers every request
#[derive(Default)]
pub struct RecordingGenerator {
    pub requests: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        Ok("stub answer".to_string())
    }
}

/// Embeds like [`WordEmbedder`], after a delay
pub struct SlowEmbedder(pub Duration);

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.0).await;
        Ok(embed_words(text))
    }
}

/// Answers after a delay
pub struct SlowGenerator(pub Duration);

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("late answer".to_string())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(AgentError::Generation("model offline".into()))
    }
}

fn fixture() -> GraphSnapshot {
    GraphSnapshot::from_json(TALK_GRAPH)
        .and_then(GraphSnapshot::validated)
        .expect("fixture parses")
}

pub async fn seeded_repo() -> Repository {
    let db = init_memory().await.expect("Failed to create test database");
    let repo = Repository::new(db);
    repo.import_snapshot(fixture()).await.expect("fixture imports");
    repo
}

fn metadata(node: &Node, speakers: &[&str]) -> Map<String, Value> {
    let identity = node.identity().unwrap_or_default();
    let field = match node.node_type {
        NodeType::Talk => "title",
        NodeType::Tag => "keyword",
        _ => "name",
    };
    let mut meta = Map::new();
    meta.insert(field.to_string(), json!(identity));
    if let Some(description) = &node.description {
        meta.insert("description".into(), json!(description));
    }
    if let Some(category) = &node.category {
        meta.insert("category".into(), json!(category));
    }
    if let Some(speaker) = speakers.first() {
        meta.insert("speaker".into(), json!(speaker));
    }
    meta
}

/// Node lookups work; transcript and adjacency queries fail
pub struct BrokenStore(pub Repository);

fn offline() -> CoreError {
    CoreError::Store("graph store offline".into())
}

#[async_trait]
impl GraphStore for BrokenStore {
    async fn find_nodes(
        &self,
        needle: &str,
        mode: IdentityMatch,
    ) -> talkgraph_core::Result<Vec<NodeRef>> {
        self.0.find_nodes(needle, mode).await
    }

    async fn nodes_by_keys(&self, keys: &[String]) -> talkgraph_core::Result<Vec<NodeRef>> {
        self.0.nodes_by_keys(keys).await
    }

    async fn neighbors(&self, _keys: &[String]) -> talkgraph_core::Result<Vec<Adjacent>> {
        Err(offline())
    }

    async fn search_transcripts(
        &self,
        _filter: &TranscriptFilter,
        _limit: usize,
    ) -> talkgraph_core::Result<Vec<TalkRecord>> {
        Err(offline())
    }

    async fn search_talks_by_keyword(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> talkgraph_core::Result<Vec<KeywordMatch>> {
        self.0.search_talks_by_keyword(keywords, limit).await
    }
}

/// A flat index over every fixture node, embedded by identity, stored in
/// the repository's own database
pub async fn fixture_index(repo: &Repository) -> VectorIndex {
    let snapshot = fixture();
    let speaker_of = |node: &Node| -> Vec<&'static str> {
        match node.identity() {
            Some("Graph Thinking") => vec!["Jane Doe"],
            Some("Semantic Layers") | Some("Catalog Basics") => vec!["John Smith"],
            _ => vec![],
        }
    };
    let (embeddings, mapping): (Vec<Vec<f32>>, Vec<EmbeddingRecord>) = snapshot
        .nodes
        .iter()
        .filter(|n| n.node_type != NodeType::Community)
        .map(|n| {
            (
                embed_words(n.identity().unwrap_or_default()),
                EmbeddingRecord {
                    node_type: n.node_type,
                    metadata: metadata(n, &speaker_of(n)),
                },
            )
        })
        .unzip();

    let index = VectorIndex::new(repo.connection().clone());
    index
        .build(embeddings, mapping, IndexKind::Flat)
        .await
        .expect("index builds");
    index
}

/// Orchestrator over the seeded graph; `indexed` builds the vector index
pub async fn orchestrator_with(generator: Arc<dyn Generator>, indexed: bool) -> Orchestrator {
    let repo = seeded_repo().await;
    let index = if indexed {
        fixture_index(&repo).await
    } else {
        VectorIndex::new(repo.connection().clone())
    };
    Orchestrator::new(
        Arc::new(repo),
        Arc::new(WordEmbedder),
        generator,
        Arc::new(index),
        EngineConfig::default(),
    )
}
