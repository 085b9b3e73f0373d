//! Common test utilities

use talkgraph_core::GraphSnapshot;
use talkgraph_db::{init_memory, Repository};

pub const TALK_GRAPH: &str = include_str!("../fixtures/talk_graph.json");

/// Create a test repository with in-memory database
pub async fn create_test_repo() -> Repository {
    let db = init_memory().await.expect("Failed to create test database");
    Repository::new(db)
}

/// A repository loaded with the talk graph fixture
pub async fn seeded_repo() -> Repository {
    let repo = create_test_repo().await;
    let snapshot = GraphSnapshot::from_json(TALK_GRAPH).expect("fixture parses");
    repo.import_snapshot(snapshot)
        .await
        .expect("fixture imports");
    repo
}
