//! End-to-end query orchestration over the SurrealDB talk graph

mod common;

use common::{
    fixture_index, orchestrator_with, seeded_repo, BrokenStore, FailingGenerator,
    RecordingGenerator, SlowEmbedder, SlowGenerator, WordEmbedder,
};
use std::sync::Arc;
use std::time::Duration;
use talkgraph_agents::context::{COMMUNITY_HEADER, TRANSCRIPT_HEADER};
use talkgraph_agents::{EngineConfig, Orchestrator, QueryRequest, QueryResponse, QueryType};
use talkgraph_core::ConversationTurn;

#[tokio::test]
async fn test_hybrid_question_collects_quotes_and_connections() {
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = orchestrator_with(generator.clone(), true).await;

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert_eq!(outcome.query_type, QueryType::Hybrid);
    assert_eq!(outcome.answer, "stub answer");
    assert!(outcome.error.is_none());
    assert!(outcome.degraded.is_empty());

    assert!(outcome
        .semantic_results
        .iter()
        .any(|r| r.identity() == Some("Graph Thinking")));
    let quote = &outcome.transcript_results[0];
    assert_eq!(quote.title, "Graph Thinking");
    assert_eq!(quote.timestamp.as_deref(), Some("00:05"));
    assert_eq!(
        quote.video_link.as_deref(),
        Some("https://www.youtube.com/watch?v=abcdefghijk&t=5s")
    );
    assert!(!outcome.graph_results.is_empty());
    assert!(outcome
        .graph_results
        .windows(2)
        .all(|w| w[0].path_length <= w[1].path_length));

    assert!(outcome.confidence >= 0.6 && outcome.confidence <= 1.0);
    assert!(outcome.context.contains(TRANSCRIPT_HEADER.trim()));
    assert!(outcome.context.contains(COMMUNITY_HEADER.trim()));

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains(&outcome.context));
    assert!(requests[0]
        .prompt
        .contains("Question: What did Jane Doe say about graph thinking?"));
}

#[tokio::test]
async fn test_follow_up_resolves_pronoun_from_history() {
    let orchestrator =
        orchestrator_with(Arc::new(RecordingGenerator::default()), true).await;
    let history = vec![
        ConversationTurn::user("Who gave Graph Thinking?"),
        ConversationTurn::assistant("Jane Doe gave it."),
    ];

    let outcome = orchestrator
        .query("What did he say about connections?", None, &history)
        .await;

    assert_eq!(outcome.query_type, QueryType::Hybrid);
    assert_eq!(outcome.transcript_results.len(), 1);
    assert_eq!(outcome.transcript_results[0].title, "Graph Thinking");
    assert!(outcome.transcript_results[0].snippet.contains("connections"));
}

#[tokio::test]
async fn test_generator_sees_at_most_six_turns() {
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = orchestrator_with(generator.clone(), true).await;
    let history: Vec<ConversationTurn> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("question {}", i))
            } else {
                ConversationTurn::assistant(format!("answer {}", i))
            }
        })
        .collect();

    orchestrator
        .query("Which talks discuss ontologies?", None, &history)
        .await;

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests[0].history.len(), 6);
    assert_eq!(requests[0].history[0].content, "question 4");
}

#[tokio::test]
async fn test_multi_hop_finds_path_between_entities() {
    let orchestrator =
        orchestrator_with(Arc::new(RecordingGenerator::default()), true).await;

    let outcome = orchestrator
        .query("How is Jane Doe related to Acme Labs?", Some(3), &[])
        .await;

    assert_eq!(outcome.query_type, QueryType::MultiHop);
    assert!(!outcome.multi_hop_paths.is_empty());
    assert_eq!(outcome.multi_hop_paths[0].length, 1);
    assert_eq!(outcome.multi_hop_paths[0].relationship_types, vec!["WORKS_FOR"]);
    assert!(outcome.context.contains("=== Connection Paths ==="));
}

#[tokio::test]
async fn test_pre_assigned_type_skips_classification() {
    let orchestrator =
        orchestrator_with(Arc::new(RecordingGenerator::default()), true).await;

    let request = QueryRequest::new("What did Jane Doe say about graph thinking?")
        .with_query_type(QueryType::Semantic);
    let outcome = orchestrator.run(request).await;

    assert_eq!(outcome.query_type, QueryType::Semantic);
    assert!(!outcome.semantic_results.is_empty());
    assert!(outcome.transcript_results.is_empty());
    assert!(outcome.graph_results.is_empty());
}

#[tokio::test]
async fn test_generation_failure_keeps_evidence() {
    let orchestrator = orchestrator_with(Arc::new(FailingGenerator), true).await;

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert!(outcome.answer.is_empty());
    assert!(outcome.error.as_deref().unwrap().contains("model offline"));
    assert!(!outcome.transcript_results.is_empty());

    let response = QueryResponse::from(&outcome);
    assert!(response.error.is_some());
    assert_eq!(response.retrieval_stats, outcome.retrieval_stats());
}

#[tokio::test]
async fn test_missing_index_keeps_other_sources() {
    let generator = Arc::new(RecordingGenerator::default());
    let orchestrator = orchestrator_with(generator.clone(), false).await;
    assert!(!orchestrator.is_ready().await);

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert!(outcome.semantic_results.is_empty());
    assert_eq!(outcome.transcript_results[0].title, "Graph Thinking");
    assert_eq!(outcome.transcript_results[0].timestamp.as_deref(), Some("00:05"));
    assert!(outcome
        .graph_results
        .iter()
        .any(|c| c.source_identity == "Jane Doe"));
    assert!(outcome.confidence > 0.0);
    assert_eq!(outcome.answer, "stub answer");
    assert!(outcome.error.is_none());

    assert_eq!(outcome.degraded.len(), 1);
    assert!(outcome.degraded[0].starts_with("semantic: "));
    assert!(outcome.degraded[0].contains("vector index is not loaded"));
    assert_eq!(QueryResponse::from(&outcome).degraded, outcome.degraded);
}

#[tokio::test]
async fn test_failing_store_keeps_semantic_hits() {
    let repo = seeded_repo().await;
    let index = fixture_index(&repo).await;
    let orchestrator = Orchestrator::new(
        Arc::new(BrokenStore(repo)),
        Arc::new(WordEmbedder),
        Arc::new(RecordingGenerator::default()),
        Arc::new(index),
        EngineConfig::default(),
    );

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert_eq!(outcome.query_type, QueryType::Hybrid);
    assert!(outcome
        .semantic_results
        .iter()
        .any(|r| r.identity() == Some("Graph Thinking")));
    assert!(outcome.transcript_results.is_empty());
    assert!(outcome.graph_results.is_empty());
    assert_eq!(outcome.answer, "stub answer");

    let sources: Vec<&str> = outcome
        .degraded
        .iter()
        .filter_map(|d| d.split(':').next())
        .collect();
    assert_eq!(sources, vec!["transcript", "graph"]);
    assert!(outcome.degraded.iter().all(|d| d.contains("graph store offline")));
}

#[tokio::test]
async fn test_slow_embedder_times_out_without_losing_transcripts() {
    let repo = seeded_repo().await;
    let index = fixture_index(&repo).await;
    let config = EngineConfig {
        call_timeout: Duration::from_millis(500),
        ..EngineConfig::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::new(repo),
        Arc::new(SlowEmbedder(Duration::from_secs(10))),
        Arc::new(RecordingGenerator::default()),
        Arc::new(index),
        config,
    );

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert!(outcome.semantic_results.is_empty());
    assert_eq!(outcome.transcript_results[0].title, "Graph Thinking");
    assert_eq!(outcome.answer, "stub answer");
    assert!(outcome
        .degraded
        .iter()
        .any(|d| d.starts_with("semantic: query embedding timed out")));
}

#[tokio::test]
async fn test_slow_generation_reports_timeout() {
    let repo = seeded_repo().await;
    let index = fixture_index(&repo).await;
    let config = EngineConfig {
        generation_timeout: Duration::from_millis(100),
        ..EngineConfig::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::new(repo),
        Arc::new(WordEmbedder),
        Arc::new(SlowGenerator(Duration::from_secs(10))),
        Arc::new(index),
        config,
    );

    let outcome = orchestrator
        .query("What did Jane Doe say about graph thinking?", None, &[])
        .await;

    assert!(outcome.answer.is_empty());
    let error = outcome.error.as_deref().unwrap();
    assert!(error.starts_with("answer generation timed out"), "{}", error);
    assert!(!outcome.transcript_results.is_empty());
    assert!(outcome.degraded.is_empty());
}

#[tokio::test]
async fn test_response_serializes_snake_case_type() {
    let orchestrator =
        orchestrator_with(Arc::new(RecordingGenerator::default()), true).await;
    let outcome = orchestrator
        .query("How is Jane Doe related to Acme Labs?", None, &[])
        .await;

    let json = serde_json::to_value(QueryResponse::from(&outcome)).unwrap();
    assert_eq!(json["query_type"], "multi_hop");
    assert!(json["sources"]["semantic"].as_array().unwrap().len() <= 3);
    assert!(json.get("error").is_none());
}
