//! Integration tests for the SurrealDB graph store

mod common;

use common::{create_test_repo, seeded_repo};
use talkgraph_core::{GraphSnapshot, GraphStore, IdentityMatch, NodeType, TranscriptFilter};

#[tokio::test]
async fn test_import_and_stats() {
    let repo = seeded_repo().await;
    let stats = repo.get_stats().await.expect("stats");

    assert_eq!(stats.total_nodes, 9);
    assert_eq!(stats.nodes_by_type.get("Talk"), Some(&3));
    assert_eq!(stats.nodes_by_type.get("Speaker"), Some(&2));
    assert_eq!(stats.relationships, 10);
    assert_eq!(stats.talks_with_transcripts, 2);
    assert_eq!(stats.youtube_videos, 1);
    assert_eq!(stats.communities, 1);
}

#[tokio::test]
async fn test_import_is_repeatable_for_nodes() {
    let repo = seeded_repo().await;
    let snapshot = GraphSnapshot::from_json(common::TALK_GRAPH).unwrap();
    let nodes_only = GraphSnapshot {
        nodes: snapshot.nodes,
        relationships: vec![],
    };
    let summary = repo.import_snapshot(nodes_only).await.unwrap();
    assert_eq!(summary.nodes, 9);
    assert_eq!(repo.get_stats().await.unwrap().total_nodes, 9);
}

#[tokio::test]
async fn test_find_nodes_modes() {
    let repo = seeded_repo().await;

    let exact = repo.find_nodes("GRAPH THINKING", IdentityMatch::Exact).await.unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].node_type, NodeType::Talk);

    let contains = repo.find_nodes("graph", IdentityMatch::Contains).await.unwrap();
    let mut names: Vec<_> = contains.iter().map(|n| n.display_name()).collect();
    names.sort();
    assert_eq!(names, vec!["Graph Thinking", "graphs"]);
}

#[tokio::test]
async fn test_neighbors_follow_edges_both_ways() {
    let repo = seeded_repo().await;
    let adjacent = repo.neighbors(&["tag:graphs".to_string()]).await.unwrap();
    // two talks point at the tag, the tag points at the community
    assert_eq!(adjacent.len(), 3);
    let outgoing: Vec<_> = adjacent.iter().filter(|a| a.outgoing).collect();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].node.key, "community:c1");
    assert!(adjacent.iter().all(|a| a.origin == "tag:graphs"));
}

#[tokio::test]
async fn test_neighbors_of_two_endpoints_report_edge_twice() {
    let repo = seeded_repo().await;
    let keys = vec!["speaker:jane doe".to_string(), "talk:graph thinking".to_string()];
    let gives: Vec<_> = repo
        .neighbors(&keys)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.rel_type == "GIVES_TALK")
        .collect();
    assert_eq!(gives.len(), 2);
    assert!(gives.iter().any(|a| a.origin == "speaker:jane doe" && a.outgoing));
    assert!(gives.iter().any(|a| a.origin == "talk:graph thinking" && !a.outgoing));
}

#[tokio::test]
async fn test_search_transcripts_presence_only() {
    let repo = seeded_repo().await;
    let talks = repo
        .search_transcripts(&TranscriptFilter::new("", &[], &[]), 10)
        .await
        .unwrap();

    // longest transcript first when priorities tie
    let titles: Vec<_> = talks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Graph Thinking", "Semantic Layers"]);
    assert_eq!(talks[0].speakers, vec!["Jane Doe"]);
    assert_eq!(talks[0].tags, vec!["graphs"]);
    assert_eq!(talks[0].segments.len(), 3);
    assert_eq!(talks[0].youtube_id.as_deref(), Some("abcdefghijk"));

    let mut tags = talks[1].tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["graphs", "ontology"]);
}

#[tokio::test]
async fn test_search_transcripts_filters_in_the_query() {
    let repo = seeded_repo().await;
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    let by_speaker = repo
        .search_transcripts(&TranscriptFilter::new("x", &strings(&["John"]), &[]), 10)
        .await
        .unwrap();
    assert_eq!(by_speaker.len(), 1);
    assert_eq!(by_speaker[0].title, "Semantic Layers");

    let speaker_and_keyword = repo
        .search_transcripts(
            &TranscriptFilter::new("x", &strings(&["Jane Doe"]), &strings(&["ontologies"])),
            10,
        )
        .await
        .unwrap();
    assert!(speaker_and_keyword.is_empty());

    let by_keyword = repo
        .search_transcripts(&TranscriptFilter::new("x", &[], &strings(&["ontologies", "explicit"])), 10)
        .await
        .unwrap();
    assert_eq!(by_keyword.len(), 2);
}

#[tokio::test]
async fn test_search_transcripts_ranks_title_match_first_and_limits() {
    let repo = seeded_repo().await;
    let talks = repo
        .search_transcripts(&TranscriptFilter::new("Semantic Layers", &[], &[]), 1)
        .await
        .unwrap();
    assert_eq!(talks.len(), 1);
    assert_eq!(talks[0].title, "Semantic Layers");
}

#[tokio::test]
async fn test_keyword_search() {
    let repo = seeded_repo().await;
    let hits = repo
        .search_talks_by_keyword(&["catalogs".to_string(), "ontologies".to_string()], 10)
        .await
        .unwrap();

    let mut titles: Vec<_> = hits.iter().map(|h| h.title.clone()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Catalog Basics", "Semantic Layers"]);
    assert!(hits.iter().all(|h| h.speaker.as_deref() == Some("John Smith")));
}

#[tokio::test]
async fn test_community_members() {
    let repo = seeded_repo().await;
    let members = repo.community_members("Jane Doe").await.unwrap();

    let mut names: Vec<_> = members.iter().map(|m| m.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["Graph Thinking", "graphs"]);
    assert!(members.iter().all(|m| m.community_id == "c1"));

    assert!(repo.community_members("John Smith").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_store() {
    let repo = create_test_repo().await;
    assert!(repo
        .search_transcripts(&TranscriptFilter::default(), 10)
        .await
        .unwrap()
        .is_empty());
    assert!(repo
        .find_nodes("anything", IdentityMatch::Contains)
        .await
        .unwrap()
        .is_empty());
}
