//! Query orchestration
//!
//! A request walks a small state machine:
//!
//! ```text
//! RouteQuery -> SemanticSearch | GraphSearch | MultiHopReasoning | HybridSearch
//!            -> GenerateAnswer -> End
//! ```
//!
//! Strategy steps only ever append to the request's [`QueryState`]. Each
//! retrieval source inside a strategy fails on its own: the error is logged,
//! recorded in `degraded`, and the other sources still contribute. Answer
//! generation runs regardless.

use crate::classifier::{classify_with, ClassifierRule, QueryType, DEFAULT_RULES};
use crate::config::EngineConfig;
use crate::context::{assemble, build_prompt, Evidence};
use crate::error::{bounded, AgentError, Result};
use crate::expansion::{QueryExpansion, DEFAULT_HISTORY_WINDOW, MULTI_HOP_HISTORY_WINDOW};
use crate::graph::GraphRetriever;
use crate::inference::{Embedder, GenerationRequest, Generator};
use crate::semantic::{extract_entity_names, SemanticRetriever, DEFAULT_TOP_K};
use crate::transcript::TranscriptRetriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use talkgraph_core::{
    ConversationTurn, GraphConnection, GraphStore, HopLimit, MultiHopPath, RetrievalResult,
    RetrievalStats, SemanticResult, TranscriptResult,
};
use talkgraph_db::VectorIndex;
use tracing::{debug, info, instrument, warn};

/// Transcript candidates fetched by the multi-hop and hybrid strategies
pub const TRANSCRIPT_LIMIT: usize = 15;
/// Entities expanded alongside a path search
const MULTI_HOP_EXPANSION_SEEDS: usize = 3;
/// Semantic hits whose communities are added to the context
const COMMUNITY_SEEDS: usize = 3;
const KEYWORD_LIMIT: usize = 10;
const KEYWORD_MIN_CHARS: usize = 4;
/// Entries per source list in a [`QueryResponse`]
const RESPONSE_SOURCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RouteQuery,
    SemanticSearch,
    GraphSearch,
    MultiHopReasoning,
    HybridSearch,
    GenerateAnswer,
    End,
}

impl From<QueryType> for Step {
    fn from(query_type: QueryType) -> Self {
        match query_type {
            QueryType::Semantic => Step::SemanticSearch,
            QueryType::Graph => Step::GraphSearch,
            QueryType::MultiHop => Step::MultiHopReasoning,
            QueryType::Hybrid => Step::HybridSearch,
        }
    }
}

/// One question to answer
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    pub history: Vec<ConversationTurn>,
    pub max_hops: Option<HopLimit>,
    /// Skip classification and use this strategy
    pub query_type: Option<QueryType>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = Some(HopLimit::new(max_hops));
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }
}

/// Per-request working state
#[derive(Debug, Clone)]
pub struct QueryState {
    pub query: String,
    pub history: Vec<ConversationTurn>,
    pub query_type: Option<QueryType>,
    pub max_hops: HopLimit,
    pub evidence: Evidence,
    pub context: String,
    pub answer: String,
    pub confidence: f32,
    pub error: Option<String>,
    /// `source: error` for every retrieval source that failed
    pub degraded: Vec<String>,
}

impl QueryState {
    fn new(request: QueryRequest, default_hops: HopLimit) -> Self {
        Self {
            query: request.query,
            history: request.history,
            query_type: request.query_type,
            max_hops: request.max_hops.unwrap_or(default_hops),
            evidence: Evidence::default(),
            context: String::new(),
            answer: String::new(),
            confidence: 0.0,
            error: None,
            degraded: Vec::new(),
        }
    }

    fn absorb(&mut self, gathered: Gathered) {
        let Gathered { evidence: found, degraded } = gathered;
        self.degraded.extend(degraded);
        let evidence = &mut self.evidence;
        evidence.semantic.extend(found.semantic);
        evidence.keyword.extend(found.keyword);
        evidence.transcript.extend(found.transcript);
        evidence.graph.extend(found.graph);
        evidence.paths.extend(found.paths);
        evidence.communities.extend(found.communities);
    }
}

/// Final result of one orchestrated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub answer: String,
    pub query_type: QueryType,
    pub confidence: f32,
    pub context: String,
    pub semantic_results: Vec<SemanticResult>,
    pub graph_results: Vec<GraphConnection>,
    pub transcript_results: Vec<TranscriptResult>,
    pub multi_hop_paths: Vec<MultiHopPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

impl QueryOutcome {
    pub fn retrieval_stats(&self) -> RetrievalStats {
        RetrievalStats {
            semantic: self.semantic_results.len(),
            graph: self.graph_results.len(),
            transcript: self.transcript_results.len(),
            multi_hop_paths: self.multi_hop_paths.len(),
        }
    }

    /// All evidence as one tagged list: semantic, transcript, graph, paths
    pub fn results(&self) -> Vec<RetrievalResult> {
        let semantic = self.semantic_results.iter().cloned().map(RetrievalResult::Semantic);
        let transcript = self.transcript_results.iter().cloned().map(RetrievalResult::Transcript);
        let graph = self.graph_results.iter().cloned().map(RetrievalResult::Graph);
        let paths = self.multi_hop_paths.iter().cloned().map(RetrievalResult::MultiHop);
        semantic.chain(transcript).chain(graph).chain(paths).collect()
    }
}

impl From<QueryState> for QueryOutcome {
    fn from(state: QueryState) -> Self {
        Self {
            query: state.query,
            answer: state.answer,
            query_type: state.query_type.unwrap_or(QueryType::Hybrid),
            confidence: state.confidence,
            context: state.context,
            semantic_results: state.evidence.semantic,
            graph_results: state.evidence.graph,
            transcript_results: state.evidence.transcript,
            multi_hop_paths: state.evidence.paths,
            error: state.error,
            degraded: state.degraded,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseSources {
    pub semantic: Vec<SemanticResult>,
    pub transcript: Vec<TranscriptResult>,
    pub graph: Vec<GraphConnection>,
}

/// Caller-facing form of a [`QueryOutcome`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub query_type: Option<QueryType>,
    pub confidence: f32,
    pub sources: ResponseSources,
    pub retrieval_stats: RetrievalStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

impl QueryResponse {
    /// A request that failed before any retrieval ran
    pub fn failed(query: impl Into<String>, error: &AgentError) -> Self {
        Self {
            query: query.into(),
            answer: String::new(),
            query_type: None,
            confidence: 0.0,
            sources: ResponseSources::default(),
            retrieval_stats: RetrievalStats::default(),
            error: Some(error.to_string()),
            degraded: Vec::new(),
        }
    }
}

impl From<&QueryOutcome> for QueryResponse {
    fn from(outcome: &QueryOutcome) -> Self {
        Self {
            query: outcome.query.clone(),
            answer: outcome.answer.clone(),
            query_type: Some(outcome.query_type),
            confidence: outcome.confidence,
            sources: ResponseSources {
                semantic: outcome.semantic_results.iter().take(RESPONSE_SOURCES).cloned().collect(),
                transcript: outcome
                    .transcript_results
                    .iter()
                    .take(RESPONSE_SOURCES)
                    .cloned()
                    .collect(),
                graph: outcome.graph_results.iter().take(RESPONSE_SOURCES).cloned().collect(),
            },
            retrieval_stats: outcome.retrieval_stats(),
            error: outcome.error.clone(),
            degraded: outcome.degraded.clone(),
        }
    }
}

/// Evidence from one strategy plus the sources that failed while gathering it
#[derive(Debug, Default)]
struct Gathered {
    evidence: Evidence,
    degraded: Vec<String>,
}

impl Gathered {
    /// The source's value, or an empty one with the failure recorded
    fn or_empty<T: Default>(&mut self, source: &str, result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("{} retrieval failed, continuing without it: {}", source, e);
                self.degraded.push(format!("{source}: {e}"));
                T::default()
            }
        }
    }
}

/// Lowercased query words long enough to be worth a keyword search
fn search_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() >= KEYWORD_MIN_CHARS)
        .collect()
}

/// Routes questions to retrieval strategies and produces answers
pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    semantic: SemanticRetriever,
    graph: GraphRetriever,
    transcripts: TranscriptRetriever,
    generator: Arc<dyn Generator>,
    rules: Vec<ClassifierRule>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<VectorIndex>,
        config: EngineConfig,
    ) -> Self {
        let timeout = config.call_timeout;
        Self {
            semantic: SemanticRetriever::new(embedder, index).with_timeout(timeout),
            graph: GraphRetriever::new(store.clone()).with_timeout(timeout),
            transcripts: TranscriptRetriever::new(store.clone()).with_timeout(timeout),
            store,
            generator,
            rules: DEFAULT_RULES.to_vec(),
            config,
        }
    }

    /// Replace the classification rules (evaluated in order)
    pub fn with_rules(mut self, rules: Vec<ClassifierRule>) -> Self {
        self.rules = rules;
        self
    }

    pub async fn is_ready(&self) -> bool {
        self.semantic.is_ready().await
    }

    pub fn classify(&self, query: &str) -> QueryType {
        classify_with(&self.rules, query)
    }

    /// Answer `query` with the default strategy selection
    pub async fn query(
        &self,
        query: &str,
        max_hops: Option<usize>,
        history: &[ConversationTurn],
    ) -> QueryOutcome {
        let mut request = QueryRequest::new(query).with_history(history.to_vec());
        if let Some(hops) = max_hops {
            request = request.with_max_hops(hops);
        }
        self.run(request).await
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn run(&self, request: QueryRequest) -> QueryOutcome {
        let default_hops = HopLimit::new(self.config.default_max_hops);
        let mut state = QueryState::new(request, default_hops);
        let mut step = Step::RouteQuery;
        while step != Step::End {
            debug!(?step, "entering step");
            step = self.advance(step, &mut state).await;
        }
        info!(
            query_type = ?state.query_type,
            confidence = state.confidence,
            "query answered"
        );
        state.into()
    }

    async fn advance(&self, step: Step, state: &mut QueryState) -> Step {
        match step {
            Step::RouteQuery => {
                let query_type = state
                    .query_type
                    .unwrap_or_else(|| classify_with(&self.rules, &state.query));
                info!("Routing query as {}", query_type);
                state.query_type = Some(query_type);
                Step::from(query_type)
            }
            Step::SemanticSearch => {
                let found = self.semantic_search(state).await;
                self.settle(state, found)
            }
            Step::GraphSearch => {
                let found = self.graph_search(state).await;
                self.settle(state, found)
            }
            Step::MultiHopReasoning => {
                let found = self.multi_hop(state).await;
                self.settle(state, found)
            }
            Step::HybridSearch => {
                let found = self.hybrid_search(state).await;
                self.settle(state, found)
            }
            Step::GenerateAnswer => {
                self.generate_answer(state).await;
                Step::End
            }
            Step::End => Step::End,
        }
    }

    fn settle(&self, state: &mut QueryState, found: Gathered) -> Step {
        if !found.degraded.is_empty() {
            debug!(degraded = ?found.degraded, "strategy finished with failed sources");
        }
        state.absorb(found);
        Step::GenerateAnswer
    }

    async fn semantic_search(&self, state: &QueryState) -> Gathered {
        let mut found = Gathered::default();
        let semantic = self.semantic.search(&state.query, DEFAULT_TOP_K).await;
        found.evidence.semantic = found.or_empty("semantic", semantic);
        found
    }

    async fn graph_search(&self, state: &QueryState) -> Gathered {
        let expanded = QueryExpansion::with_window(DEFAULT_HISTORY_WINDOW)
            .expand(&state.query, &state.history);
        let mut found = Gathered::default();
        let semantic = self.semantic.search(&expanded, DEFAULT_TOP_K).await;
        let semantic = found.or_empty("semantic", semantic);
        let entities = extract_entity_names(&semantic, &state.query);
        debug!(?entities, "graph seeds");
        let graph = self.graph.expand_neighbors(&entities, state.max_hops).await;
        found.evidence.graph = found.or_empty("graph", graph);
        found.evidence.semantic = semantic;
        found
    }

    async fn multi_hop(&self, state: &QueryState) -> Gathered {
        let expanded = QueryExpansion::with_window(MULTI_HOP_HISTORY_WINDOW)
            .expand(&state.query, &state.history);
        let mut found = Gathered::default();
        let semantic = self.semantic.search(&expanded, DEFAULT_TOP_K).await;
        let semantic = found.or_empty("semantic", semantic);
        let entities = extract_entity_names(&semantic, &state.query);
        debug!(?entities, "multi-hop seeds");

        match entities.as_slice() {
            [] => {}
            [single] => {
                let graph = self
                    .graph
                    .expand_neighbors(std::slice::from_ref(single), state.max_hops)
                    .await;
                found.evidence.graph = found.or_empty("graph", graph);
            }
            [first, second, ..] => {
                let paths = self.graph.find_path(first, second, state.max_hops).await;
                found.evidence.paths = found.or_empty("path", paths);
                let seeds = &entities[..entities.len().min(MULTI_HOP_EXPANSION_SEEDS)];
                let graph = self.graph.expand_neighbors(seeds, state.max_hops).await;
                found.evidence.graph = found.or_empty("graph", graph);
            }
        }
        let transcript = self.transcripts.search(&expanded, TRANSCRIPT_LIMIT).await;
        found.evidence.transcript = found.or_empty("transcript", transcript);
        found.evidence.semantic = semantic;
        found
    }

    async fn hybrid_search(&self, state: &QueryState) -> Gathered {
        let expanded = QueryExpansion::with_window(DEFAULT_HISTORY_WINDOW)
            .expand(&state.query, &state.history);
        let mut found = Gathered::default();

        let (semantic, transcript) = tokio::join!(
            self.semantic.search(&expanded, DEFAULT_TOP_K),
            self.transcripts.search(&expanded, TRANSCRIPT_LIMIT),
        );
        let semantic = found.or_empty("semantic", semantic);
        found.evidence.transcript = found.or_empty("transcript", transcript);

        let entities = extract_entity_names(&semantic, &expanded);
        let graph = self.graph.expand_neighbors(&entities, state.max_hops).await;
        found.evidence.graph = found.or_empty("graph", graph);

        let keywords = search_keywords(&state.query);
        if !keywords.is_empty() {
            let keyword = bounded(
                "keyword search",
                self.config.call_timeout,
                self.store.search_talks_by_keyword(&keywords, KEYWORD_LIMIT),
            )
            .await;
            found.evidence.keyword = found.or_empty("keyword", keyword);
        }
        found.evidence.semantic = semantic;
        found
    }

    async fn communities(&self, semantic: &[SemanticResult]) -> Vec<Vec<talkgraph_core::CommunityMember>> {
        let mut blocks = Vec::new();
        for identity in semantic.iter().take(COMMUNITY_SEEDS).filter_map(|r| r.identity()) {
            match bounded(
                "community lookup",
                self.config.call_timeout,
                self.store.community_members(identity),
            )
            .await
            {
                Ok(members) if !members.is_empty() => blocks.push(members),
                Ok(_) => {}
                Err(e) => debug!("community lookup for {} skipped: {}", identity, e),
            }
        }
        blocks
    }

    async fn generate_answer(&self, state: &mut QueryState) {
        let communities = self.communities(&state.evidence.semantic).await;
        state.evidence.communities.extend(communities);

        let assembled = assemble(&state.evidence);
        state.context = assembled.text;
        state.confidence = assembled.confidence;

        let prompt = build_prompt(&state.query, &state.context, &state.history);
        let request = GenerationRequest::new(prompt, &state.history)
            .with_sampling(self.config.max_tokens, self.config.temperature);
        match bounded(
            "answer generation",
            self.config.generation_timeout,
            self.generator.generate(&request),
        )
        .await
        {
            Ok(answer) => state.answer = answer,
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                state.error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_steps() {
        assert_eq!(Step::from(QueryType::Semantic), Step::SemanticSearch);
        assert_eq!(Step::from(QueryType::Graph), Step::GraphSearch);
        assert_eq!(Step::from(QueryType::MultiHop), Step::MultiHopReasoning);
        assert_eq!(Step::from(QueryType::Hybrid), Step::HybridSearch);
    }

    #[test]
    fn test_search_keywords() {
        assert_eq!(
            search_keywords("What is a knowledge graph, really?"),
            vec!["what", "knowledge", "graph", "really"]
        );
    }

    #[test]
    fn test_failed_response_has_zeroed_stats() {
        let response = QueryResponse::failed("q", &AgentError::NotReady("index".into()));
        assert_eq!(response.retrieval_stats, RetrievalStats::default());
        assert_eq!(response.confidence, 0.0);
        assert!(response.error.unwrap().contains("index"));
    }

    #[test]
    fn test_response_keeps_top_three_sources() {
        let outcome = QueryOutcome {
            query: "q".into(),
            answer: "a".into(),
            query_type: QueryType::Hybrid,
            confidence: 0.5,
            context: String::new(),
            semantic_results: Vec::new(),
            graph_results: Vec::new(),
            transcript_results: (0..5)
                .map(|i| TranscriptResult {
                    title: format!("t{}", i),
                    ..Default::default()
                })
                .collect(),
            multi_hop_paths: Vec::new(),
            error: None,
            degraded: vec!["graph: store offline".into()],
        };
        assert_eq!(outcome.results().len(), 5);
        assert!(matches!(outcome.results()[0], RetrievalResult::Transcript(_)));

        let response = QueryResponse::from(&outcome);
        assert_eq!(response.sources.transcript.len(), 3);
        assert_eq!(response.retrieval_stats.transcript, 5);
        assert_eq!(response.degraded, vec!["graph: store offline"]);
    }

    #[test]
    fn test_or_empty_records_failed_source() {
        let mut found = Gathered::default();
        let ok: Vec<u8> = found.or_empty("semantic", Ok(vec![1]));
        let failed: Vec<u8> =
            found.or_empty("transcript", Err(AgentError::Processing("boom".into())));
        assert_eq!(ok, vec![1]);
        assert!(failed.is_empty());
        assert_eq!(found.degraded, vec!["transcript: Processing error: boom"]);
    }
}
