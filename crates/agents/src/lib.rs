//! Retrieval and orchestration for TalkGraph
//!
//! - [`classifier`]: routes a question to a retrieval strategy
//! - [`semantic`], [`graph`], [`transcript`]: the three retrievers
//! - [`expansion`]: rewrites conversational follow-ups
//! - [`context`]: fuses evidence into a prompt context and a confidence
//! - [`orchestrator`]: the query state machine tying them together
//! - [`inference`]: embedding and generation service clients

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod expansion;
pub mod graph;
pub mod inference;
pub mod jobs;
pub mod orchestrator;
pub mod semantic;
pub mod transcript;

pub use classifier::{classify, classify_with, ClassifierRule, QueryType, DEFAULT_RULES};
pub use config::EngineConfig;
pub use context::{assemble, AssembledContext, Evidence};
pub use error::{AgentError, Result};
pub use expansion::QueryExpansion;
pub use graph::GraphRetriever;
pub use inference::{Embedder, GenerationRequest, Generator, TeiClient, TgiClient};
pub use jobs::{InMemoryJobStore, JobId, JobRecord, JobStatus, JobStore};
pub use orchestrator::{Orchestrator, QueryOutcome, QueryRequest, QueryResponse, Step};
pub use semantic::SemanticRetriever;
pub use transcript::TranscriptRetriever;
