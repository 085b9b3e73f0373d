//! TalkGraph CLI
//!
//! Ask questions about conference talks, inspect each retriever on its
//! own, and manage the graph database and vector index.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use talkgraph_agents::{
    classify, AgentError, EngineConfig, GraphRetriever, InMemoryJobStore, JobId, JobStatus, JobStore,
    Orchestrator, QueryOutcome, QueryRequest, QueryResponse, TeiClient, TgiClient,
    TranscriptRetriever,
};
use talkgraph_core::{
    parse_history, ConversationTurn, GraphSnapshot, GraphStore, HopLimit, RetrievalResult,
};
use talkgraph_db::{init_memory, init_persistent, IndexKind, Repository, VectorIndex};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// TalkGraph - question answering over a knowledge graph of conference talks
#[derive(Parser)]
#[command(name = "talkgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path (defaults to $TALKGRAPH_DB_PATH or ~/.talkgraph/data)
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Use in-memory database (for testing)
    #[arg(long)]
    memory: bool,

    /// Directory holding the embedding and mapping files
    #[arg(long)]
    embeddings_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question
    Query {
        text: String,

        /// Maximum graph hops (1-4)
        #[arg(long)]
        max_hops: Option<usize>,

        /// JSON file with earlier conversation turns
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation that carries history between questions
    Chat,

    /// Show which retrieval strategy a question would use
    Classify { text: String },

    /// Search transcripts directly
    Transcripts {
        text: String,

        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Expand graph neighbors of the named entities
    Neighbors {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long, default_value = "2")]
        depth: usize,
    },

    /// Shortest connection paths between two entities
    Path {
        start: String,
        target: String,

        #[arg(long, default_value = "3")]
        max_hops: usize,
    },

    /// Build and save the vector index from the embeddings directory
    BuildIndex {
        /// flat, ivf or hnsw (defaults to $INDEX_KIND)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Load a graph snapshot (JSON with `nodes` and `relationships`)
    ImportGraph { path: PathBuf },

    /// Show database statistics
    Stats,

    /// Delete every node and relationship
    ResetDb {
        /// Remove the database directory instead
        #[arg(long)]
        purge: bool,
    },
}

/// Evidence lines printed under an answer
const SOURCES_SHOWN: usize = 8;

fn default_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TALKGRAPH_DB_PATH") {
        return Ok(PathBuf::from(path));
    }
    let mut path = dirs::home_dir().context("Could not find home directory")?;
    path.push(".talkgraph");
    path.push("data");
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging; stdout is reserved for command output
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.embeddings_dir.clone() {
        config.embeddings_dir = dir;
    }
    let jobs = InMemoryJobStore::new();

    // Commands that never touch the database
    if let Commands::Classify { text } = &cli.command {
        println!("{}", classify(text));
        return Ok(());
    }
    // Reject a bad kind before opening the database
    let index_kind = match &cli.command {
        Commands::BuildIndex { kind: Some(kind) } => kind.parse::<IndexKind>()?,
        _ => config.index_kind,
    };

    let db_path = match cli.db_path.clone() {
        Some(path) => path,
        None => default_db_path()?,
    };

    if let Commands::ResetDb { purge: true } = &cli.command {
        if db_path.exists() {
            std::fs::remove_dir_all(&db_path)
                .with_context(|| format!("Failed to remove db at {}", db_path.display()))?;
            println!("✓ Removed database at {}", db_path.display());
        } else {
            println!("Database not found at {}, nothing to remove", db_path.display());
        }
        return Ok(());
    }

    let db = if cli.memory {
        info!("Using in-memory database");
        init_memory().await?
    } else {
        // Ensure directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Using database at: {}", db_path.display());
        init_persistent(&db_path).await?
    };
    let repo = Repository::new(db);

    match cli.command {
        Commands::Query {
            text,
            max_hops,
            history,
            json,
        } => {
            let history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            let orchestrator = match connect_orchestrator(repo, &config).await {
                Ok(orchestrator) => orchestrator,
                Err(e) if json => {
                    let failure = AgentError::NotReady(e.to_string());
                    let response = QueryResponse::failed(text.as_str(), &failure);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            let mut request = QueryRequest::new(text).with_history(history);
            if let Some(hops) = max_hops {
                request = request.with_max_hops(hops);
            }
            let outcome = orchestrator.run(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&QueryResponse::from(&outcome))?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Chat => {
            let orchestrator = connect_orchestrator(repo, &config).await?;
            cmd_chat(orchestrator).await?;
        }
        Commands::Transcripts { text, limit } => {
            cmd_transcripts(repo, &config, &text, limit).await?;
        }
        Commands::Neighbors { names, depth } => {
            cmd_neighbors(repo, &config, &names, depth).await?;
        }
        Commands::Path {
            start,
            target,
            max_hops,
        } => {
            cmd_path(repo, &config, &start, &target, max_hops).await?;
        }
        Commands::BuildIndex { .. } => {
            let index = VectorIndex::new(repo.connection().clone());
            cmd_build_index(&index, &jobs, &config.embeddings_dir, index_kind).await?;
        }
        Commands::ImportGraph { path } => {
            cmd_import_graph(repo, &jobs, &path).await?;
        }
        Commands::Stats => {
            cmd_stats(repo).await?;
        }
        Commands::ResetDb { .. } => {
            repo.reset().await?;
            println!("✓ Deleted all nodes and relationships");
        }
        Commands::Classify { .. } => {
            // Handled before database init.
        }
    }

    Ok(())
}

fn read_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history: {}", path.display()))?;
    parse_history(&content)
        .with_context(|| format!("Failed to parse history from: {}", path.display()))
}

/// Check the inference services and load the vector index
async fn connect_orchestrator(repo: Repository, config: &EngineConfig) -> Result<Orchestrator> {
    let tei = TeiClient::default_local();
    let tgi = TgiClient::default_local().with_timeout(config.generation_timeout);

    if !tei.health().await.unwrap_or(false) {
        eprintln!("Error: embeddings service is not reachable.");
        eprintln!("  TEI (embeddings): {}", tei.base_url());
        eprintln!("Start it with: docker compose up -d");
        anyhow::bail!("Embeddings service unavailable");
    }
    if !tgi.health().await.unwrap_or(false) {
        eprintln!("Error: generation service is not reachable.");
        eprintln!("  TGI (generation): {}", tgi.base_url());
        eprintln!("Start it with: docker compose up -d");
        anyhow::bail!("Generation service unavailable");
    }

    // A persistent database keeps the index from the last build-index
    let index = VectorIndex::new(repo.connection().clone());
    if !index.is_ready().await? {
        match index.load(&config.embeddings_dir).await {
            Ok(loaded) => info!(
                "Loaded {} index with {} vectors",
                loaded.index_type, loaded.total_vectors
            ),
            Err(e) => warn!(
                "No vector index in {} ({}); semantic search is unavailable. Run `talkgraph build-index`.",
                config.embeddings_dir.display(),
                e
            ),
        }
    }

    let store: Arc<dyn GraphStore> = Arc::new(repo);
    Ok(Orchestrator::new(
        store,
        Arc::new(tei),
        Arc::new(tgi),
        Arc::new(index),
        config.clone(),
    ))
}

fn print_outcome(outcome: &QueryOutcome) {
    if let Some(error) = &outcome.error {
        println!("Error: {}", error);
    } else {
        println!("{}", outcome.answer);
    }
    println!();

    let stats = outcome.retrieval_stats();
    println!(
        "Strategy: {} | Confidence: {:.2}",
        outcome.query_type, outcome.confidence
    );
    println!(
        "Sources: {} semantic, {} graph, {} transcript, {} paths",
        stats.semantic, stats.graph, stats.transcript, stats.multi_hop_paths
    );
    for result in outcome.results().iter().take(SOURCES_SHOWN) {
        match result {
            RetrievalResult::Semantic(hit) => println!(
                "  • {} {} ({:.3})",
                hit.node_type,
                hit.identity().unwrap_or("Unknown"),
                hit.similarity_score
            ),
            RetrievalResult::Transcript(quote) => {
                let at = quote.timestamp.as_deref().unwrap_or("-");
                match &quote.video_link {
                    Some(link) => println!("  • {} [{}] {}", quote.title, at, link),
                    None => println!("  • {} [{}]", quote.title, at),
                }
            }
            RetrievalResult::Graph(conn) => println!(
                "  • {} --[{}]--> {}",
                conn.source_identity, conn.relationship, conn.neighbor_identity
            ),
            RetrievalResult::MultiHop(path) => println!("  • {}", path.render()),
            RetrievalResult::Keyword(hit) => println!("  • {}", hit.title),
        }
    }
}

async fn cmd_chat(orchestrator: Orchestrator) -> Result<()> {
    println!("TalkGraph - Chat Mode");
    println!("Ask about talks, speakers and topics. Commands: clear, quit");
    if !orchestrator.is_ready().await {
        println!("(semantic search disabled: no vector index loaded)");
    }
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history: Vec<ConversationTurn> = Vec::new();

    loop {
        print!("talkgraph> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match line.trim() {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "clear" => {
                history.clear();
                println!("Conversation cleared.");
            }
            question => {
                let outcome = orchestrator.query(question, None, &history).await;
                print_outcome(&outcome);
                println!();
                if outcome.error.is_none() {
                    history.push(ConversationTurn::user(question));
                    history.push(ConversationTurn::assistant(outcome.answer));
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn cmd_transcripts(
    repo: Repository,
    config: &EngineConfig,
    text: &str,
    limit: usize,
) -> Result<()> {
    let retriever = TranscriptRetriever::new(Arc::new(repo)).with_timeout(config.call_timeout);
    let results = retriever.search(text, limit).await?;
    if results.is_empty() {
        println!("No matching transcripts.");
        return Ok(());
    }

    println!("Found {} transcripts:\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", i + 1, result.title);
        println!("   Speakers: {}", result.speakers.join(", "));
        if let Some(timestamp) = &result.timestamp {
            println!("   At: {}", timestamp);
        }
        if let Some(link) = result.video_link.as_ref().or(result.video_url.as_ref()) {
            println!("   Video: {}", link);
        }
        println!("   {}", result.snippet);
        println!();
    }
    Ok(())
}

async fn cmd_neighbors(
    repo: Repository,
    config: &EngineConfig,
    names: &[String],
    depth: usize,
) -> Result<()> {
    let retriever = GraphRetriever::new(Arc::new(repo)).with_timeout(config.call_timeout);
    let connections = retriever
        .expand_neighbors(names, HopLimit::new(depth))
        .await?;
    if connections.is_empty() {
        println!("No connections found.");
        return Ok(());
    }

    for conn in &connections {
        println!(
            "  • {} --[{}]--> {} ({}, {} hops: {})",
            conn.source_identity,
            conn.relationship,
            conn.neighbor_identity,
            conn.neighbor_type,
            conn.path_length,
            conn.relationship_chain.join(" > ")
        );
    }
    println!("\n{} connections", connections.len());
    Ok(())
}

async fn cmd_path(
    repo: Repository,
    config: &EngineConfig,
    start: &str,
    target: &str,
    max_hops: usize,
) -> Result<()> {
    let retriever = GraphRetriever::new(Arc::new(repo)).with_timeout(config.call_timeout);
    let paths = retriever
        .find_path(start, target, HopLimit::new(max_hops))
        .await?;
    if paths.is_empty() {
        println!("No path between {} and {}.", start, target);
        return Ok(());
    }
    for (i, path) in paths.iter().enumerate() {
        println!("{}. ({} hops) {}", i + 1, path.length, path.render());
    }
    Ok(())
}

/// One line describing a finished job, read back from the store
async fn print_job(jobs: &InMemoryJobStore, job: &JobId) {
    if let Some(record) = jobs.get(job).await {
        let elapsed = record
            .completed_at
            .map(|done| (done - record.started_at).num_milliseconds())
            .unwrap_or_default();
        println!("  • Job: {} {} ({} in {} ms)", record.kind, record.id, record.progress, elapsed);
    }
}

async fn cmd_build_index(
    index: &VectorIndex,
    jobs: &InMemoryJobStore,
    dir: &Path,
    kind: IndexKind,
) -> Result<()> {
    let job = jobs.create("build-index").await;
    jobs.update(&job, JobStatus::Processing, &format!("building {} index", kind))
        .await?;

    let built = match index.build_from_dir(dir, kind).await {
        Ok(_) => index.save(dir).await,
        Err(e) => Err(e),
    };
    let info = match built {
        Ok(info) => info,
        Err(e) => {
            jobs.fail(&job, &e.to_string()).await?;
            return Err(e).with_context(|| format!("Failed to build index from {}", dir.display()));
        }
    };
    jobs.complete(&job, serde_json::to_value(&info)?).await?;

    println!("✓ Built {} index", info.index_type);
    println!("  • Vectors: {}", info.total_vectors);
    println!("  • Dimension: {}", info.dimension);
    println!("  • Saved to: {}", dir.display());
    print_job(jobs, &job).await;
    Ok(())
}

async fn cmd_import_graph(repo: Repository, jobs: &InMemoryJobStore, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let snapshot = GraphSnapshot::from_json(&content)
        .with_context(|| format!("Failed to parse graph snapshot from: {}", path.display()))?;

    let job = jobs.create("import-graph").await;
    jobs.update(&job, JobStatus::Processing, "importing").await?;
    let summary = match repo.import_snapshot(snapshot).await {
        Ok(summary) => summary,
        Err(e) => {
            jobs.fail(&job, &e.to_string()).await?;
            return Err(e.into());
        }
    };
    jobs.complete(&job, serde_json::to_value(summary)?).await?;

    println!("✓ Import complete:");
    println!("  • Nodes: {}", summary.nodes);
    println!("  • Relationships: {}", summary.relationships);
    print_job(jobs, &job).await;
    Ok(())
}

async fn cmd_stats(repo: Repository) -> Result<()> {
    let stats = repo.get_stats().await?;

    println!("Graph Statistics:");
    println!("  • Nodes: {}", stats.total_nodes);
    for (node_type, count) in &stats.nodes_by_type {
        println!("      {}: {}", node_type, count);
    }
    println!("  • Relationships: {}", stats.relationships);
    println!("  • Talks with transcripts: {}", stats.talks_with_transcripts);
    println!("  • YouTube videos: {}", stats.youtube_videos);
    println!("  • Communities: {}", stats.communities);
    Ok(())
}
