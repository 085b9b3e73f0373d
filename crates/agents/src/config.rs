//! Runtime configuration read from the environment

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::time::Duration;
use talkgraph_db::IndexKind;

pub const DEFAULT_EMBEDDINGS_DIR: &str = "embeddings";
pub const DEFAULT_GENERATION_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_HOPS: usize = 2;

pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a positive number from the environment, falling back on absence
/// or garbage.
pub fn env_number<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

/// Settings shared by the orchestrator and the CLI
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub embeddings_dir: PathBuf,
    pub index_kind: IndexKind,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for graph store and embedding calls
    pub call_timeout: Duration,
    /// Deadline for answer generation
    pub generation_timeout: Duration,
    pub default_max_hops: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embeddings_dir: PathBuf::from(DEFAULT_EMBEDDINGS_DIR),
            index_kind: IndexKind::Flat,
            max_tokens: DEFAULT_GENERATION_MAX_TOKENS,
            temperature: DEFAULT_GENERATION_TEMPERATURE,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            default_max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

impl EngineConfig {
    /// Fails only on an `INDEX_KIND` that names no index type
    pub fn from_env() -> Result<Self> {
        let index_kind = match std::env::var("INDEX_KIND") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<IndexKind>()
                .map_err(|e| AgentError::Config(format!("INDEX_KIND: {e}")))?,
            _ => IndexKind::Flat,
        };
        Ok(Self {
            embeddings_dir: PathBuf::from(env_or_default("EMBEDDINGS_DIR", DEFAULT_EMBEDDINGS_DIR)),
            index_kind,
            max_tokens: env_number("GENERATION_MAX_TOKENS", DEFAULT_GENERATION_MAX_TOKENS),
            temperature: std::env::var("GENERATION_TEMPERATURE")
                .ok()
                .and_then(|value| value.trim().parse::<f32>().ok())
                .filter(|value| (0.0..=2.0).contains(value))
                .unwrap_or(DEFAULT_GENERATION_TEMPERATURE),
            call_timeout: Duration::from_secs(env_number(
                "CALL_TIMEOUT_SECS",
                DEFAULT_CALL_TIMEOUT_SECS,
            )),
            generation_timeout: Duration::from_secs(env_number(
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )),
            default_max_hops: env_number("DEFAULT_MAX_HOPS", DEFAULT_MAX_HOPS),
        })
    }
}
