//! Local inference clients for query embeddings (TEI) and answer generation (TGI).
//!
//! Both clients can be pointed at an Ollama server instead by setting
//! `TEI_PROVIDER=ollama` / `TGI_PROVIDER=ollama`.

use crate::config::env_or_default;
use crate::{AgentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use talkgraph_core::conversation::last_turns;
use talkgraph_core::{ConversationTurn, MessageRole};
use tracing::debug;

const DEFAULT_TEI_URL: &str = "http://localhost:8081";
const DEFAULT_TEI_PROVIDER: &str = "tei";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_TGI_URL: &str = "http://localhost:8082";
const DEFAULT_TGI_PROVIDER: &str = "tgi";
const DEFAULT_OLLAMA_MODEL: &str = "phi4-mini:latest";
const DEFAULT_TEI_MAX_BATCH: usize = 32;

/// Prior turns forwarded to the generator with every prompt
pub const HISTORY_TURNS_FOR_GENERATION: usize = 6;

/// Turns text into a query embedding
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces an answer from a fully assembled prompt plus prior turns
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub history: Vec<ConversationTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, history: &[ConversationTurn]) -> Self {
        Self {
            prompt: prompt.into(),
            history: last_turns(history, HISTORY_TURNS_FOR_GENERATION).to_vec(),
            max_tokens: crate::config::DEFAULT_GENERATION_MAX_TOKENS,
            temperature: crate::config::DEFAULT_GENERATION_TEMPERATURE,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Chat transcript for providers that take role-tagged messages
    fn chat_messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = self
            .history
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(ChatMessage {
            role: MessageRole::User.as_str().to_string(),
            content: self.prompt.clone(),
        });
        messages
    }

    /// Single string for completion-style endpoints
    fn flattened(&self) -> String {
        let mut out = String::new();
        for turn in &self.history {
            let speaker = match turn.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System => "System",
            };
            out.push_str(&format!("{}: {}\n", speaker, turn.content));
        }
        out.push_str(&format!("User: {}\nAssistant:", self.prompt));
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Provider {
    Native,
    Ollama,
}

impl Provider {
    fn from_env(key: &str, default: &str) -> Self {
        if env_or_default(key, default).eq_ignore_ascii_case("ollama") {
            Provider::Ollama
        } else {
            Provider::Native
        }
    }
}

#[derive(Clone)]
pub struct TeiClient {
    client: Client,
    base_url: String,
    provider: Provider,
    model: String,
}

impl TeiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: Provider::Native,
            model: DEFAULT_OLLAMA_EMBED_MODEL.to_string(),
        }
    }

    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Provider::Ollama,
            model: model.into(),
            ..Self::new(base_url)
        }
    }

    pub fn default_local() -> Self {
        match Provider::from_env("TEI_PROVIDER", DEFAULT_TEI_PROVIDER) {
            Provider::Ollama => Self::ollama(
                env_or_default("TEI_URL", DEFAULT_OLLAMA_URL),
                env_or_default("TEI_MODEL", DEFAULT_OLLAMA_EMBED_MODEL),
            ),
            Provider::Native => Self::new(env_or_default("TEI_URL", DEFAULT_TEI_URL)),
        }
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if self.provider == Provider::Ollama {
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(self.ollama_embed(text).await?);
            }
            return Ok(results);
        }

        let max_batch = crate::config::env_number("TEI_MAX_BATCH", DEFAULT_TEI_MAX_BATCH);
        let prompt_name = std::env::var("TEI_PROMPT_NAME_PASSAGE").ok();
        let url = format!("{}/embed", self.base_url);
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(max_batch) {
            let request = TeiEmbedBatchRequest {
                inputs: chunk,
                truncate: true,
                prompt_name: prompt_name.as_deref(),
            };
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;
            results.extend(parse_embeddings_response(response)?);
        }

        Ok(results)
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            Provider::Native => format!("{}/health", self.base_url),
            Provider::Ollama => format!("{}/api/tags", self.base_url),
        };
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ollama_embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaEmbedResponse>()
            .await?;

        Ok(response.embedding)
    }
}

#[async_trait]
impl Embedder for TeiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.provider {
            Provider::Ollama => self.ollama_embed(text).await?,
            Provider::Native => {
                let prompt_name = std::env::var("TEI_PROMPT_NAME_QUERY").ok();
                let request = TeiEmbedRequest {
                    inputs: text,
                    truncate: true,
                    prompt_name: prompt_name.as_deref(),
                };
                let response = self
                    .client
                    .post(format!("{}/embed", self.base_url))
                    .json(&request)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await?;
                parse_embedding_response(response)?
            }
        };

        if embedding.is_empty() {
            return Err(AgentError::Processing("Embedding service returned no vector".into()));
        }
        Ok(embedding)
    }
}

#[derive(Clone)]
pub struct TgiClient {
    client: Client,
    base_url: String,
    provider: Provider,
    model: String,
    timeout: Option<Duration>,
}

impl TgiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: Provider::Native,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout: None,
        }
    }

    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Provider::Ollama,
            model: model.into(),
            ..Self::new(base_url)
        }
    }

    pub fn default_local() -> Self {
        match Provider::from_env("TGI_PROVIDER", DEFAULT_TGI_PROVIDER) {
            Provider::Ollama => Self::ollama(
                env_or_default("TGI_URL", DEFAULT_OLLAMA_URL),
                env_or_default("TGI_MODEL", DEFAULT_OLLAMA_MODEL),
            ),
            Provider::Native => Self::new(env_or_default("TGI_URL", DEFAULT_TGI_URL)),
        }
    }

    /// Per-request deadline applied at the HTTP layer
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            Provider::Native => format!("{}/health", self.base_url),
            Provider::Ollama => format!("{}/api/tags", self.base_url),
        };
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json(&self, url: String, body: Value) -> Result<Value> {
        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?.error_for_status()?.json::<Value>().await?)
    }

    async fn tgi_generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = TgiGenerateRequest {
            inputs: request.flattened(),
            parameters: TgiParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
                return_full_text: false,
            },
        };
        let response = self
            .post_json(format!("{}/generate", self.base_url), serde_json::to_value(body)?)
            .await?;
        extract_generated_text(response)
    }

    async fn ollama_chat(&self, request: &GenerationRequest) -> Result<String> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: request.chat_messages(),
            stream: false,
            options: json!({
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }),
        };
        let response = self
            .post_json(format!("{}/api/chat", self.base_url), serde_json::to_value(body)?)
            .await?;
        let parsed: OllamaChatResponse = serde_json::from_value(response)
            .map_err(|e| AgentError::Generation(format!("Unexpected Ollama chat response: {}", e)))?;

        if let Some(total_ms) = parsed.total_duration.map(|ns| ns as f64 / 1_000_000.0) {
            debug!("Ollama chat total_duration_ms={:.2}", total_ms);
        }
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl Generator for TgiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let text = match self.provider {
            Provider::Native => self.tgi_generate(request).await?,
            Provider::Ollama => self.ollama_chat(request).await?,
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AgentError::Generation("Model returned an empty answer".into()));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a str,
    truncate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_name: Option<&'a str>,
}

#[derive(Serialize)]
struct TeiEmbedBatchRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_name: Option<&'a str>,
}

#[derive(Serialize)]
struct TgiGenerateRequest {
    inputs: String,
    parameters: TgiParameters,
}

#[derive(Serialize)]
struct TgiParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: Value,
}

#[derive(Serialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessageResponse,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

fn parse_embedding_response(value: Value) -> Result<Vec<f32>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(Vec::new());
            }
            if items.first().map(|v| v.is_number()).unwrap_or(false) {
                serde_json::from_value(Value::Array(items)).map_err(|e| {
                    AgentError::Processing(format!("Invalid TEI embedding array: {}", e))
                })
            } else {
                let first = items
                    .into_iter()
                    .next()
                    .ok_or_else(|| AgentError::Processing("Missing embeddings".to_string()))?;
                serde_json::from_value(first).map_err(|e| {
                    AgentError::Processing(format!("Invalid TEI embedding array: {}", e))
                })
            }
        }
        other => Err(AgentError::Processing(format!(
            "Unexpected TEI response format: {}",
            other
        ))),
    }
}

fn parse_embeddings_response(value: Value) -> Result<Vec<Vec<f32>>> {
    match value {
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Array(items) if items[0].is_array() => serde_json::from_value(Value::Array(items))
            .map_err(|e| AgentError::Processing(format!("Invalid TEI embeddings response: {}", e))),
        Value::Array(items) => {
            let single: Vec<f32> = serde_json::from_value(Value::Array(items))
                .map_err(|e| AgentError::Processing(format!("Invalid TEI embedding array: {}", e)))?;
            Ok(vec![single])
        }
        other => Err(AgentError::Processing(format!(
            "Unexpected TEI response format: {}",
            other
        ))),
    }
}

fn extract_generated_text(value: Value) -> Result<String> {
    match value {
        Value::Array(mut items) => {
            let first = items
                .pop()
                .ok_or_else(|| AgentError::Generation("Empty TGI response array".to_string()))?;
            extract_generated_text(first)
        }
        Value::Object(mut obj) => match obj.remove("generated_text") {
            Some(Value::String(text)) => Ok(text),
            _ => Err(AgentError::Generation(
                "TGI response missing generated text field".to_string(),
            )),
        },
        other => Err(AgentError::Generation(format!(
            "Unexpected TGI response format: {}",
            other
        ))),
    }
}
