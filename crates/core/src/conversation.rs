//! Conversation history types for follow-up questions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    #[serde(alias = "human")]
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A single prior turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    #[serde(alias = "sender")]
    pub role: MessageRole,

    #[serde(alias = "text")]
    pub content: String,

    #[serde(default, alias = "created_at", alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            sent_at: Some(Utc::now()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            sent_at: Some(Utc::now()),
        }
    }
}

#[derive(Deserialize)]
struct Wrapped {
    #[serde(alias = "history", alias = "conversation_history")]
    messages: Vec<ConversationTurn>,
}

/// Parse history from JSON: either a bare array of turns or an object with
/// a `messages` array.
pub fn parse_history(json: &str) -> Result<Vec<ConversationTurn>, serde_json::Error> {
    if let Ok(turns) = serde_json::from_str::<Vec<ConversationTurn>>(json) {
        return Ok(turns);
    }
    serde_json::from_str::<Wrapped>(json).map(|w| w.messages)
}

/// The last `n` turns, oldest first
pub fn last_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(n)..]
}
