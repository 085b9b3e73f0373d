//! Conversational query expansion for follow-up questions
//!
//! A short or pronoun-bearing query asked after earlier turns is rewritten
//! in two steps. First, personal pronouns are replaced with the most recent
//! two-word proper name from the conversation. Second, up to five proper
//! nouns, titles and quoted terms pulled from recent turns are appended.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use talkgraph_core::conversation::last_turns;
use talkgraph_core::{ConversationTurn, MessageRole};

static CAPITALIZED_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2}\b").expect("valid regex")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid regex"));

static BY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Bb]y\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").expect("valid regex")
});

static IN_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b[Ii]n\s+["']?([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)"#).expect("valid regex")
});

static TWO_WORD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+\s+[A-Z][a-z]+)\b").expect("valid regex"));

static PERSONAL_PRONOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(he|she|they|him|her|them)\b").expect("valid regex"));

const FOLLOW_UP_PRONOUNS: &[&str] = &["he", "she", "they", "it", "this", "that", "these", "those"];

/// Queries with fewer tokens than this count as follow-ups
const SHORT_QUERY_TOKENS: usize = 5;

pub const MAX_APPENDED_KEYWORDS: usize = 5;
pub const DEFAULT_HISTORY_WINDOW: usize = 6;
pub const MULTI_HOP_HISTORY_WINDOW: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct QueryExpansion {
    window: usize,
}

impl Default for QueryExpansion {
    fn default() -> Self {
        Self::with_window(DEFAULT_HISTORY_WINDOW)
    }
}

impl QueryExpansion {
    pub fn with_window(window: usize) -> Self {
        Self { window }
    }

    pub fn is_follow_up(query: &str) -> bool {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .collect();
        tokens.len() < SHORT_QUERY_TOKENS
            || tokens.iter().any(|t| FOLLOW_UP_PRONOUNS.contains(&t.as_str()))
    }

    /// Rewrite `query` using the tail of `history`; unchanged when the
    /// query does not look like a follow-up or there is no history.
    pub fn expand(&self, query: &str, history: &[ConversationTurn]) -> String {
        if history.is_empty() || !Self::is_follow_up(query) {
            return query.to_string();
        }
        let window = last_turns(history, self.window);

        let mut expanded = query.to_string();
        if let Some(name) = most_recent_name(window) {
            expanded = PERSONAL_PRONOUN
                .replace_all(&expanded, name.as_str())
                .into_owned();
        }

        let lowered = expanded.to_lowercase();
        let mut seen = HashSet::new();
        let keywords: Vec<String> = context_keywords(window)
            .into_iter()
            .filter(|kw| kw.trim().chars().count() > 1)
            .filter(|kw| seen.insert(kw.to_lowercase()))
            .filter(|kw| !lowered.contains(&kw.to_lowercase()))
            .take(MAX_APPENDED_KEYWORDS)
            .collect();

        if keywords.is_empty() {
            return expanded;
        }
        tracing::debug!(query, appended = ?keywords, "expanded follow-up query");
        format!("{} {}", expanded, keywords.join(" "))
    }
}

/// First two-word name in the newest assistant turn that has one
fn most_recent_name(window: &[ConversationTurn]) -> Option<String> {
    window
        .iter()
        .rev()
        .filter(|turn| turn.role == MessageRole::Assistant)
        .find_map(|turn| TWO_WORD_NAME.captures(&turn.content).map(|caps| caps[1].to_string()))
}

fn context_keywords(window: &[ConversationTurn]) -> Vec<String> {
    let mut keywords = Vec::new();
    for turn in window {
        match turn.role {
            MessageRole::User => {
                for word in turn.content.split_whitespace() {
                    let word = word.trim_matches(|c: char| ".,!?;:".contains(c));
                    let capitalized = word.chars().next().is_some_and(char::is_uppercase);
                    if capitalized && word.chars().count() > 2 {
                        keywords.push(word.to_string());
                    }
                }
            }
            MessageRole::Assistant => {
                let text = &turn.content;
                keywords.extend(CAPITALIZED_PHRASE.find_iter(text).map(|m| m.as_str().to_string()));
                keywords.extend(QUOTED.captures_iter(text).map(|c| c[1].to_string()));
                keywords.extend(BY_NAME.captures_iter(text).map(|c| c[1].to_string()));
                keywords.extend(IN_TITLE.captures_iter(text).map(|c| c[1].to_string()));
            }
            MessageRole::System => {}
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("Who talked about graphs?"),
            ConversationTurn::assistant("Jane Doe discussed semantic graphs in \"Graph Thinking\"."),
        ]
    }

    #[test]
    fn test_pronoun_resolves_to_recent_speaker() {
        let expanded = QueryExpansion::default().expand("What else did he say?", &history());
        assert!(expanded.starts_with("What else did Jane Doe say?"), "{}", expanded);
    }

    #[test]
    fn test_bare_pronoun() {
        let expanded = QueryExpansion::default().expand("he", &history());
        assert!(expanded.starts_with("Jane Doe"), "{}", expanded);
    }

    #[test]
    fn test_pronoun_ignores_user_turn_titles() {
        let mut history = history();
        history.push(ConversationTurn::user("Who gave Graph Thinking?"));
        let expanded = QueryExpansion::default().expand("What else did he say?", &history);
        assert!(expanded.starts_with("What else did Jane Doe say?"), "{}", expanded);
    }

    #[test]
    fn test_appends_context_keywords_once() {
        let expanded = QueryExpansion::default().expand("more on that", &history());
        // user-turn words first, then assistant phrases; the title is found
        // three ways but appended once
        assert_eq!(expanded, "more on that Who Jane Doe Graph Thinking");
    }

    #[test]
    fn test_standalone_query_untouched() {
        let query = "Which talks cover ontology design for enterprise catalogs";
        assert_eq!(QueryExpansion::default().expand(query, &history()), query);
    }

    #[test]
    fn test_no_history_untouched() {
        assert_eq!(QueryExpansion::default().expand("what did he say", &[]), "what did he say");
    }

    #[test]
    fn test_pronoun_inside_word_is_kept() {
        let expanded = QueryExpansion::default().expand("the theme", &history());
        assert!(expanded.starts_with("the theme"));
    }

    #[test]
    fn test_follow_up_detection() {
        assert!(QueryExpansion::is_follow_up("and this?"));
        assert!(QueryExpansion::is_follow_up("What were those tools people were using"));
        assert!(!QueryExpansion::is_follow_up("What tools were people using for graph analytics"));
    }
}
