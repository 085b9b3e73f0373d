//! Transcript retriever: speaker/keyword filtering over talk transcripts,
//! multi-snippet extraction and timestamp alignment.

use crate::error::{bounded, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use talkgraph_core::transcript::{format_clock, segment_at_offset};
use talkgraph_core::{GraphStore, TalkRecord, TranscriptFilter, TranscriptResult, TranscriptSegment};
use tracing::{debug, instrument};

const STOP_WORDS: &[&str] = &[
    "what", "did", "say", "about", "the", "and", "are", "was", "were", "for", "with", "that",
    "this", "from",
];

/// Capitalized only because they open a question; never speaker names
const SENTENCE_STARTERS: &[&str] = &[
    "who", "which", "how", "when", "where", "why", "does", "tell", "show", "give", "find",
    "list", "can", "could", "has", "have", "any",
];

/// Extra anchors for questions about tools or coverage
const TECHNICAL_TERMS: &[&str] = &[
    "apache", "arrow", "parquet", "cairo", "cynefin", "graphistry", "framework", "library",
    "tool", "technology", "system",
];
const TECHNICAL_TRIGGERS: &[&str] = &["tool", "discuss", "mention", "talk about", "say about", "cover"];

const WINDOW_CHARS: usize = 800;
const SNAP_CHARS: usize = 150;
const MAX_SNIPPET_ANCHORS: usize = 5;
const MAX_JOINED_SNIPPETS: usize = 3;
const MAX_COMBINED_CHARS: usize = 2000;
const MIN_SNAPPED_CHARS: usize = 1500;
const FALLBACK_CHARS: usize = 1000;
const MAX_SPEAKERS: usize = 3;
const MAX_TAGS: usize = 5;

static YOUTUBE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").expect("valid regex"));

/// Keywords and speaker names pulled from a question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    pub keywords: Vec<String>,
    pub speakers: Vec<String>,
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| c.is_ascii_punctuation())
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token.to_lowercase().as_str())
}

fn starts_upper(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

pub fn extract_terms(query: &str) -> QueryTerms {
    let tokens: Vec<&str> = query
        .split_whitespace()
        .map(trim_punctuation)
        .filter(|t| !t.is_empty())
        .collect();

    let mut keywords: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() > 2 && !is_stop_word(t))
        .map(|t| t.to_lowercase())
        .collect();

    let name_part = |token: &str| starts_upper(token) && token.chars().count() > 2;

    let mut speakers = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let lowered = token.to_lowercase();
        if name_part(token) && !is_stop_word(token) && !SENTENCE_STARTERS.contains(&lowered.as_str()) {
            let mut consumed = vec![lowered];
            let mut name = token.to_string();
            if let Some(next) = tokens.get(i + 1).filter(|next| name_part(next)) {
                name = format!("{} {}", token, next);
                consumed.push(next.to_lowercase());
            }
            for part in &consumed {
                if let Some(at) = keywords.iter().position(|kw| kw == part) {
                    keywords.remove(at);
                }
            }
            i += consumed.len();
            speakers.push(name);
            continue;
        }
        i += 1;
    }

    QueryTerms { keywords, speakers }
}

/// Case-fold while keeping byte offsets aligned with the original text
fn fold(text: &str) -> String {
    let lowered = text.to_lowercase();
    if lowered.len() == text.len() {
        lowered
    } else {
        text.to_ascii_lowercase()
    }
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn all_offsets(haystack: &str, needle: &str, into: &mut BTreeSet<usize>) {
    if needle.is_empty() {
        return;
    }
    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        let at = from + found;
        into.insert(at);
        from = ceil_boundary(haystack, at + 1);
    }
}

/// Text around `[from, to)` widened by `radius`, snapped outward to
/// sentence ends, with ellipses where the transcript continues.
fn excerpt(transcript: &str, from: usize, to: usize, radius: usize) -> String {
    let len = transcript.len();
    let mut start = floor_boundary(transcript, from.saturating_sub(radius));
    let mut end = ceil_boundary(transcript, to.saturating_add(radius));

    if start > 0 {
        let look = floor_boundary(transcript, start.saturating_sub(SNAP_CHARS));
        if let Some(found) = transcript[look..start].rfind(is_terminator) {
            let at = look + found;
            if at > 0 {
                start = at + 1;
            }
        }
    }
    if end < len {
        let look = ceil_boundary(transcript, end + SNAP_CHARS);
        if let Some(found) = transcript[end..look].find(is_terminator) {
            end = end + found + 1;
        }
    }

    let mut snippet = transcript[start..end].trim().to_string();
    if start > 0 {
        snippet.insert_str(0, "...");
    }
    if end < len {
        snippet.push_str("...");
    }
    snippet
}

/// Two snippets overlap when their shared words make up at least half of
/// the smaller word set, or one contains the other.
pub fn snippets_overlap(a: &str, b: &str) -> bool {
    let a_trim = a.trim_matches('.');
    let b_trim = b.trim_matches('.');
    if a_trim.is_empty() || b_trim.is_empty() {
        return false;
    }
    if a_trim.contains(b_trim) || b_trim.contains(a_trim) {
        return true;
    }
    let words_a: BTreeSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: BTreeSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    let smaller = words_a.len().min(words_b.len());
    if smaller == 0 {
        return false;
    }
    let shared = words_a.intersection(&words_b).count();
    shared * 2 >= smaller
}

fn cap_combined(combined: String) -> String {
    if combined.len() <= MAX_COMBINED_CHARS {
        return combined;
    }
    let cut = floor_boundary(&combined, MAX_COMBINED_CHARS);
    let head = &combined[..cut];
    match head.rfind(is_terminator) {
        Some(at) if at > MIN_SNAPPED_CHARS => format!("{}...", &head[..=at]),
        _ => format!("{}...", head),
    }
}

fn leading_excerpt(transcript: &str) -> String {
    if transcript.len() <= FALLBACK_CHARS {
        return transcript.to_string();
    }
    let mut end = floor_boundary(transcript, FALLBACK_CHARS);
    let look_from = floor_boundary(transcript, FALLBACK_CHARS - 200);
    let look_to = ceil_boundary(transcript, FALLBACK_CHARS + 100);
    if let Some(found) = transcript[look_from..look_to].find('.') {
        end = look_from + found + 1;
    }
    let mut snippet = transcript[..end].to_string();
    if end < transcript.len() {
        snippet.push_str("...");
    }
    snippet
}

/// Evidence snippet for one talk plus the offset used for timestamp alignment
pub fn extract_snippet(transcript: &str, query: &str, keywords: &[String]) -> (String, Option<usize>) {
    let folded = fold(transcript);
    let folded_query = fold(query.trim());

    let anchor = folded
        .find(&folded_query)
        .filter(|_| !folded_query.is_empty())
        .or_else(|| keywords.iter().find_map(|kw| folded.find(kw.as_str())));

    let mut offsets = BTreeSet::new();
    for kw in keywords {
        all_offsets(&folded, kw, &mut offsets);
    }
    if TECHNICAL_TRIGGERS.iter().any(|t| folded_query.contains(t)) {
        for term in TECHNICAL_TERMS {
            all_offsets(&folded, term, &mut offsets);
        }
    }

    let mut snippets: Vec<String> = Vec::new();
    for &pos in offsets.iter().take(MAX_SNIPPET_ANCHORS) {
        let snippet = excerpt(transcript, pos, pos, WINDOW_CHARS);
        if !snippets.iter().any(|kept| snippets_overlap(&snippet, kept)) {
            snippets.push(snippet);
        }
    }

    let snippet = if !snippets.is_empty() {
        cap_combined(snippets[..snippets.len().min(MAX_JOINED_SNIPPETS)].join(" | "))
    } else if let Some(pos) = anchor {
        excerpt(transcript, pos, pos + folded_query.len(), WINDOW_CHARS)
    } else {
        leading_excerpt(transcript)
    };
    (snippet, anchor)
}

pub fn youtube_id_from_url(url: &str) -> Option<String> {
    YOUTUBE_ID.captures(url).map(|caps| caps[1].to_string())
}

fn is_youtube_url(url: &str) -> bool {
    url.to_lowercase().contains("youtube.com")
}

fn video_url(talk: &TalkRecord) -> Option<String> {
    if let Some(id) = talk.youtube_id.as_deref().filter(|id| !id.is_empty()) {
        return Some(format!("https://www.youtube.com/watch?v={}", id));
    }
    talk.url.clone().filter(|url| is_youtube_url(url))
}

fn video_link(talk: &TalkRecord, segment: &TranscriptSegment) -> String {
    let secs = segment.start_seconds.max(0.0) as u64;
    if let Some(id) = talk.youtube_id.as_deref().filter(|id| !id.is_empty()) {
        return format!("https://www.youtube.com/watch?v={}&t={}s", id, secs);
    }
    match talk.url.as_deref().filter(|url| is_youtube_url(url)) {
        Some(url) => match youtube_id_from_url(url) {
            Some(id) => format!("https://www.youtube.com/watch?v={}&t={}s", id, secs),
            None => format!("{}&t={}s", url, secs),
        },
        None => format!("#t={}", secs),
    }
}

fn build_result(talk: &TalkRecord, query: &str, keywords: &[String]) -> TranscriptResult {
    let (snippet, anchor) = extract_snippet(&talk.transcript, query, keywords);
    let segment = anchor.and_then(|pos| segment_at_offset(&talk.segments, pos));

    let mut result = TranscriptResult {
        title: talk.title.clone(),
        speakers: talk.speakers.iter().take(MAX_SPEAKERS).cloned().collect(),
        tags: talk.tags.iter().take(MAX_TAGS).cloned().collect(),
        description: talk.description.clone(),
        snippet,
        video_url: video_url(talk),
        transcript_length: talk.transcript.chars().count(),
        ..Default::default()
    };

    if let Some(segment) = segment {
        let start = if segment.start.is_empty() {
            format_clock(segment.start_seconds)
        } else {
            segment.start.clone()
        };
        result.timestamp = Some(start);
        result.timestamp_seconds = Some(segment.start_seconds);
        result.timestamp_end = Some(segment.end.clone()).filter(|end| !end.is_empty());
        result.video_link = Some(video_link(talk, segment));
    }
    result
}

/// Searches talk transcripts for quotable evidence
pub struct TranscriptRetriever {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl TranscriptRetriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(crate::config::DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<TranscriptResult>> {
        let terms = extract_terms(query);
        debug!(keywords = ?terms.keywords, speakers = ?terms.speakers, "transcript terms");

        let filter = TranscriptFilter::new(query, &terms.speakers, &terms.keywords);
        let talks = bounded(
            "transcript lookup",
            self.timeout,
            self.store.search_transcripts(&filter, limit),
        )
        .await?;

        Ok(talks
            .iter()
            .map(|talk| build_result(talk, query, &terms.keywords))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_terms_splits_speaker_from_keywords() {
        let terms = extract_terms("What did Jane Doe say about graph thinking?");
        assert_eq!(terms.speakers, vec!["Jane Doe"]);
        assert_eq!(terms.keywords, vec!["graph", "thinking"]);
    }

    #[test]
    fn test_extract_terms_without_speaker() {
        let terms = extract_terms("Which talks cover ontologies?");
        assert!(terms.speakers.is_empty());
        assert_eq!(terms.keywords, vec!["which", "talks", "cover", "ontologies"]);
    }

    #[test]
    fn test_single_word_speaker() {
        let terms = extract_terms("what did Paco say about arrow");
        assert_eq!(terms.speakers, vec!["Paco"]);
        assert_eq!(terms.keywords, vec!["arrow"]);
    }

    #[test]
    fn test_snippet_overlap() {
        let a = "graph thinking means seeing connections first";
        let b = "graph thinking means seeing links";
        assert!(snippets_overlap(a, b));
        assert!(snippets_overlap("...seeing connections...", "graph thinking means seeing connections first"));
        assert!(!snippets_overlap(a, "ontologies give meaning to data"));
    }

    #[test]
    fn test_nearby_keywords_collapse_to_one_snippet() {
        let transcript = "Welcome. Graph thinking is about connections.";
        let keywords = vec!["graph".to_string(), "thinking".to_string()];
        let (snippet, anchor) = extract_snippet(transcript, "graph thinking", &keywords);
        assert_eq!(snippet, transcript);
        assert_eq!(anchor, Some(9));
    }

    #[test]
    fn test_distant_matches_join_with_separator() {
        let filler: Vec<String> = (0..400).map(|i| format!("w{}.", i)).collect();
        let transcript = format!("Arrow is fast. {} Parquet is columnar.", filler.join(" "));
        let keywords = vec!["arrow".to_string(), "parquet".to_string()];
        let (snippet, anchor) = extract_snippet(&transcript, "arrow parquet", &keywords);
        assert_eq!(anchor, Some(0));
        assert!(snippet.contains(" | "));
        assert!(snippet.starts_with("Arrow is fast."));
        assert!(snippet.ends_with("Parquet is columnar."));
    }

    #[tokio::test]
    async fn test_overlapping_anchors_give_one_snippet() {
        let words = |range: std::ops::Range<usize>| {
            range.map(|i| format!("w{}.", i)).collect::<Vec<_>>().join(" ")
        };
        let transcript = format!(
            "{} Arrow is fast. {} Parquet is columnar. {}",
            words(0..300),
            words(300..350),
            words(350..700)
        );
        let talk = talkgraph_core::Node::titled(talkgraph_core::NodeType::Talk, "Columnar Formats")
            .with_transcript(transcript, vec![]);
        let store = talkgraph_core::MemoryGraphStore::new().with_node(talk);

        let results = TranscriptRetriever::new(Arc::new(store))
            .search("arrow parquet", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let snippet = &results[0].snippet;
        assert!(!snippet.contains(" | "), "{}", snippet);
        assert!(snippet.contains("Arrow is fast."));
        assert!(snippet.contains("Parquet is columnar."));
        assert!(snippet.starts_with("..."));
    }

    #[test]
    fn test_combined_snippet_is_capped() {
        let combined = "Graphs connect data sets together nicely. ".repeat(100);
        let capped = cap_combined(combined);
        assert!(capped.len() <= MAX_COMBINED_CHARS + 3);
        assert!(capped.ends_with("nicely...."));
    }

    #[test]
    fn test_fallback_uses_leading_text() {
        let transcript = "First sentence. ".repeat(100);
        let (snippet, anchor) = extract_snippet(&transcript, "unrelated", &["unrelated".to_string()]);
        assert!(anchor.is_none());
        assert!(snippet.starts_with("First sentence."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() < transcript.len());
    }

    #[test]
    fn test_video_links() {
        let segment = TranscriptSegment::new(75.4, 80.0, "text");
        let mut talk = TalkRecord {
            youtube_id: Some("abcdefghijk".into()),
            ..Default::default()
        };
        assert_eq!(
            video_link(&talk, &segment),
            "https://www.youtube.com/watch?v=abcdefghijk&t=75s"
        );

        talk.youtube_id = None;
        talk.url = Some("https://www.youtube.com/watch?v=ZYXWVUTSRQP".into());
        assert_eq!(
            video_link(&talk, &segment),
            "https://www.youtube.com/watch?v=ZYXWVUTSRQP&t=75s"
        );
        assert_eq!(video_url(&talk).as_deref(), Some("https://www.youtube.com/watch?v=ZYXWVUTSRQP"));

        talk.url = Some("https://example.org/talk".into());
        assert_eq!(video_link(&talk, &segment), "#t=75");
        assert!(video_url(&talk).is_none());
    }
}
