//! Context assembly and confidence scoring
//!
//! Retrieved evidence is rendered into fixed, ordered sections for the
//! generator. Each section is omitted when it has no entries.

use std::collections::HashSet;
use talkgraph_core::conversation::last_turns;
use talkgraph_core::{
    CommunityMember, ConversationTurn, GraphConnection, KeywordMatch, MessageRole, MultiHopPath,
    NodeType, SemanticResult, TranscriptResult,
};

pub const SEMANTIC_HEADER: &str = "=== Relevant Content (Semantic Search) ===\n";
pub const KEYWORD_HEADER: &str = "\n=== Keyword Matches ===\n";
pub const TRANSCRIPT_HEADER: &str = "\n=== Transcript Content (Direct Quotes Available) ===\n";
pub const GRAPH_HEADER: &str = "\n=== Related Connections ===\n";
pub const PATHS_HEADER: &str = "\n=== Connection Paths ===\n";
pub const COMMUNITY_HEADER: &str = "\n=== Community Context ===\n";

const MAX_SEMANTIC: usize = 5;
const MAX_KEYWORD: usize = 3;
const MAX_TRANSCRIPT: usize = 8;
const MAX_GRAPH: usize = 5;
const MAX_COMMUNITY_NAMES: usize = 5;
const DESCRIPTION_CHARS: usize = 200;
const EXCERPT_CHARS: usize = 1200;
const EXCERPT_SNAP_FROM: usize = 1000;

/// Everything retrieved for one question
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub semantic: Vec<SemanticResult>,
    pub keyword: Vec<KeywordMatch>,
    pub transcript: Vec<TranscriptResult>,
    pub graph: Vec<GraphConnection>,
    pub paths: Vec<MultiHopPath>,
    /// Community members per top semantic hit, in hit order
    pub communities: Vec<Vec<CommunityMember>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub confidence: f32,
}

/// Score in [0, 1]. Similarity contributes 0.3 at most; transcripts 0.4
/// (+0.1 when several); graph connections 0.2; paths 0.1.
pub fn confidence(evidence: &Evidence) -> f32 {
    let mut score = 0.0f32;
    if !evidence.semantic.is_empty() {
        let mean = evidence.semantic.iter().map(|r| r.similarity_score).sum::<f32>()
            / evidence.semantic.len() as f32;
        score += mean.max(0.0) * 0.3;
    }
    if !evidence.transcript.is_empty() {
        score += 0.4;
        if evidence.transcript.len() > 1 {
            score += 0.1;
        }
    }
    if !evidence.graph.is_empty() {
        score += 0.2;
    }
    if !evidence.paths.is_empty() {
        score += 0.1;
    }
    score.min(1.0)
}

/// Make graph-notation talk titles readable
pub fn clean_title(title: &str) -> String {
    title
        .replace(
            "(DataCatalog)_-[poweredBy]-_(KnowledgeGraph)",
            "DataCatalog powered by Knowledge Graph",
        )
        .replace("_-[", " ")
        .replace("]-_", " ")
}

fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

fn clock(seconds: f64) -> String {
    let total = seconds as u64;
    let (minutes, secs) = (total / 60, total % 60);
    if minutes >= 60 {
        format!("{}:{:02}:{:02}", minutes / 60, minutes % 60, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn shorten_excerpt(snippet: &str) -> String {
    if snippet.chars().count() <= EXCERPT_CHARS {
        return snippet.to_string();
    }
    let head = prefix_chars(snippet, EXCERPT_CHARS);
    let floor = prefix_chars(snippet, EXCERPT_SNAP_FROM).len();
    match head.rfind(['.', '!', '?']) {
        Some(at) if at > floor => format!("{}...", &head[..=at]),
        _ => format!("{}...", head),
    }
}

fn meta_list(result: &SemanticResult, field: &str, take: usize) -> String {
    match result.metadata.get(field) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .take(take)
            .collect::<Vec<_>>()
            .join(", "),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn semantic_entry(i: usize, result: &SemanticResult) -> String {
    let score = result.similarity_score;
    match result.node_type {
        NodeType::Talk => {
            let description = result.meta_str("description").unwrap_or("N/A");
            format!(
                "{}. Talk: {}\n   Speaker: {}\n   Category: {}\n   Description: {}...\n   Relevance: {:.3}\n",
                i,
                clean_title(result.meta_str("title").unwrap_or("N/A")),
                result.meta_str("speaker").unwrap_or("Unknown"),
                result.meta_str("category").unwrap_or("N/A"),
                prefix_chars(description, DESCRIPTION_CHARS),
                score
            )
        }
        NodeType::Speaker => format!(
            "{}. Speaker: {}\n   Talks: {}\n   Relevance: {:.3}\n",
            i,
            result.meta_str("name").unwrap_or("N/A"),
            meta_list(result, "talks", 3),
            score
        ),
        NodeType::Tag => format!(
            "{}. Tag: {}\n   Relevance: {:.3}\n",
            i,
            result.meta_str("keyword").unwrap_or("N/A"),
            score
        ),
        other => format!(
            "{}. {}: {}\n   Relevance: {:.3}\n",
            i,
            other,
            result.identity().unwrap_or("N/A"),
            score
        ),
    }
}

fn transcript_entry(i: usize, result: &TranscriptResult) -> String {
    let mut out = format!(
        "{}. Talk: {}\n   Speakers: {}\n",
        i,
        clean_title(&result.title),
        result.speakers.join(", ")
    );
    if let Some(timestamp) = &result.timestamp {
        match result.timestamp_seconds.filter(|s| *s > 0.0) {
            Some(seconds) => out.push_str(&format!(
                "   Timestamp: {} (or {} or {}s)\n",
                timestamp,
                clock(seconds),
                seconds as u64
            )),
            None => out.push_str(&format!("   Timestamp: {}\n", timestamp)),
        }
    }
    if let Some(link) = &result.video_link {
        out.push_str(&format!("   Video Link: {}\n", link));
    } else if let Some(url) = &result.video_url {
        out.push_str(&format!("   Video URL: {}\n", url));
    }
    out.push_str(&format!(
        "   Transcript excerpt: {}\n   Tags: {}\n",
        shorten_excerpt(&result.snippet),
        result.tags.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
    ));
    out
}

pub fn assemble(evidence: &Evidence) -> AssembledContext {
    let mut parts: Vec<String> = Vec::new();

    if !evidence.semantic.is_empty() {
        parts.push(SEMANTIC_HEADER.to_string());
        for (i, result) in evidence.semantic.iter().take(MAX_SEMANTIC).enumerate() {
            parts.push(semantic_entry(i + 1, result));
        }
    }

    if !evidence.keyword.is_empty() {
        parts.push(KEYWORD_HEADER.to_string());
        for (i, hit) in evidence.keyword.iter().take(MAX_KEYWORD).enumerate() {
            parts.push(format!(
                "{}. {}\n   By: {}\n   Tags: {}\n",
                i + 1,
                clean_title(&hit.title),
                hit.speaker.as_deref().unwrap_or("Unknown"),
                hit.tags.join(", ")
            ));
        }
    }

    if !evidence.transcript.is_empty() {
        parts.push(TRANSCRIPT_HEADER.to_string());
        for (i, result) in evidence.transcript.iter().take(MAX_TRANSCRIPT).enumerate() {
            parts.push(transcript_entry(i + 1, result));
        }
    }

    if !evidence.graph.is_empty() {
        parts.push(GRAPH_HEADER.to_string());
        for (i, conn) in evidence.graph.iter().take(MAX_GRAPH).enumerate() {
            parts.push(format!(
                "{}. {} --[{}]--> {}\n",
                i + 1,
                conn.source_identity,
                conn.relationship,
                conn.neighbor_identity
            ));
        }
    }

    if !evidence.paths.is_empty() {
        parts.push(PATHS_HEADER.to_string());
        for (i, path) in evidence.paths.iter().enumerate() {
            parts.push(format!("{}. {}\n", i + 1, path.render()));
        }
    }

    let mut seen_communities = HashSet::new();
    for members in &evidence.communities {
        let Some(first) = members.first() else {
            continue;
        };
        if !seen_communities.insert(first.community_id.clone()) {
            continue;
        }
        let names: Vec<&str> = members
            .iter()
            .take(MAX_COMMUNITY_NAMES)
            .map(|m| m.name.as_str())
            .collect();
        parts.push(format!(
            "{}Related entities in the same community: {}\n",
            COMMUNITY_HEADER,
            names.join(", ")
        ));
    }

    AssembledContext {
        text: parts.join("\n"),
        confidence: confidence(evidence),
    }
}

/// Generator instructions wrapped around the assembled context
pub fn build_prompt(query: &str, context: &str, history: &[ConversationTurn]) -> String {
    let mut history_section = String::new();
    let recent = last_turns(history, crate::inference::HISTORY_TURNS_FOR_GENERATION);
    if !recent.is_empty() {
        history_section.push_str("\n=== Previous Conversation ===\n");
        for turn in recent {
            match turn.role {
                MessageRole::User => history_section.push_str(&format!("User: {}\n", turn.content)),
                MessageRole::Assistant => {
                    history_section.push_str(&format!("Assistant: {}\n", turn.content))
                }
                MessageRole::System => {}
            }
        }
        history_section.push_str(
            "\nThis may be a follow-up question. Read it in light of the conversation above.\n",
        );
    }

    format!(
        "You answer questions about conference talks, their speakers and the topics they cover.\n\
{history_section}\n\
Answer from the context below. Be direct and specific, and name the talk and speaker behind each claim.\n\
\n\
Formatting:\n\
- Rewrite graph notation in titles as plain words\n\
- Use \"- \" bullets for lists and no bold or italic markup\n\
- Keep paragraphs to two or three sentences\n\
- If the context is not enough, say so briefly at the end\n\
\n\
Transcripts:\n\
- Quote and summarize the transcript excerpts directly; combine every excerpt from the same talk\n\
- An excerpt ending in \"...\" is still usable; do not speculate about missing parts\n\
- Cite quotes as: In <talk title>, <speaker> said: '<quote>'\n\
\n\
Timestamps:\n\
- Mention them only when the question asks where or when something was said\n\
- Write them as minutes and seconds, e.g. \"at 5:23\"\n\
\n\
Context:\n\
{context}\n\
\n\
Question: {query}\n"
    )
}
