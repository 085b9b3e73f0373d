//! Transcript types - time-coded segments and talk records with transcripts

use serde::{Deserialize, Serialize};

/// One time-coded slice of a talk transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    /// Human-readable start timestamp, e.g. "12:04"
    #[serde(default)]
    pub start: String,

    #[serde(default)]
    pub end: String,

    pub start_seconds: f64,

    pub end_seconds: f64,

    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start: format_clock(start_seconds),
            end: format_clock(end_seconds),
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }
}

/// Render seconds as `mm:ss`, or `h:mm:ss` past the hour
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Find the segment covering character `offset` of the transcript formed by
/// joining every segment's text with a single space.
///
/// An offset on a joining space belongs to the following segment; offsets
/// past the end have no segment.
pub fn segment_at_offset(
    segments: &[TranscriptSegment],
    offset: usize,
) -> Option<&TranscriptSegment> {
    let mut position = 0usize;
    for segment in segments {
        let span_end = position + segment.text.len();
        if offset < span_end {
            return Some(segment);
        }
        // one joining space
        position = span_end + 1;
    }
    None
}

/// A talk as read for transcript retrieval: transcript plus its
/// speakers, tags and video identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TalkRecord {
    pub key: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub transcript: String,

    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    #[serde(default)]
    pub youtube_id: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub speakers: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Which talks a transcript search returns and how they rank.
///
/// All fields are lowercased. With both speakers and keywords present a
/// talk must match one of each; with neither, any talk with a transcript
/// qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptFilter {
    pub query: String,
    pub speakers: Vec<String>,
    pub keywords: Vec<String>,
}

impl TranscriptFilter {
    pub fn new(query: &str, speakers: &[String], keywords: &[String]) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            speakers: speakers.iter().map(|s| s.to_lowercase()).collect(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn speaker_matches(&self, talk: &TalkRecord) -> bool {
        talk.speakers.iter().any(|speaker| {
            let speaker = speaker.to_lowercase();
            self.speakers.iter().any(|candidate| speaker.contains(candidate.as_str()))
        })
    }

    fn keyword_matches(&self, talk: &TalkRecord) -> bool {
        let transcript = talk.transcript.to_lowercase();
        let title = talk.title.to_lowercase();
        self.keywords
            .iter()
            .any(|kw| transcript.contains(kw.as_str()) || title.contains(kw.as_str()))
    }

    pub fn matches(&self, talk: &TalkRecord) -> bool {
        if talk.transcript.trim().is_empty() {
            return false;
        }
        match (self.speakers.is_empty(), self.keywords.is_empty()) {
            (false, false) => self.speaker_matches(talk) && self.keyword_matches(talk),
            (true, false) => self.keyword_matches(talk),
            (false, true) => self.speaker_matches(talk),
            (true, true) => true,
        }
    }

    /// 1 exact title, 2 title contains the query, 3 transcript contains
    /// it, 4 anything else
    pub fn priority(&self, talk: &TalkRecord) -> u8 {
        let title = talk.title.to_lowercase();
        if title == self.query {
            1
        } else if title.contains(&self.query) {
            2
        } else if talk.transcript.to_lowercase().contains(&self.query) {
            3
        } else {
            4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, 4.5, "hello there"),
            TranscriptSegment::new(4.5, 9.0, "graphs are great"),
            TranscriptSegment::new(9.0, 3725.0, "the end"),
        ]
    }

    #[test]
    fn test_segment_at_offset() {
        let segs = segments();
        // "hello there graphs are great the end"
        assert_eq!(segment_at_offset(&segs, 0).unwrap().text, "hello there");
        assert_eq!(segment_at_offset(&segs, 12).unwrap().text, "graphs are great");
        assert_eq!(segment_at_offset(&segs, 29).unwrap().text, "the end");
        assert_eq!(segment_at_offset(&segs, 11).unwrap().text, "graphs are great");
        assert!(segment_at_offset(&segs, 500).is_none());
        assert!(segment_at_offset(&[], 3).is_none());
    }

    #[test]
    fn test_filter_requires_speaker_and_keyword() {
        let talk = TalkRecord {
            title: "Graph Thinking".into(),
            transcript: "Graphs everywhere.".into(),
            speakers: vec!["Jane Doe".into()],
            ..Default::default()
        };
        let filter = |speakers: &[&str], keywords: &[&str]| {
            let speakers: Vec<String> = speakers.iter().map(|s| s.to_string()).collect();
            let keywords: Vec<String> = keywords.iter().map(|s| s.to_string()).collect();
            TranscriptFilter::new("q", &speakers, &keywords)
        };
        assert!(filter(&["Jane"], &["graphs"]).matches(&talk));
        assert!(!filter(&["John"], &["graphs"]).matches(&talk));
        assert!(!filter(&["Jane"], &["ontology"]).matches(&talk));
        assert!(filter(&[], &[]).matches(&talk));

        let silent = TalkRecord {
            transcript: "  ".into(),
            ..talk
        };
        assert!(!filter(&[], &[]).matches(&silent));
    }

    #[test]
    fn test_priority_prefers_title_match() {
        let talk = TalkRecord {
            title: "Graph Thinking".into(),
            transcript: "about graph thinking".into(),
            ..Default::default()
        };
        let priority = |query: &str| TranscriptFilter::new(query, &[], &[]).priority(&talk);
        assert_eq!(priority("Graph Thinking"), 1);
        assert_eq!(priority("graph"), 2);
        assert_eq!(priority("about graph"), 3);
        assert_eq!(priority("ontology"), 4);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(65.0), "01:05");
        assert_eq!(format_clock(3725.0), "1:02:05");
        assert_eq!(segments()[2].end, "1:02:05");
    }
}
