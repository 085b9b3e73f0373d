//! Heuristic query router
//!
//! Rules are checked in order against the lowercased query and the first
//! rule with a matching phrase decides the strategy. Anything unmatched
//! falls through to hybrid search.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Semantic,
    Graph,
    MultiHop,
    Hybrid,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Semantic => "semantic",
            QueryType::Graph => "graph",
            QueryType::MultiHop => "multi_hop",
            QueryType::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "semantic" => Ok(QueryType::Semantic),
            "graph" => Ok(QueryType::Graph),
            "multi_hop" | "multihop" => Ok(QueryType::MultiHop),
            "hybrid" => Ok(QueryType::Hybrid),
            other => Err(format!("unknown query type: {}", other)),
        }
    }
}

/// One routing rule: any of `phrases` present selects `query_type`
#[derive(Debug, Clone, Copy)]
pub struct ClassifierRule {
    pub phrases: &'static [&'static str],
    pub query_type: QueryType,
}

pub const DEFAULT_RULES: &[ClassifierRule] = &[
    // quotes and attribution need transcript evidence
    ClassifierRule {
        phrases: &["what did", "say about", "mentioned", "said", "quote"],
        query_type: QueryType::Hybrid,
    },
    ClassifierRule {
        phrases: &[
            "how is",
            "related to",
            "connected to",
            "path between",
            "relationship between",
            "are related",
        ],
        query_type: QueryType::MultiHop,
    },
    ClassifierRule {
        phrases: &["what talks did", "who gave", "speaker", " by ", "talks by", "gave"],
        query_type: QueryType::Graph,
    },
    ClassifierRule {
        phrases: &["discuss", "talks about", "topics", "about", "related topics"],
        query_type: QueryType::Semantic,
    },
];

pub fn classify(query: &str) -> QueryType {
    classify_with(DEFAULT_RULES, query)
}

pub fn classify_with(rules: &[ClassifierRule], query: &str) -> QueryType {
    let lowered = query.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.phrases.iter().any(|phrase| lowered.contains(phrase)))
        .map(|rule| rule.query_type)
        .unwrap_or(QueryType::Hybrid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routing() {
        assert_eq!(classify("What did Jane Doe say about graph thinking?"), QueryType::Hybrid);
        assert_eq!(classify("How is ontology related to data catalogs?"), QueryType::MultiHop);
        assert_eq!(classify("Who gave the keynote?"), QueryType::Graph);
        assert_eq!(classify("Show me talks by John Smith"), QueryType::Graph);
        assert_eq!(classify("Which talks discuss semantic layers"), QueryType::Semantic);
        assert_eq!(classify("knowledge graphs"), QueryType::Hybrid);
    }

    #[test]
    fn test_first_rule_wins() {
        // matches both the attribution and topical rules
        assert_eq!(classify("what did the panel discuss"), QueryType::Hybrid);
        // relational beats the speaker rule
        assert_eq!(classify("how is the speaker connected to Acme"), QueryType::MultiHop);
    }

    #[test]
    fn test_reordered_rules_change_precedence() {
        let reordered = [DEFAULT_RULES[3], DEFAULT_RULES[0]];
        assert_eq!(
            classify_with(&reordered, "what did the panel discuss"),
            QueryType::Semantic
        );
    }

    #[test]
    fn test_query_type_serde_and_parse() {
        assert_eq!(serde_json::to_string(&QueryType::MultiHop).unwrap(), "\"multi_hop\"");
        assert_eq!("multi-hop".parse::<QueryType>().unwrap(), QueryType::MultiHop);
        assert!("nonsense".parse::<QueryType>().is_err());
    }
}
