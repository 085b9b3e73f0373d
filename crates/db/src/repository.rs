//! Repository pattern for database operations

use crate::schema::{edge_table, NODE_TABLE};
use crate::{DbConnection, DbError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use surrealdb_types::SurrealValue;
use talkgraph_core::{
    Adjacent, GraphSnapshot, GraphStore, IdentityMatch, KeywordMatch, Node, NodeRef, NodeType,
    Relationship, TalkRecord, TranscriptFilter, TranscriptSegment,
};
use tracing::{debug, info, instrument};

const NODE_REF_FIELDS: &str = "key, node_type, name, title, keyword";

/// Speaker names of the talk in scope
const SPEAKER_NAMES: &str =
    "array::distinct(<->gives_talk<->node[WHERE node_type = 'Speaker' AND name != NONE].name)";

/// Tag keywords of the talk in scope
const TAG_KEYWORDS: &str =
    "array::distinct(<->is_described_by<->node[WHERE node_type = 'Tag' AND keyword != NONE].keyword)";

const MAX_KEYWORD_TAGS: usize = 5;

/// Repository for all database operations
#[derive(Clone)]
pub struct Repository {
    db: DbConnection,
}

impl Repository {
    /// Create a new repository
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    // ==========================================
    // WRITE OPERATIONS (import only)
    // ==========================================

    /// Create or replace a node, keyed by its `key`. Replacing keeps the
    /// record id, so edges to the node survive.
    #[instrument(skip(self, node), fields(key = %node.key))]
    pub async fn upsert_node(&self, node: Node) -> Result<Node> {
        let node = node.validate()?;
        let row = NodeRow::from_node(&node)?;
        self.db
            .query(format!(
                "LET $existing = (SELECT VALUE id FROM {NODE_TABLE} WHERE key = $key)[0];
                 IF $existing {{ UPDATE $existing CONTENT $row }}
                 ELSE {{ CREATE {NODE_TABLE} CONTENT $row }};"
            ))
            .bind(("key", node.key.clone()))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(node)
    }

    /// Relate two existing nodes through the edge table for the
    /// relationship type
    #[instrument(skip(self, relationship), fields(rel_type = %relationship.rel_type))]
    pub async fn create_relationship(&self, relationship: Relationship) -> Result<()> {
        let table = edge_table(&relationship.rel_type)?;
        let keys = vec![relationship.from_key.clone(), relationship.to_key.clone()];
        let found = self.nodes_by_keys(&keys).await?;
        for key in &keys {
            if !found.iter().any(|n| &n.key == key) {
                return Err(DbError::NotFound("node".into(), key.clone()));
            }
        }

        let properties = match &relationship.properties {
            serde_json::Value::Null => None,
            value => Some(serde_json::to_string(value)?),
        };
        self.db
            .query(format!(
                "LET $from = (SELECT VALUE id FROM {NODE_TABLE} WHERE key = $from_key)[0];
                 LET $to = (SELECT VALUE id FROM {NODE_TABLE} WHERE key = $to_key)[0];
                 RELATE $from->{table}->$to CONTENT {{ rel_type: $rel_type, properties: $properties }};"
            ))
            .bind(("from_key", relationship.from_key))
            .bind(("to_key", relationship.to_key))
            .bind(("rel_type", relationship.rel_type))
            .bind(("properties", properties))
            .await?
            .check()?;
        Ok(())
    }

    /// Load a whole graph snapshot
    #[instrument(skip(self, snapshot))]
    pub async fn import_snapshot(&self, snapshot: GraphSnapshot) -> Result<ImportSummary> {
        let snapshot = snapshot.validated()?;
        info!(
            "Importing {} nodes and {} relationships",
            snapshot.nodes.len(),
            snapshot.relationships.len()
        );

        let mut summary = ImportSummary::default();
        for node in snapshot.nodes {
            self.upsert_node(node).await?;
            summary.nodes += 1;
        }
        for relationship in snapshot.relationships {
            self.create_relationship(relationship).await?;
            summary.relationships += 1;
        }
        Ok(summary)
    }

    /// Delete every node and every edge touching one
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        self.db
            .query(format!(
                "LET $edges = array::distinct(array::flatten((SELECT VALUE <->? FROM {NODE_TABLE})));
                 DELETE $edges;
                 DELETE {NODE_TABLE};"
            ))
            .await?
            .check()?;
        Ok(())
    }

    // ==========================================
    // STATS
    // ==========================================

    /// Get database statistics
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<GraphStats> {
        let by_type: Vec<TypeCount> = self
            .db
            .query(format!(
                "SELECT node_type, count() AS count FROM {NODE_TABLE} GROUP BY node_type"
            ))
            .await?
            .take(0)?;

        let out_degrees: Vec<i64> = self
            .db
            .query(format!("SELECT VALUE array::len(->?) FROM {NODE_TABLE}"))
            .await?
            .take(0)?;
        let talks_with_transcripts = self
            .count(&format!(
                "SELECT count() AS count FROM {NODE_TABLE} \
                 WHERE node_type = 'Talk' AND string::len(transcript ?? '') > 0 GROUP ALL"
            ))
            .await?;
        let youtube_videos = self
            .count(&format!(
                "SELECT count() AS count FROM {NODE_TABLE} \
                 WHERE node_type = 'Talk' AND youtube_id != NONE GROUP ALL"
            ))
            .await?;

        let nodes_by_type: BTreeMap<String, i64> =
            by_type.into_iter().map(|t| (t.node_type, t.count)).collect();

        Ok(GraphStats {
            total_nodes: nodes_by_type.values().sum(),
            communities: nodes_by_type
                .get(NodeType::Community.as_str())
                .copied()
                .unwrap_or(0),
            nodes_by_type,
            relationships: out_degrees.iter().sum(),
            talks_with_transcripts,
            youtube_videos,
        })
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let rows: Vec<CountRow> = self.db.query(sql).await?.take(0)?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }

    async fn neighbor_rows(&self, keys: &[String]) -> Result<Vec<EdgeRow>> {
        let rows: Vec<EdgeRow> = self
            .db
            .query(format!(
                "LET $edges = array::distinct(array::flatten(
                     (SELECT VALUE <->? FROM {NODE_TABLE} WHERE key IN $keys)
                 ));
                 SELECT rel_type,
                     in.key AS from_key, in.node_type AS from_type, in.name AS from_name,
                     in.title AS from_title, in.keyword AS from_keyword,
                     out.key AS to_key, out.node_type AS to_type, out.name AS to_name,
                     out.title AS to_title, out.keyword AS to_keyword
                 FROM $edges;"
            ))
            .bind(("keys", keys.to_vec()))
            .await?
            .take(1)?;
        Ok(rows)
    }

    async fn transcript_rows(&self, filter: &TranscriptFilter, limit: usize) -> Result<Vec<TalkRow>> {
        // One bound parameter per term; only the placeholder names are
        // generated, never the values.
        let speaker_condition = (0..filter.speakers.len())
            .map(|i| {
                format!("string::contains(string::lowercase(array::join({SPEAKER_NAMES}, '\\n')), $sp{i})")
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let keyword_condition = (0..filter.keywords.len())
            .map(|i| {
                format!(
                    "string::contains(string::lowercase(transcript), $kw{i}) \
                     OR string::contains(string::lowercase(title ?? ''), $kw{i})"
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let condition = match (speaker_condition.is_empty(), keyword_condition.is_empty()) {
            (false, false) => format!("AND ({speaker_condition}) AND ({keyword_condition})"),
            (true, false) => format!("AND ({keyword_condition})"),
            (false, true) => format!("AND ({speaker_condition})"),
            (true, true) => String::new(),
        };

        let mut query = self
            .db
            .query(format!(
                "SELECT key, title, description, category, transcript, transcript_segments,
                     youtube_id, url, speakers, tags
                 FROM (SELECT key, title, description, category, transcript, transcript_segments,
                     youtube_id, url,
                     string::len(transcript) AS transcript_length,
                     {SPEAKER_NAMES} AS speakers,
                     {TAG_KEYWORDS} AS tags,
                     IF string::lowercase(title ?? '') = $query THEN 1
                     ELSE IF string::contains(string::lowercase(title ?? ''), $query) THEN 2
                     ELSE IF string::contains(string::lowercase(transcript), $query) THEN 3
                     ELSE 4 END AS priority
                 FROM {NODE_TABLE}
                 WHERE node_type = 'Talk'
                     AND string::len(string::trim(transcript ?? '')) > 0
                     {condition}
                 ORDER BY priority ASC, transcript_length DESC
                 LIMIT $limit)"
            ))
            .bind(("query", filter.query.clone()))
            .bind(("limit", limit as i64));
        for (i, speaker) in filter.speakers.iter().enumerate() {
            query = query.bind((format!("sp{i}"), speaker.clone()));
        }
        for (i, kw) in filter.keywords.iter().enumerate() {
            query = query.bind((format!("kw{i}"), kw.clone()));
        }
        Ok(query.await?.take(0)?)
    }
}

#[async_trait]
impl GraphStore for Repository {
    #[instrument(skip(self))]
    async fn find_nodes(
        &self,
        needle: &str,
        mode: IdentityMatch,
    ) -> talkgraph_core::Result<Vec<NodeRef>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let condition = match mode {
            IdentityMatch::Exact => {
                "string::lowercase(name ?? '') = $needle \
                 OR string::lowercase(title ?? '') = $needle \
                 OR string::lowercase(keyword ?? '') = $needle"
            }
            IdentityMatch::Contains => {
                "string::contains(string::lowercase(name ?? ''), $needle) \
                 OR string::contains(string::lowercase(title ?? ''), $needle) \
                 OR string::contains(string::lowercase(keyword ?? ''), $needle)"
            }
        };

        let rows: Vec<NodeRefRow> = self
            .db
            .query(format!(
                "SELECT {NODE_REF_FIELDS} FROM {NODE_TABLE} WHERE {condition}"
            ))
            .bind(("needle", needle))
            .await
            .map_err(DbError::from)?
            .take(0)
            .map_err(DbError::from)?;

        debug!("Resolved {} nodes", rows.len());
        Ok(rows.into_iter().map(NodeRef::from).collect())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn nodes_by_keys(&self, keys: &[String]) -> talkgraph_core::Result<Vec<NodeRef>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<NodeRefRow> = self
            .db
            .query(format!(
                "SELECT {NODE_REF_FIELDS} FROM {NODE_TABLE} WHERE key IN $keys"
            ))
            .bind(("keys", keys.to_vec()))
            .await
            .map_err(DbError::from)?
            .take(0)
            .map_err(DbError::from)?;
        Ok(rows.into_iter().map(NodeRef::from).collect())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn neighbors(&self, keys: &[String]) -> talkgraph_core::Result<Vec<Adjacent>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.neighbor_rows(keys).await?;

        let mut adjacent = Vec::new();
        for row in rows {
            let from = row.source();
            let to = row.target();
            if keys.contains(&from.key) {
                adjacent.push(Adjacent {
                    origin: from.key.clone(),
                    rel_type: row.rel_type.clone(),
                    outgoing: true,
                    node: to.clone(),
                });
            }
            if keys.contains(&to.key) && to.key != from.key {
                adjacent.push(Adjacent {
                    origin: to.key,
                    rel_type: row.rel_type,
                    outgoing: false,
                    node: from,
                });
            }
        }
        Ok(adjacent)
    }

    #[instrument(skip(self, filter))]
    async fn search_transcripts(
        &self,
        filter: &TranscriptFilter,
        limit: usize,
    ) -> talkgraph_core::Result<Vec<TalkRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = self.transcript_rows(filter, limit).await?;
        debug!("{} talks passed the transcript filter", rows.len());
        Ok(rows.into_iter().map(TalkRecord::from).collect())
    }

    #[instrument(skip(self))]
    async fn search_talks_by_keyword(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> talkgraph_core::Result<Vec<KeywordMatch>> {
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let condition = (0..keywords.len())
            .map(|i| {
                format!(
                    "string::contains(string::lowercase(title ?? ''), $kw{i}) \
                     OR string::contains(string::lowercase(description ?? ''), $kw{i}) \
                     OR string::contains(string::lowercase(category ?? ''), $kw{i})"
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut query = self
            .db
            .query(format!(
                "SELECT title, description, category,
                     {SPEAKER_NAMES} AS speakers,
                     {TAG_KEYWORDS} AS tags
                 FROM {NODE_TABLE}
                 WHERE node_type = 'Talk' AND ({condition})
                 LIMIT $limit"
            ))
            .bind(("limit", limit as i64));
        for (i, kw) in keywords.iter().enumerate() {
            query = query.bind((format!("kw{i}"), kw.to_lowercase()));
        }
        let rows: Vec<KeywordRow> = query
            .await
            .map_err(DbError::from)?
            .take(0)
            .map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| KeywordMatch {
                title: row.title.unwrap_or_else(|| "Unknown".to_string()),
                description: row.description,
                category: row.category,
                speaker: row.speakers.into_iter().next(),
                tags: row.tags.into_iter().take(MAX_KEYWORD_TAGS).collect(),
            })
            .collect())
    }
}

// ==========================================
// ROW TYPES
// ==========================================

#[derive(Debug, Clone, SurrealValue)]
struct SegmentRow {
    start: String,
    end: String,
    start_seconds: f64,
    end_seconds: f64,
    text: String,
}

impl From<&TranscriptSegment> for SegmentRow {
    fn from(segment: &TranscriptSegment) -> Self {
        Self {
            start: segment.start.clone(),
            end: segment.end.clone(),
            start_seconds: segment.start_seconds,
            end_seconds: segment.end_seconds,
            text: segment.text.clone(),
        }
    }
}

impl From<SegmentRow> for TranscriptSegment {
    fn from(row: SegmentRow) -> Self {
        Self {
            start: row.start,
            end: row.end,
            start_seconds: row.start_seconds,
            end_seconds: row.end_seconds,
            text: row.text,
        }
    }
}

/// A node as written; free-form properties are kept as JSON text
#[derive(Debug, Clone, SurrealValue)]
struct NodeRow {
    key: String,
    node_type: String,
    name: Option<String>,
    title: Option<String>,
    keyword: Option<String>,
    description: Option<String>,
    category: Option<String>,
    transcript: Option<String>,
    transcript_segments: Vec<SegmentRow>,
    youtube_id: Option<String>,
    url: Option<String>,
    properties: Option<String>,
}

impl NodeRow {
    fn from_node(node: &Node) -> Result<Self> {
        let properties = match &node.properties {
            serde_json::Value::Null => None,
            value => Some(serde_json::to_string(value)?),
        };
        Ok(Self {
            key: node.key.clone(),
            node_type: node.node_type.as_str().to_string(),
            name: node.name.clone(),
            title: node.title.clone(),
            keyword: node.keyword.clone(),
            description: node.description.clone(),
            category: node.category.clone(),
            transcript: node.transcript.clone(),
            transcript_segments: node.transcript_segments.iter().map(SegmentRow::from).collect(),
            youtube_id: node.youtube_id.clone(),
            url: node.url.clone(),
            properties,
        })
    }
}

#[derive(Debug, Clone, SurrealValue)]
struct NodeRefRow {
    key: String,
    node_type: String,
    name: Option<String>,
    title: Option<String>,
    keyword: Option<String>,
}

impl From<NodeRefRow> for NodeRef {
    fn from(row: NodeRefRow) -> Self {
        Self {
            key: row.key,
            node_type: NodeType::from_label(&row.node_type),
            name: row.name,
            title: row.title,
            keyword: row.keyword,
        }
    }
}

/// An edge flattened with both endpoints
#[derive(Debug, Clone, SurrealValue)]
struct EdgeRow {
    rel_type: String,
    from_key: String,
    from_type: String,
    from_name: Option<String>,
    from_title: Option<String>,
    from_keyword: Option<String>,
    to_key: String,
    to_type: String,
    to_name: Option<String>,
    to_title: Option<String>,
    to_keyword: Option<String>,
}

impl EdgeRow {
    fn source(&self) -> NodeRef {
        NodeRef {
            key: self.from_key.clone(),
            node_type: NodeType::from_label(&self.from_type),
            name: self.from_name.clone(),
            title: self.from_title.clone(),
            keyword: self.from_keyword.clone(),
        }
    }

    fn target(&self) -> NodeRef {
        NodeRef {
            key: self.to_key.clone(),
            node_type: NodeType::from_label(&self.to_type),
            name: self.to_name.clone(),
            title: self.to_title.clone(),
            keyword: self.to_keyword.clone(),
        }
    }
}

#[derive(Debug, Clone, SurrealValue)]
struct TalkRow {
    key: String,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    transcript: Option<String>,
    transcript_segments: Option<Vec<SegmentRow>>,
    youtube_id: Option<String>,
    url: Option<String>,
    speakers: Vec<String>,
    tags: Vec<String>,
}

impl From<TalkRow> for TalkRecord {
    fn from(row: TalkRow) -> Self {
        Self {
            key: row.key,
            title: row.title.unwrap_or_else(|| "Unknown".to_string()),
            description: row.description,
            category: row.category,
            transcript: row.transcript.unwrap_or_default(),
            segments: row
                .transcript_segments
                .unwrap_or_default()
                .into_iter()
                .map(TranscriptSegment::from)
                .collect(),
            youtube_id: row.youtube_id,
            url: row.url,
            speakers: row.speakers,
            tags: row.tags,
        }
    }
}

#[derive(Debug, Clone, SurrealValue)]
struct KeywordRow {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    speakers: Vec<String>,
    tags: Vec<String>,
}

#[derive(Debug, Clone, SurrealValue)]
struct TypeCount {
    node_type: String,
    count: i64,
}

#[derive(Debug, Clone, SurrealValue)]
struct CountRow {
    count: i64,
}

// ==========================================
// RESULT TYPES
// ==========================================

/// Counts reported by `talkgraph stats`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphStats {
    pub total_nodes: i64,
    pub nodes_by_type: BTreeMap<String, i64>,
    pub relationships: i64,
    pub talks_with_transcripts: i64,
    pub youtube_videos: i64,
    pub communities: i64,
}

/// What an import wrote
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub nodes: usize,
    pub relationships: usize,
}
