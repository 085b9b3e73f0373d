//! SurrealDB schema definitions

use crate::{DbConnection, DbError, Result};
use talkgraph_core::rel;
use tracing::info;

/// Table holding every graph node, whatever its label
pub const NODE_TABLE: &str = "node";

/// Embedding vectors, one row per position in the mapping
pub const EMBEDDING_TABLE: &str = "embedding";

/// IVF cluster centroids
pub const CENTROID_TABLE: &str = "centroid";

/// Single record describing the built vector index
pub const INDEX_INFO_RECORD: &str = "index_info:current";

/// Names edge tables may not take
const RESERVED_TABLES: &[&str] = &["node", "embedding", "centroid", "index_info"];

/// Initialize the database schema
pub async fn initialize_schema(db: &DbConnection) -> Result<()> {
    info!("Initializing database schema...");

    db.query(SCHEMA_DEFINITION)
        .query(edge_table_definitions())
        .await?
        .check()
        .map_err(|e| DbError::SchemaInit(e.to_string()))?;

    info!("Schema initialized successfully");
    Ok(())
}

/// Edge table for a relationship type: `GIVES_TALK` lives in `gives_talk`.
///
/// The name is spliced into `RELATE`, so anything outside
/// `[A-Za-z_][A-Za-z0-9_]*` is rejected.
pub fn edge_table(rel_type: &str) -> Result<String> {
    let mut chars = rel_type.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DbError::QueryFailed(format!(
            "invalid relationship type: {rel_type:?}"
        )));
    }
    let table = rel_type.to_ascii_lowercase();
    if RESERVED_TABLES.contains(&table.as_str()) {
        return Err(DbError::QueryFailed(format!(
            "relationship type {rel_type} collides with a reserved table"
        )));
    }
    Ok(table)
}

/// `RELATE` creates tables for other types on first use
fn edge_table_definitions() -> String {
    [
        rel::GIVES_TALK,
        rel::IS_DESCRIBED_BY,
        rel::IS_PART_OF,
        rel::IS_CATEGORIZED_AS,
        rel::WORKS_FOR,
        rel::MENTIONS,
        rel::DISCUSSES,
        rel::BELONGS_TO,
    ]
    .iter()
    .map(|rel_type| {
        let table = rel_type.to_ascii_lowercase();
        format!(
            "DEFINE TABLE IF NOT EXISTS {table} TYPE RELATION IN node OUT node SCHEMALESS;\n\
             DEFINE FIELD IF NOT EXISTS rel_type ON {table} TYPE string;\n"
        )
    })
    .collect()
}

// The node table is SCHEMALESS: talk nodes carry nested transcript segments
// that a SCHEMAFULL table would strip.
const SCHEMA_DEFINITION: &str = r#"
-- ============================================
-- TABLES
-- ============================================

DEFINE TABLE IF NOT EXISTS node SCHEMALESS;
DEFINE FIELD IF NOT EXISTS key ON node TYPE string;
DEFINE FIELD IF NOT EXISTS node_type ON node TYPE string;
DEFINE FIELD IF NOT EXISTS name ON node TYPE option<string>;
DEFINE FIELD IF NOT EXISTS title ON node TYPE option<string>;
DEFINE FIELD IF NOT EXISTS keyword ON node TYPE option<string>;
DEFINE FIELD IF NOT EXISTS transcript ON node TYPE option<string>;
DEFINE FIELD IF NOT EXISTS youtube_id ON node TYPE option<string>;
DEFINE FIELD IF NOT EXISTS properties ON node TYPE option<string>;

-- Vector index: `position` joins a vector to its mapping entry
DEFINE TABLE IF NOT EXISTS embedding SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS position ON embedding TYPE int;
DEFINE FIELD IF NOT EXISTS node_type ON embedding TYPE string;
DEFINE FIELD IF NOT EXISTS metadata ON embedding TYPE string;
DEFINE FIELD IF NOT EXISTS vector ON embedding TYPE array<float>;
DEFINE FIELD IF NOT EXISTS cluster ON embedding TYPE option<int>;

DEFINE TABLE IF NOT EXISTS centroid SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS cluster ON centroid TYPE int;
DEFINE FIELD IF NOT EXISTS vector ON centroid TYPE array<float>;

DEFINE TABLE IF NOT EXISTS index_info SCHEMALESS;

-- ============================================
-- INDEXES
-- ============================================

DEFINE INDEX IF NOT EXISTS idx_node_key ON node FIELDS key UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_node_type ON node FIELDS node_type;

DEFINE INDEX IF NOT EXISTS idx_embedding_position ON embedding FIELDS position UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_embedding_cluster ON embedding FIELDS cluster;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_memory;

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = init_memory().await.expect("Failed to init db");

        let keys: Vec<String> = db
            .query("SELECT VALUE key FROM node")
            .await
            .unwrap()
            .take(0)
            .unwrap();
        assert!(keys.is_empty());

        let edges: Vec<String> = db
            .query("SELECT VALUE rel_type FROM gives_talk")
            .await
            .unwrap()
            .take(0)
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = init_memory().await.unwrap();
        initialize_schema(&db).await.unwrap();
    }

    #[test]
    fn test_edge_table_names() {
        assert_eq!(edge_table(rel::GIVES_TALK).unwrap(), "gives_talk");
        assert_eq!(edge_table("CO_AUTHORED").unwrap(), "co_authored");
        assert!(edge_table("DROP TABLE node; --").is_err());
        assert!(edge_table("1ST").is_err());
        assert!(edge_table("").is_err());
        assert!(edge_table("NODE").is_err());
    }
}
