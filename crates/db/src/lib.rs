//! Database layer for TalkGraph
//!
//! Provides the SurrealDB-backed graph store (schema, repository, snapshot
//! import, statistics) and the persisted vector index.

pub mod error;
pub mod repository;
pub mod schema;
pub mod vector;

pub use error::{DbError, Result};
pub use repository::{GraphStats, ImportSummary, Repository};
pub use vector::{EmbeddingRecord, IndexInfo, IndexKind, VectorIndex};

use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;

/// Database connection type
pub type DbConnection = Surreal<Db>;

/// Initialize database with RocksDB (persistent)
#[cfg(feature = "rocksdb")]
pub async fn init_persistent(path: impl AsRef<std::path::Path>) -> Result<DbConnection> {
    use surrealdb::engine::local::RocksDb;

    let db = Surreal::new::<RocksDb>(path.as_ref())
        .await
        .map_err(|e| DbError::Connection(format!("{}: {}", path.as_ref().display(), e)))?;
    setup_database(&db).await?;
    Ok(db)
}

/// Initialize database in-memory (for testing)
pub async fn init_memory() -> Result<DbConnection> {
    let db = Surreal::new::<Mem>(()).await?;
    setup_database(&db).await?;
    Ok(db)
}

/// Setup database namespace, database, and schema
async fn setup_database(db: &DbConnection) -> Result<()> {
    db.use_ns("talkgraph").use_db("talks").await?;
    schema::initialize_schema(db).await?;
    Ok(())
}
