//! Vector index over node embeddings, stored in SurrealDB
//!
//! Each vector is an `embedding` row carrying its position in the mapping
//! plus the mapping entry itself (`node_type`, JSON `metadata`), so the
//! two never drift apart. The `index_info:current` record is written last
//! and marks the index ready.
//!
//! Flat search scores every row with `vector::dot`. HNSW search goes
//! through a native `HNSW ... DIST COSINE` index and the `<|k,ef|>` KNN
//! operator. IVF clusters are trained here and stored as `centroid` rows;
//! a query searches the `nprobe` closest clusters.
//!
//! On disk an index is `all_embeddings.json`, a parallel
//! `index_mapping.json` of `{node_type, metadata}` records and
//! `index_info.json`.

use crate::schema::{CENTROID_TABLE, EMBEDDING_TABLE, INDEX_INFO_RECORD};
use crate::{DbConnection, DbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use surrealdb_types::SurrealValue;
use talkgraph_core::{NodeType, SemanticResult};
use tracing::{debug, info, instrument};

pub const EMBEDDINGS_FILE: &str = "all_embeddings.json";
pub const MAPPING_FILE: &str = "index_mapping.json";
pub const INFO_FILE: &str = "index_info.json";

/// Default number of IVF clusters (capped by index size)
pub const DEFAULT_NLIST: usize = 100;
/// Default number of IVF clusters searched per query
pub const DEFAULT_NPROBE: usize = 8;
/// Default neighbors per node in the HNSW graph
pub const DEFAULT_HNSW_M: usize = 32;
/// Default candidate list size for HNSW search
pub const DEFAULT_EF_SEARCH: usize = 64;

const KMEANS_ITERATIONS: usize = 10;
/// IVF keeps at least this many vectors per cluster on average
const MIN_VECTORS_PER_LIST: usize = 10;
const INSERT_BATCH: usize = 500;

const HIT_FIELDS: &str =
    "position, node_type, metadata, vector::dot(vector, $query) AS similarity";

/// Which index structure to search with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact inner-product search
    #[default]
    Flat,
    /// Inverted file: k-means clusters, search the closest `nprobe`
    Ivf { nlist: usize, nprobe: usize },
    /// Hierarchical navigable small-world graph
    Hnsw { m: usize, ef_search: usize },
}

impl FromStr for IndexKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(IndexKind::Flat),
            "ivf" => Ok(IndexKind::Ivf {
                nlist: DEFAULT_NLIST,
                nprobe: DEFAULT_NPROBE,
            }),
            "hnsw" => Ok(IndexKind::Hnsw {
                m: DEFAULT_HNSW_M,
                ef_search: DEFAULT_EF_SEARCH,
            }),
            other => Err(DbError::InvalidIndex(format!("unknown index type: {other}"))),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Flat => write!(f, "flat"),
            IndexKind::Ivf { nlist, nprobe } => write!(f, "ivf(nlist={nlist}, nprobe={nprobe})"),
            IndexKind::Hnsw { m, ef_search } => write!(f, "hnsw(m={m}, ef_search={ef_search})"),
        }
    }
}

/// One entry of the mapping array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub node_type: NodeType,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Contents of `index_info.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    pub total_vectors: usize,
    pub dimension: usize,
    pub index_type: IndexKind,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, SurrealValue)]
struct EmbeddingRow {
    position: i64,
    node_type: String,
    metadata: String,
    vector: Vec<f64>,
    cluster: Option<i64>,
}

#[derive(Debug, Clone, SurrealValue)]
struct CentroidRow {
    cluster: i64,
    vector: Vec<f64>,
}

#[derive(Debug, Clone, SurrealValue)]
struct HitRow {
    position: i64,
    node_type: String,
    metadata: String,
    similarity: f64,
}

#[derive(Debug, Clone, SurrealValue)]
struct ExportRow {
    position: i64,
    node_type: String,
    metadata: String,
    vector: Vec<f64>,
}

#[derive(Debug, Clone, SurrealValue)]
struct InfoRow {
    total_vectors: i64,
    dimension: i64,
    kind: String,
    nlist: Option<i64>,
    nprobe: Option<i64>,
    m: Option<i64>,
    ef_search: Option<i64>,
    built_at: String,
}

impl InfoRow {
    fn from_info(info: &IndexInfo) -> Self {
        let (kind, nlist, nprobe, m, ef_search) = match info.index_type {
            IndexKind::Flat => ("flat", None, None, None, None),
            IndexKind::Ivf { nlist, nprobe } => {
                ("ivf", Some(nlist as i64), Some(nprobe as i64), None, None)
            }
            IndexKind::Hnsw { m, ef_search } => {
                ("hnsw", None, None, Some(m as i64), Some(ef_search as i64))
            }
        };
        Self {
            total_vectors: info.total_vectors as i64,
            dimension: info.dimension as i64,
            kind: kind.to_string(),
            nlist,
            nprobe,
            m,
            ef_search,
            built_at: info.built_at.to_rfc3339(),
        }
    }

    fn into_info(self) -> Result<IndexInfo> {
        let count = |v: Option<i64>, default: usize| v.map(|n| n.max(0) as usize).unwrap_or(default);
        let index_type = match self.kind.as_str() {
            "flat" => IndexKind::Flat,
            "ivf" => IndexKind::Ivf {
                nlist: count(self.nlist, DEFAULT_NLIST),
                nprobe: count(self.nprobe, DEFAULT_NPROBE),
            },
            "hnsw" => IndexKind::Hnsw {
                m: count(self.m, DEFAULT_HNSW_M),
                ef_search: count(self.ef_search, DEFAULT_EF_SEARCH),
            },
            other => return Err(DbError::InvalidIndex(format!("unknown index type: {other}"))),
        };
        let built_at = DateTime::parse_from_rfc3339(&self.built_at)
            .map_err(|e| DbError::InvalidIndex(format!("bad built_at: {e}")))?
            .with_timezone(&Utc);
        Ok(IndexInfo {
            total_vectors: self.total_vectors.max(0) as usize,
            dimension: self.dimension.max(0) as usize,
            index_type,
            built_at,
        })
    }
}

/// Nearest-neighbor index. Searching before `build`/`load` fails with
/// [`DbError::NotReady`].
#[derive(Clone)]
pub struct VectorIndex {
    db: DbConnection,
}

impl VectorIndex {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// What was built, or `None` when no index exists yet
    pub async fn info(&self) -> Result<Option<IndexInfo>> {
        let rows: Vec<InfoRow> = self
            .db
            .query(format!(
                "SELECT total_vectors, dimension, kind, nlist, nprobe, m, ef_search, built_at \
                 FROM {INDEX_INFO_RECORD}"
            ))
            .await?
            .take(0)?;
        rows.into_iter().next().map(InfoRow::into_info).transpose()
    }

    pub async fn is_ready(&self) -> Result<bool> {
        Ok(self.info().await?.is_some())
    }

    /// Replace the stored index with one built from parallel embedding and
    /// mapping arrays
    #[instrument(skip(self, embeddings, mapping), fields(count = embeddings.len()))]
    pub async fn build(
        &self,
        embeddings: Vec<Vec<f32>>,
        mapping: Vec<EmbeddingRecord>,
        kind: IndexKind,
    ) -> Result<IndexInfo> {
        if embeddings.is_empty() {
            return Err(DbError::InvalidIndex("no embeddings to index".into()));
        }
        if embeddings.len() != mapping.len() {
            return Err(DbError::InvalidIndex(format!(
                "{} embeddings but {} mapping entries",
                embeddings.len(),
                mapping.len()
            )));
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(DbError::InvalidIndex("zero-dimension embeddings".into()));
        }
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(DbError::InvalidEmbeddingDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = embeddings.into_iter().map(normalized).collect();
        let total_vectors = vectors.len();

        let (kind, clusters) = match kind {
            IndexKind::Ivf { nlist, nprobe } => {
                let nlist = nlist.min(total_vectors / MIN_VECTORS_PER_LIST).max(1);
                let (centroids, assignment) = kmeans(&vectors, nlist);
                debug!("Trained IVF index with {} clusters", centroids.len());
                let kind = IndexKind::Ivf {
                    nlist,
                    nprobe: nprobe.max(1),
                };
                (kind, Some((centroids, assignment)))
            }
            IndexKind::Hnsw { m, ef_search } => (
                IndexKind::Hnsw {
                    m: m.max(1),
                    ef_search: ef_search.max(1),
                },
                None,
            ),
            IndexKind::Flat => (IndexKind::Flat, None),
        };

        let vector_index = match kind {
            IndexKind::Hnsw { m, .. } => format!(
                "DEFINE INDEX idx_embedding_vector ON {EMBEDDING_TABLE} FIELDS vector \
                 HNSW DIMENSION {dimension} DIST COSINE M {m};"
            ),
            _ => String::new(),
        };
        self.db
            .query(format!(
                "DELETE {INDEX_INFO_RECORD};
                 DELETE {EMBEDDING_TABLE};
                 DELETE {CENTROID_TABLE};
                 REMOVE INDEX IF EXISTS idx_embedding_vector ON {EMBEDDING_TABLE};
                 {vector_index}"
            ))
            .await?
            .check()?;

        let mut rows = Vec::with_capacity(total_vectors);
        for (position, (vector, record)) in vectors.iter().zip(mapping).enumerate() {
            rows.push(EmbeddingRow {
                position: position as i64,
                node_type: record.node_type.as_str().to_string(),
                metadata: serde_json::to_string(&record.metadata)?,
                vector: widen(vector),
                cluster: clusters
                    .as_ref()
                    .map(|(_, assignment)| assignment[position] as i64),
            });
        }
        for batch in rows.chunks(INSERT_BATCH) {
            self.db
                .query(format!("INSERT INTO {EMBEDDING_TABLE} $rows"))
                .bind(("rows", batch.to_vec()))
                .await?
                .check()?;
        }

        if let Some((centroids, _)) = &clusters {
            let centroid_rows: Vec<CentroidRow> = centroids
                .iter()
                .enumerate()
                .map(|(cluster, vector)| CentroidRow {
                    cluster: cluster as i64,
                    vector: widen(vector),
                })
                .collect();
            self.db
                .query(format!("INSERT INTO {CENTROID_TABLE} $rows"))
                .bind(("rows", centroid_rows))
                .await?
                .check()?;
        }

        let info = IndexInfo {
            total_vectors,
            dimension,
            index_type: kind,
            built_at: Utc::now(),
        };
        self.db
            .query(format!("UPSERT {INDEX_INFO_RECORD} CONTENT $info"))
            .bind(("info", InfoRow::from_info(&info)))
            .await?
            .check()?;

        info!("Built {} index with {} vectors (dim={})", kind, total_vectors, dimension);
        Ok(info)
    }

    /// Top `k` records by descending inner-product similarity
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SemanticResult>> {
        let info = self
            .info()
            .await?
            .ok_or_else(|| DbError::NotReady("vector index has not been built or loaded".into()))?;
        if query.len() != info.dimension {
            return Err(DbError::InvalidEmbeddingDimension {
                expected: info.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = widen(&normalized(query.to_vec()));

        let hits: Vec<HitRow> = match info.index_type {
            IndexKind::Flat => self
                .db
                .query(format!(
                    "SELECT {HIT_FIELDS} FROM {EMBEDDING_TABLE} \
                     ORDER BY similarity DESC, position ASC LIMIT $limit"
                ))
                .bind(("query", query))
                .bind(("limit", k as i64))
                .await?
                .take(0)?,
            IndexKind::Hnsw { ef_search, .. } => {
                let ef = ef_search.max(k);
                self.db
                    .query(format!(
                        "SELECT {HIT_FIELDS} FROM {EMBEDDING_TABLE} \
                         WHERE vector <|{k},{ef}|> $query \
                         ORDER BY similarity DESC, position ASC LIMIT $limit"
                    ))
                    .bind(("query", query))
                    .bind(("limit", k as i64))
                    .await?
                    .take(0)?
            }
            IndexKind::Ivf { nprobe, .. } => self
                .db
                .query(format!(
                    "LET $closest = (SELECT VALUE cluster FROM (
                         SELECT cluster, vector::dot(vector, $query) AS score
                         FROM {CENTROID_TABLE} ORDER BY score DESC LIMIT $nprobe
                     ));
                     SELECT {HIT_FIELDS} FROM {EMBEDDING_TABLE}
                     WHERE cluster IN $closest
                     ORDER BY similarity DESC, position ASC LIMIT $limit;"
                ))
                .bind(("query", query))
                .bind(("nprobe", nprobe as i64))
                .bind(("limit", k as i64))
                .await?
                .take(1)?,
        };

        debug!(
            positions = ?hits.iter().map(|h| h.position).collect::<Vec<_>>(),
            "nearest neighbors"
        );
        hits.into_iter()
            .map(|hit| -> Result<SemanticResult> {
                Ok(SemanticResult {
                    node_type: NodeType::from_label(&hit.node_type),
                    metadata: serde_json::from_str(&hit.metadata)?,
                    similarity_score: hit.similarity as f32,
                })
            })
            .collect()
    }

    /// Read embeddings and mapping from `dir` and build a fresh index
    pub async fn build_from_dir(&self, dir: impl AsRef<Path>, kind: IndexKind) -> Result<IndexInfo> {
        let (embeddings, mapping) = read_arrays(dir.as_ref())?;
        self.build(embeddings, mapping, kind).await
    }

    /// Export the stored index as the three index files in `dir`
    #[instrument(skip(self, dir))]
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<IndexInfo> {
        let info = self
            .info()
            .await?
            .ok_or_else(|| DbError::NotReady("no index to save".into()))?;
        let rows: Vec<ExportRow> = self
            .db
            .query(format!(
                "SELECT position, node_type, metadata, vector FROM {EMBEDDING_TABLE} \
                 ORDER BY position ASC"
            ))
            .await?
            .take(0)?;

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(rows.len());
        let mut mapping: Vec<EmbeddingRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.position != vectors.len() as i64 {
                return Err(DbError::InvalidIndex(format!(
                    "embedding position {} out of sequence",
                    row.position
                )));
            }
            vectors.push(row.vector.iter().map(|x| *x as f32).collect());
            mapping.push(EmbeddingRecord {
                node_type: NodeType::from_label(&row.node_type),
                metadata: serde_json::from_str(&row.metadata)?,
            });
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        fs::write(dir.join(EMBEDDINGS_FILE), serde_json::to_vec(&vectors)?)?;
        fs::write(dir.join(MAPPING_FILE), serde_json::to_vec_pretty(&mapping)?)?;
        fs::write(dir.join(INFO_FILE), serde_json::to_vec_pretty(&info)?)?;

        info!("Saved index to {}", dir.display());
        Ok(info)
    }

    /// Rebuild a saved index. A missing `index_info.json` means the index
    /// was never built.
    #[instrument(skip(self, dir))]
    pub async fn load(&self, dir: impl AsRef<Path>) -> Result<IndexInfo> {
        let dir = dir.as_ref();
        let info_path = dir.join(INFO_FILE);
        if !info_path.exists() {
            return Err(DbError::NotReady(format!(
                "index not found at {}; run build-index first",
                info_path.display()
            )));
        }
        let info: IndexInfo = serde_json::from_slice(&fs::read(&info_path)?)?;
        let (embeddings, mapping) = read_arrays(dir)?;
        if embeddings.len() != info.total_vectors {
            return Err(DbError::InvalidIndex(format!(
                "index_info lists {} vectors but {} were found",
                info.total_vectors,
                embeddings.len()
            )));
        }
        self.build(embeddings, mapping, info.index_type).await
    }
}

fn read_arrays(dir: &Path) -> Result<(Vec<Vec<f32>>, Vec<EmbeddingRecord>)> {
    let embeddings_path = dir.join(EMBEDDINGS_FILE);
    if !embeddings_path.exists() {
        return Err(DbError::NotReady(format!(
            "embeddings not found at {}",
            embeddings_path.display()
        )));
    }
    let embeddings: Vec<Vec<f32>> = serde_json::from_slice(&fs::read(&embeddings_path)?)?;
    let mapping: Vec<EmbeddingRecord> = serde_json::from_slice(&fs::read(dir.join(MAPPING_FILE))?)?;
    Ok((embeddings, mapping))
}

fn widen(v: &[f32]) -> Vec<f64> {
    v.iter().map(|x| f64::from(*x)).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length; the zero vector stays zero
pub fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn closest(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .max_by(|a, b| dot(vector, a.1).total_cmp(&dot(vector, b.1)))
        .map(|(c, _)| c)
        .unwrap_or(0)
}

/// Spherical k-means with evenly spaced seeds, so builds are reproducible.
/// Returns the centroids and each vector's cluster.
fn kmeans(vectors: &[Vec<f32>], nlist: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    let step = vectors.len() / nlist;
    let mut centroids: Vec<Vec<f32>> = (0..nlist).map(|c| vectors[c * step].clone()).collect();
    let dimension = centroids[0].len();

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0f32; dimension]; nlist];
        let mut counts = vec![0usize; nlist];
        for v in vectors {
            let c = closest(v, &centroids);
            counts[c] += 1;
            sums[c].iter_mut().zip(v).for_each(|(s, x)| *s += x);
        }
        for (c, sum) in sums.into_iter().enumerate() {
            // empty clusters keep their previous centroid
            if counts[c] > 0 {
                centroids[c] = normalized(sum);
            }
        }
    }

    let assignment = vectors.iter().map(|v| closest(v, &centroids)).collect();
    (centroids, assignment)
}
