//! Fallback vector store backend: SQLite with the `sqlite-vec` extension
//! registered for completeness, queried here via a brute-force cosine
//! scan in Rust - simpler than hand-rolling `vec0` virtual table SQL and
//! adequate at the scale this backend exists for (local dev, primary
//! store outage).

use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::Instant;

use async_trait::async_trait;
use bm25::{Embedder as Bm25Embedder, EmbedderBuilder, Language, Scorer};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_rusqlite::{ffi, Connection, OptionalExtension};

use super::{reciprocal_rank_fusion, Filter, HealthState, HealthStatus, Hit, VectorStoreBackend};
use crate::chunk::{Chunk, Collection, Distance};
use crate::error::{ErrorKind, Result, RetrievalError};

fn register_sqlite_vec() -> Result<()> {
    static INIT: Once = Once::new();
    static INIT_RESULT: StdMutex<Option<Result<(), String>>> = StdMutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit = std::mem::transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().unwrap() = Some(result);
    });

    INIT_RESULT
        .lock()
        .unwrap()
        .clone()
        .expect("sqlite-vec init was called but result not recorded")
        .map_err(RetrievalError::config)
}

struct KeywordIndex {
    scorer: Scorer<String>,
    embedder: Bm25Embedder,
}

impl KeywordIndex {
    fn new() -> Self {
        Self {
            scorer: Scorer::new(),
            embedder: EmbedderBuilder::with_avgdl(256.0).language_mode(Language::English).build(),
        }
    }

    fn upsert(&mut self, chunk: &Chunk) {
        self.scorer.upsert(&chunk.id, self.embedder.embed(&chunk.content));
    }

    fn remove(&mut self, id: &str) {
        self.scorer.remove(id);
    }

    fn rank(&self, text: &str) -> Vec<(String, f32)> {
        self.scorer
            .matches(&self.embedder.embed(text))
            .into_iter()
            .map(|doc| (doc.id, doc.score))
            .collect()
    }
}

pub struct SqliteVectorStore {
    conn: Connection,
    keyword: Arc<Mutex<KeywordIndex>>,
}

impl SqliteVectorStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RetrievalError::connection("opening sqlite fallback store").with_source(err))?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS collections (
                    name TEXT PRIMARY KEY,
                    dimension INTEGER NOT NULL,
                    embedding_model TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    collection TEXT NOT NULL,
                    document_id TEXT NOT NULL,
                    chunk_json TEXT NOT NULL,
                    embedding BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);
                CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(collection, document_id);",
            )?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("creating fallback store schema").with_source(err))?;

        let store = Self {
            conn,
            keyword: Arc::new(Mutex::new(KeywordIndex::new())),
        };
        store.rebuild_keyword_index().await?;
        Ok(store)
    }

    async fn rebuild_keyword_index(&self) -> Result<()> {
        let rows: Vec<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT chunk_json FROM chunks")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("loading chunks for keyword index").with_source(err))?;

        let mut index = self.keyword.lock().await;
        for raw in rows {
            if let Ok(chunk) = serde_json::from_str::<Chunk>(&raw) {
                index.upsert(&chunk);
            }
        }
        Ok(())
    }

    async fn all_in_collection(&self, collection: &str) -> Result<Vec<(Chunk, Vec<f32>)>> {
        let collection = collection.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT chunk_json, embedding FROM chunks WHERE collection = ?1")?;
                let rows = stmt
                    .query_map([&collection], |row| {
                        let json: String = row.get(0)?;
                        let blob: Vec<u8> = row.get(1)?;
                        Ok((json, blob))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("scanning fallback store collection").with_source(err))
            .map(|rows| {
                rows.into_iter()
                    .filter_map(|(json, blob)| {
                        let chunk: Chunk = serde_json::from_str(&json).ok()?;
                        let vector = bytes_to_vector(&blob);
                        Some((chunk, vector))
                    })
                    .collect()
            })
    }

    /// Looks up a collection's declared `(dimension, embedding_model)` for
    /// validating chunks on the way in (P5).
    async fn collection_metadata(&self, collection: &str) -> Result<(usize, String)> {
        let name = collection.to_string();
        let name_for_error = name.clone();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT dimension, embedding_model FROM collections WHERE name = ?1",
                    [&name],
                    |row| Ok((row.get::<_, i64>(0)? as usize, row.get::<_, String>(1)?)),
                )
                .map_err(tokio_rusqlite::Error::from)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| {
                RetrievalError::invalid_input(format!("collection '{name_for_error}' does not exist")).with_source(err)
            })
    }
}

fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Rescales raw cosine similarity (`[-1, 1]`) into the `[0, 1]` relevance
/// range the result record promises (P6). Order-preserving, so RRF (P7)
/// ranks identically either way.
fn normalize_cosine(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Squashes an unbounded BM25 score into `(0, 1)` with a logistic curve.
/// Monotonic, so keyword-search rank order is unaffected.
fn normalize_bm25(score: f32) -> f32 {
    1.0 / (1.0 + (-score).exp())
}

#[async_trait]
impl VectorStoreBackend for SqliteVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize, embedding_model: &str) -> Result<Collection> {
        let existing: Option<(i64, String)> = {
            let name = name.to_string();
            self.conn
                .call(move |conn| {
                    conn.query_row(
                        "SELECT dimension, embedding_model FROM collections WHERE name = ?1",
                        [&name],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                    )
                    .optional()
                    .map_err(tokio_rusqlite::Error::from)
                })
                .await
                .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("reading collection metadata").with_source(err))?
        };

        if let Some((existing_dimension, existing_model)) = existing {
            if existing_dimension as usize != dimension {
                return Err(RetrievalError::invalid_input(format!(
                    "collection '{name}' has dimension {existing_dimension}, requested {dimension}"
                )));
            }
            return Ok(Collection {
                name: name.to_string(),
                dimension,
                embedding_model: existing_model,
                distance: Distance::Cosine,
                created_at: Utc::now(),
            });
        }

        let name_owned = name.to_string();
        let model_owned = embedding_model.to_string();
        let created_at = Utc::now();
        let created_at_text = created_at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO collections (name, dimension, embedding_model, created_at) VALUES (?1, ?2, ?3, ?4)",
                    tokio_rusqlite::params![name_owned, dimension as i64, model_owned, created_at_text],
                )?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("creating fallback collection").with_source(err))?;

        Ok(Collection {
            name: name.to_string(),
            dimension,
            embedding_model: embedding_model.to_string(),
            distance: Distance::Cosine,
            created_at,
        })
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let (dimension, embedding_model) = self.collection_metadata(collection).await?;
        let collection = collection.to_string();
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            // P5: never persist a chunk whose declared embedding model
            // disagrees with the collection's.
            chunk.validate_for_collection(dimension, &embedding_model)?;
            let vector = chunk
                .embedding
                .as_ref()
                .ok_or_else(|| RetrievalError::invalid_input(format!("chunk {} has no embedding", chunk.id)))?;
            let json = serde_json::to_string(chunk)
                .map_err(|err| RetrievalError::internal("serializing chunk for fallback store").with_source(err))?;
            rows.push((chunk.id.clone(), chunk.document_id.clone(), json, vector_to_bytes(vector)));
        }
        let count = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (id, document_id, json, blob) in &rows {
                    tx.execute(
                        "INSERT INTO chunks (id, collection, document_id, chunk_json, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(id) DO UPDATE SET chunk_json = excluded.chunk_json, embedding = excluded.embedding",
                        tokio_rusqlite::params![id, collection, document_id, json, blob],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("writing to fallback store").with_source(err))?;

        let mut index = self.keyword.lock().await;
        for chunk in chunks {
            index.upsert(chunk);
        }
        Ok(count)
    }

    async fn search(&self, collection: &str, query_vector: &[f32], limit: usize, filter: &Filter) -> Result<Vec<Hit>> {
        let rows = self.all_in_collection(collection).await?;
        let mut hits: Vec<Hit> = rows
            .into_iter()
            .filter(|(chunk, _)| filter.matches(chunk))
            .map(|(chunk, vector)| {
                let score = normalize_cosine(cosine_similarity(query_vector, &vector));
                Hit { chunk, score }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn keyword_search(&self, collection: &str, text: &str, limit: usize, filter: &Filter) -> Result<Vec<Hit>> {
        let rows = self.all_in_collection(collection).await?;
        let by_id: std::collections::HashMap<String, Chunk> =
            rows.into_iter().map(|(chunk, _)| (chunk.id.clone(), chunk)).collect();
        let ranked = self.keyword.lock().await.rank(text);
        let mut hits: Vec<Hit> = ranked
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).cloned().map(|chunk| (chunk, score)))
            .filter(|(chunk, _)| filter.matches(chunk))
            .map(|(chunk, score)| Hit { chunk, score: normalize_bm25(score) })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query_vector: &[f32],
        text: &str,
        limit: usize,
        filter: &Filter,
        weight: f32,
    ) -> Result<Vec<Hit>> {
        if weight >= 1.0 {
            return self.search(collection, query_vector, limit, filter).await;
        }
        if weight <= 0.0 {
            return self.keyword_search(collection, text, limit, filter).await;
        }
        let overfetch = limit.saturating_mul(3).max(limit);
        let semantic = self.search(collection, query_vector, overfetch, filter).await?;
        let keyword = self.keyword_search(collection, text, overfetch, filter).await?;
        Ok(reciprocal_rank_fusion(&semantic, &keyword, weight, limit))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let rows = self.all_in_collection(collection).await?;
        Ok(rows.into_iter().filter(|(chunk, _)| filter.matches(chunk)).count())
    }

    async fn all_chunks(&self, collection: &str, filter: &Filter) -> Result<Vec<Chunk>> {
        let rows = self.all_in_collection(collection).await?;
        Ok(rows.into_iter().map(|(chunk, _)| chunk).filter(|chunk| filter.matches(chunk)).collect())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let collection_owned = collection.to_string();
        let document_owned = document_id.to_string();
        let ids: Vec<String> = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id FROM chunks WHERE collection = ?1 AND document_id = ?2")?;
                let ids = stmt
                    .query_map(tokio_rusqlite::params![collection_owned, document_owned], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("looking up document chunks").with_source(err))?;

        let collection_owned = collection.to_string();
        let document_owned = document_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
                    tokio_rusqlite::params![collection_owned, document_owned],
                )?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| RetrievalError::internal("deleting document from fallback store").with_source(err))?;

        let mut index = self.keyword.lock().await;
        for id in &ids {
            index.remove(id);
        }
        Ok(ids.len())
    }

    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        let result = self
            .conn
            .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map_err(tokio_rusqlite::Error::from))
            .await;
        match result {
            Ok(_) => HealthStatus {
                backend: "sqlite",
                state: HealthState::Healthy,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                detail: None,
                error_code: None,
            },
            Err(err) => HealthStatus {
                backend: "sqlite",
                state: HealthState::Unavailable,
                latency_ms: None,
                detail: Some(err.to_string()),
                error_code: None,
            },
        }
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
