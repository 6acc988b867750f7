//! Vector storage: the abstract contract (§4.3) plus the primary
//! (Qdrant) and fallback (SQLite + sqlite-vec) backends.

pub mod factory;
pub mod filter;
pub mod qdrant;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use filter::Filter;

use crate::chunk::{Chunk, Collection};
use crate::error::Result;

/// A scored match returned by any search operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub backend: &'static str,
    pub state: HealthState,
    pub latency_ms: Option<u64>,
    pub detail: Option<String>,
    /// The error code (§6's closed table) that produced `state != healthy`,
    /// if known. Lets [`crate::store::factory::StoreFactory`] distinguish
    /// "primary unreachable, fall back" from "primary misconfigured, fail"
    /// without re-parsing `detail`.
    pub error_code: Option<&'static str>,
}

/// A storage and retrieval backend for embedded chunks. Implementations
/// are called from concurrent request handlers and must not assume
/// single-threaded access (§4.2).
#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    /// Creates the named collection if absent; if present, verifies its
    /// dimension and embedding model match (I1) rather than silently
    /// reusing a mismatched collection.
    async fn ensure_collection(&self, name: &str, dimension: usize, embedding_model: &str) -> Result<Collection>;

    /// Upserts chunks by id (re-ingestion of an unchanged chunk is a
    /// no-op write, per P3). Every chunk must already carry an embedding
    /// matching the collection (I1).
    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<usize>;

    async fn search(&self, collection: &str, query_vector: &[f32], limit: usize, filter: &Filter) -> Result<Vec<Hit>>;

    async fn keyword_search(&self, collection: &str, text: &str, limit: usize, filter: &Filter) -> Result<Vec<Hit>>;

    /// Hybrid search: `weight` in `[0, 1]` controls the semantic/keyword
    /// balance. `weight == 0` must exactly match `keyword_search`,
    /// `weight == 1` must exactly match `search` (P7).
    async fn hybrid_search(
        &self,
        collection: &str,
        query_vector: &[f32],
        text: &str,
        limit: usize,
        filter: &Filter,
        weight: f32,
    ) -> Result<Vec<Hit>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize>;

    /// Every chunk in `collection` matching `filter`, with full metadata.
    /// Used only by [`crate::search::Searcher::stats`]'s aggregation - not
    /// a query-path operation, so backends may implement it as a plain
    /// scan rather than optimizing it.
    async fn all_chunks(&self, collection: &str, filter: &Filter) -> Result<Vec<Chunk>>;

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize>;

    async fn health(&self) -> HealthStatus;

    fn backend_name(&self) -> &'static str;
}

/// Reciprocal-rank fusion over two ranked id lists, used by backends
/// whose native query engine has no combined semantic+keyword mode.
/// `weight` favors the semantic list as it approaches 1.
pub(crate) fn reciprocal_rank_fusion(
    semantic: &[Hit],
    keyword: &[Hit],
    weight: f32,
    limit: usize,
) -> Vec<Hit> {
    use std::collections::HashMap;

    const K: f32 = 60.0;
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut chunks: HashMap<String, Chunk> = HashMap::new();

    for (rank, hit) in semantic.iter().enumerate() {
        let contribution = weight / (K + rank as f32 + 1.0);
        *scores.entry(hit.chunk.id.clone()).or_insert(0.0) += contribution;
        chunks.entry(hit.chunk.id.clone()).or_insert_with(|| hit.chunk.clone());
    }
    for (rank, hit) in keyword.iter().enumerate() {
        let contribution = (1.0 - weight) / (K + rank as f32 + 1.0);
        *scores.entry(hit.chunk.id.clone()).or_insert(0.0) += contribution;
        chunks.entry(hit.chunk.id.clone()).or_insert_with(|| hit.chunk.clone());
    }

    let mut merged: Vec<Hit> = scores
        .into_iter()
        .filter_map(|(id, score)| chunks.remove(&id).map(|chunk| Hit { chunk, score }))
        .collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFields, ChunkType, DocumentType, Normative};
    use chrono::Utc;

    fn chunk(id_seed: u64) -> Chunk {
        Chunk::new(ChunkFields {
            document_id: "doc".into(),
            document_title: "t".into(),
            document_version: "1".into(),
            document_type: DocumentType::Standard,
            ordinal: id_seed,
            content: format!("content {id_seed}"),
            token_count: 5,
            section_hierarchy: vec![],
            clause_number: String::new(),
            page_numbers: vec![1],
            chunk_type: ChunkType::Prose,
            normative: Normative::Unknown,
            table_group_id: None,
            ingested_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn fusion_at_weight_one_matches_semantic_order() {
        let semantic = vec![Hit { chunk: chunk(1), score: 0.9 }, Hit { chunk: chunk(2), score: 0.5 }];
        let keyword = vec![Hit { chunk: chunk(2), score: 3.0 }, Hit { chunk: chunk(1), score: 1.0 }];
        let fused = reciprocal_rank_fusion(&semantic, &keyword, 1.0, 10);
        assert_eq!(fused[0].chunk.id, semantic[0].chunk.id);
    }

    #[test]
    fn fusion_at_weight_zero_matches_keyword_order() {
        let semantic = vec![Hit { chunk: chunk(1), score: 0.9 }, Hit { chunk: chunk(2), score: 0.5 }];
        let keyword = vec![Hit { chunk: chunk(2), score: 3.0 }, Hit { chunk: chunk(1), score: 1.0 }];
        let fused = reciprocal_rank_fusion(&semantic, &keyword, 0.0, 10);
        assert_eq!(fused[0].chunk.id, keyword[0].chunk.id);
    }
}
