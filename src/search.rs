//! Query-time composition: embedder + store + reranker + filter (§4.7).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkType, Normative};
use crate::embed::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::rerank::Reranker;
use crate::store::{Filter, HealthStatus, VectorStoreBackend};

/// A caller-facing search result: exactly the fields the dispatcher's
/// tool responses serialize, nothing else (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub score: f32,
    pub citation: Citation,
    pub chunk_type: ChunkType,
    pub normative: Normative,
    pub token_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_title: String,
    pub section_hierarchy: Vec<String>,
    pub clause_number: String,
    pub page_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionIdentity {
    pub name: String,
    pub dimension: usize,
    pub embedding_model: String,
    pub backend: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerDocumentStats {
    pub document_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub collection: CollectionIdentity,
    pub total_chunks: usize,
    pub total_documents: usize,
    pub per_document: Vec<PerDocumentStats>,
    pub by_chunk_type: HashMap<ChunkType, usize>,
    pub by_normative: HashMap<Normative, usize>,
}

pub struct Searcher {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreBackend>,
    reranker: Arc<dyn Reranker>,
    collection: String,
    rerank_overfetch: usize,
}

impl Searcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreBackend>,
        reranker: Arc<dyn Reranker>,
        collection: impl Into<String>,
        rerank_overfetch: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            collection: collection.into(),
            rerank_overfetch: rerank_overfetch.max(1),
        }
    }

    /// Vector similarity search. When `rerank` is set, over-fetches
    /// `rerank_overfetch * k` candidates and reranks down to `k`.
    pub async fn semantic_search(&self, query: &str, k: usize, filter: &Filter, rerank: bool) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        validate_k(k)?;
        let vector = self.embedder.embed(query).await.map_err(|err| wrap("semantic_search", err))?;

        if rerank {
            let overfetch_limit = k.saturating_mul(self.rerank_overfetch).max(k);
            let candidates = self
                .store
                .search(&self.collection, &vector, overfetch_limit, filter)
                .await
                .map_err(|err| wrap("semantic_search", err))?;
            let reranked = self
                .reranker
                .rerank(query, candidates, k)
                .await
                .map_err(|err| wrap("semantic_search", err))?;
            Ok(reranked.into_iter().map(to_result).collect())
        } else {
            let hits = self
                .store
                .search(&self.collection, &vector, k, filter)
                .await
                .map_err(|err| wrap("semantic_search", err))?;
            Ok(hits.into_iter().map(to_result).collect())
        }
    }

    /// Sparse/keyword match. Errors (rather than silently falling back)
    /// when the backend has no keyword capability, per §4.7.
    pub async fn keyword_search(&self, query: &str, k: usize, filter: &Filter) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        validate_k(k)?;
        let hits = self
            .store
            .keyword_search(&self.collection, query, k, filter)
            .await
            .map_err(|err| wrap("keyword_search", err))?;
        Ok(hits.into_iter().map(to_result).collect())
    }

    /// Dense + sparse fusion. `weight` in `[0, 1]`; `0.0` and `1.0` must
    /// delegate exactly to keyword and semantic search respectively (P7),
    /// which the store backends implement directly.
    pub async fn hybrid_search(&self, query: &str, k: usize, filter: &Filter, weight: f32) -> Result<Vec<SearchResult>> {
        validate_query(query)?;
        validate_k(k)?;
        if !(0.0..=1.0).contains(&weight) {
            return Err(RetrievalError::invalid_input("hybrid_search weight must be in [0, 1]"));
        }
        let vector = self.embedder.embed(query).await.map_err(|err| wrap("hybrid_search", err))?;
        let hits = self
            .store
            .hybrid_search(&self.collection, &vector, query, k, filter, weight)
            .await
            .map_err(|err| wrap("hybrid_search", err))?;
        Ok(hits.into_iter().map(to_result).collect())
    }

    /// Definition-oriented search with a fixed `chunk_type = definition`
    /// filter layered on top of any caller-supplied filter (§4.7).
    pub async fn lookup(&self, term: &str, k: usize, filter: &Filter) -> Result<Vec<SearchResult>> {
        let mut scoped = filter.clone();
        scoped.chunk_type = Some(crate::store::filter::FieldMatch::Eq(ChunkType::Definition));
        self.semantic_search(term, k, &scoped, false).await
    }

    /// Aggregates the whole collection. A plain scan (via
    /// [`VectorStoreBackend::all_chunks`]) rather than per-bucket counting
    /// queries - this is an operator-facing diagnostic, not a hot path.
    pub async fn stats(&self) -> Result<Stats> {
        let chunks = self.store.all_chunks(&self.collection, &Filter::new()).await.map_err(|err| wrap("stats", err))?;

        let mut per_document: HashMap<String, PerDocumentStats> = HashMap::new();
        let mut by_chunk_type: HashMap<ChunkType, usize> = HashMap::new();
        let mut by_normative: HashMap<Normative, usize> = HashMap::new();

        for chunk in &chunks {
            *by_chunk_type.entry(chunk.chunk_type).or_insert(0) += 1;
            *by_normative.entry(chunk.normative).or_insert(0) += 1;

            per_document
                .entry(chunk.document_id.clone())
                .and_modify(|doc| {
                    doc.chunk_count += 1;
                    if chunk.ingested_at > doc.ingested_at {
                        doc.ingested_at = chunk.ingested_at;
                    }
                })
                .or_insert_with(|| PerDocumentStats {
                    document_id: chunk.document_id.clone(),
                    title: chunk.document_title.clone(),
                    chunk_count: 1,
                    ingested_at: chunk.ingested_at,
                });
        }

        let mut per_document: Vec<PerDocumentStats> = per_document.into_values().collect();
        per_document.sort_by(|a, b| a.document_id.cmp(&b.document_id));

        Ok(Stats {
            collection: CollectionIdentity {
                name: self.collection.clone(),
                dimension: self.embedder.dimension(),
                embedding_model: self.embedder.model_identity().to_string(),
                backend: self.store.backend_name(),
            },
            total_chunks: chunks.len(),
            total_documents: per_document.len(),
            per_document,
            by_chunk_type,
            by_normative,
        })
    }

    pub async fn health(&self) -> HealthStatus {
        self.store.health().await
    }
}

fn to_result(hit: crate::store::Hit) -> SearchResult {
    SearchResult {
        content: hit.chunk.content,
        score: hit.score,
        citation: Citation {
            document_title: hit.chunk.document_title,
            section_hierarchy: hit.chunk.section_hierarchy,
            clause_number: hit.chunk.clause_number,
            page_numbers: hit.chunk.page_numbers,
        },
        chunk_type: hit.chunk.chunk_type,
        normative: hit.chunk.normative,
        token_count: hit.chunk.token_count,
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        Err(RetrievalError::invalid_input("query must be non-empty"))
    } else {
        Ok(())
    }
}

fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        Err(RetrievalError::invalid_input("k must be greater than zero"))
    } else {
        Ok(())
    }
}

fn wrap(operation: &str, err: RetrievalError) -> RetrievalError {
    RetrievalError::new(err.kind).with_message(format!("{operation}: {}", err.message.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::MockEmbeddingProvider;
    use crate::rerank::NoopReranker;
    use crate::store::sqlite::SqliteVectorStore;
    use crate::chunk::{ChunkFields, DocumentType};
    use chrono::Utc;

    async fn searcher() -> (Searcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("test.sqlite3")).await.unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::with_dimension(8));
        store.ensure_collection("specsmith", 8, embedder.model_identity()).await.unwrap();

        let chunk = crate::chunk::Chunk::new(ChunkFields {
            document_id: "doc-1".into(),
            document_title: "Widget Spec".into(),
            document_version: "1.0".into(),
            document_type: DocumentType::Standard,
            ordinal: 0,
            content: "Widgets SHALL be blue.".into(),
            token_count: 5,
            section_hierarchy: vec!["4 Requirements".into()],
            clause_number: "4".into(),
            page_numbers: vec![1],
            chunk_type: ChunkType::Prose,
            normative: Normative::Normative,
            table_group_id: None,
            ingested_at: Utc::now(),
        })
        .unwrap();
        let vector = embedder.embed(&chunk.content).await.unwrap();
        let embedded = chunk.with_embedding(vector, embedder.model_identity());
        let store: Arc<dyn VectorStoreBackend> = Arc::new(store);
        store.upsert("specsmith", &[embedded]).await.unwrap();

        let searcher = Searcher::new(embedder, store, Arc::new(NoopReranker), "specsmith", 3);
        (searcher, dir)
    }

    #[tokio::test]
    async fn semantic_search_rejects_empty_query() {
        let (searcher, _dir) = searcher().await;
        assert!(searcher.semantic_search("   ", 5, &Filter::new(), false).await.is_err());
    }

    #[tokio::test]
    async fn semantic_search_returns_ingested_chunk() {
        let (searcher, _dir) = searcher().await;
        let results = searcher.semantic_search("Widgets SHALL be blue.", 5, &Filter::new(), false).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].citation.document_title, "Widget Spec");
    }

    #[tokio::test]
    async fn hybrid_search_rejects_weight_out_of_range() {
        let (searcher, _dir) = searcher().await;
        assert!(searcher.hybrid_search("widgets", 5, &Filter::new(), 1.5).await.is_err());
    }

    #[tokio::test]
    async fn stats_aggregates_by_document_and_type() {
        let (searcher, _dir) = searcher().await;
        let stats = searcher.stats().await.unwrap();
        assert_eq!(stats.collection.name, "specsmith");
        assert_eq!(stats.collection.dimension, 8);
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.per_document[0].document_id, "doc-1");
        assert_eq!(stats.per_document[0].chunk_count, 1);
        assert_eq!(stats.by_chunk_type.get(&ChunkType::Prose), Some(&1));
        assert_eq!(stats.by_normative.get(&Normative::Normative), Some(&1));
    }
}
