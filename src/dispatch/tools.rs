//! The six fixed tools (§4.8), each a thin translation from a validated
//! request into a [`Searcher`] call and back into a [`ToolResponse`].

use serde_json::json;

use super::response::ToolResponse;
use super::validate::{parse_and_validate, LookupRequest, SearchRequest};
use crate::chunk::{ChunkType, DocumentType, Normative};
use crate::error::{RetrievalError, Result};
use crate::search::Searcher;
use crate::store::filter::FieldMatch;
use crate::store::Filter;

pub struct Dispatcher {
    searcher: Searcher,
}

impl Dispatcher {
    pub fn new(searcher: Searcher) -> Self {
        Self { searcher }
    }

    pub async fn dispatch(&self, tool: &str, args: &serde_json::Value) -> ToolResponse {
        let outcome = match tool {
            "knowledge_search" => self.knowledge_search(args).await,
            "knowledge_keyword_search" => self.knowledge_keyword_search(args).await,
            "knowledge_lookup" => self.knowledge_lookup(args).await,
            "knowledge_requirements" => self.knowledge_requirements(args).await,
            "knowledge_stats" => self.knowledge_stats().await,
            "knowledge_health" => self.knowledge_health().await,
            other => Err(RetrievalError::invalid_input(format!("unknown tool '{other}'"))),
        };
        match outcome {
            Ok(response) => response,
            Err(err) => ToolResponse::error(&err),
        }
    }

    async fn knowledge_search(&self, args: &serde_json::Value) -> Result<ToolResponse> {
        let request: SearchRequest = parse_and_validate(args)?;
        let filter = request_filter(&request)?;
        let results = self.searcher.semantic_search(&request.query, request.k as usize, &filter, true).await?;
        Ok(ToolResponse::success(results, json!({"tool": "knowledge_search"})))
    }

    async fn knowledge_keyword_search(&self, args: &serde_json::Value) -> Result<ToolResponse> {
        let request: SearchRequest = parse_and_validate(args)?;
        let filter = request_filter(&request)?;
        let results = self.searcher.keyword_search(&request.query, request.k as usize, &filter).await?;
        Ok(ToolResponse::success(results, json!({"tool": "knowledge_keyword_search"})))
    }

    async fn knowledge_lookup(&self, args: &serde_json::Value) -> Result<ToolResponse> {
        let request: LookupRequest = parse_and_validate(args)?;
        let results = self.searcher.lookup(&request.term, request.k as usize, &Filter::new()).await?;
        Ok(ToolResponse::success(results, json!({"tool": "knowledge_lookup"})))
    }

    async fn knowledge_requirements(&self, args: &serde_json::Value) -> Result<ToolResponse> {
        let request: SearchRequest = parse_and_validate(args)?;
        let mut filter = request_filter(&request)?;
        filter.normative = Some(FieldMatch::Eq(Normative::Normative));
        let results = self.searcher.semantic_search(&request.query, request.k as usize, &filter, true).await?;
        Ok(ToolResponse::success(results, json!({"tool": "knowledge_requirements"})))
    }

    async fn knowledge_stats(&self) -> Result<ToolResponse> {
        let stats = self.searcher.stats().await?;
        Ok(ToolResponse::success(Vec::new(), serde_json::to_value(stats).unwrap_or(json!({}))))
    }

    async fn knowledge_health(&self) -> Result<ToolResponse> {
        let health = self.searcher.health().await;
        Ok(ToolResponse::success(Vec::new(), serde_json::to_value(health).unwrap_or(json!({}))))
    }
}

fn request_filter(request: &SearchRequest) -> Result<Filter> {
    let mut filter = Filter::new();
    if let Some(document_id) = &request.document_id {
        filter.document_id = Some(FieldMatch::Eq(document_id.clone()));
    }
    if let Some(raw) = &request.document_type {
        let value: DocumentType = serde_json::from_value(json!(raw))
            .map_err(|_| RetrievalError::invalid_input(format!("unknown document_type '{raw}'")))?;
        filter.document_type = Some(FieldMatch::Eq(value));
    }
    if let Some(raw) = &request.chunk_type {
        let value: ChunkType = serde_json::from_value(json!(raw))
            .map_err(|_| RetrievalError::invalid_input(format!("unknown chunk_type '{raw}'")))?;
        filter.chunk_type = Some(FieldMatch::Eq(value));
    }
    if let Some(prefix) = &request.clause_prefix {
        filter.clause_number_prefix = Some(prefix.clone());
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkFields};
    use crate::embed::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::rerank::NoopReranker;
    use crate::store::sqlite::SqliteVectorStore;
    use crate::store::VectorStoreBackend;
    use chrono::Utc;
    use std::sync::Arc;

    async fn dispatcher() -> (Dispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("test.sqlite3")).await.unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::with_dimension(8));
        store.ensure_collection("specsmith", 8, embedder.model_identity()).await.unwrap();

        let chunk = Chunk::new(ChunkFields {
            document_id: "doc-1".into(),
            document_title: "Widget Spec".into(),
            document_version: "1.0".into(),
            document_type: DocumentType::Standard,
            ordinal: 0,
            content: "Widgets SHALL be blue.".into(),
            token_count: 5,
            section_hierarchy: vec![],
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
        (Dispatcher::new(searcher), dir)
    }

    #[tokio::test]
    async fn unknown_tool_returns_invalid_input_error() {
        let (dispatcher, _dir) = dispatcher().await;
        let response = dispatcher.dispatch("knowledge_unknown", &json!({})).await;
        match response {
            ToolResponse::Error { error, .. } => assert_eq!(error.code, "invalid_input"),
            ToolResponse::Success { .. } => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn knowledge_search_returns_results() {
        let (dispatcher, _dir) = dispatcher().await;
        let response = dispatcher
            .dispatch("knowledge_search", &json!({"query": "Widgets SHALL be blue.", "k": 5}))
            .await;
        match response {
            ToolResponse::Success { results, .. } => assert_eq!(results.len(), 1),
            ToolResponse::Error { error, .. } => panic!("unexpected error: {:?}", error),
        }
    }

    #[tokio::test]
    async fn knowledge_search_rejects_oversized_k() {
        let (dispatcher, _dir) = dispatcher().await;
        let response = dispatcher.dispatch("knowledge_search", &json!({"query": "widgets", "k": 100})).await;
        match response {
            ToolResponse::Error { error, .. } => assert_eq!(error.code, "invalid_input"),
            ToolResponse::Success { .. } => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn knowledge_stats_reports_collection_totals() {
        let (dispatcher, _dir) = dispatcher().await;
        let response = dispatcher.dispatch("knowledge_stats", &json!({})).await;
        match response {
            ToolResponse::Success { metadata, .. } => {
                assert_eq!(metadata["total_chunks"], 1);
                assert_eq!(metadata["total_documents"], 1);
                assert_eq!(metadata["collection"]["name"], "specsmith");
            }
            ToolResponse::Error { error, .. } => panic!("unexpected error: {:?}", error),
        }
    }

    #[tokio::test]
    async fn knowledge_health_reports_sqlite_backend() {
        let (dispatcher, _dir) = dispatcher().await;
        let response = dispatcher.dispatch("knowledge_health", &json!({})).await;
        match response {
            ToolResponse::Success { metadata, .. } => assert_eq!(metadata["backend"], "sqlite"),
            ToolResponse::Error { error, .. } => panic!("unexpected error: {:?}", error),
        }
    }
}
