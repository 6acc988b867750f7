//! Identity reranker: preserves the vector store's own ranking. Used
//! when reranking is disabled in configuration (§4.4, §4.6).

use async_trait::async_trait;

use super::Reranker;
use crate::error::Result;
use crate::store::Hit;

pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, mut hits: Vec<Hit>, limit: usize) -> Result<Vec<Hit>> {
        hits.truncate(limit);
        Ok(hits)
    }

    fn model_identity(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkFields, ChunkType, DocumentType, Normative};
    use chrono::Utc;

    fn hit(ordinal: u64, score: f32) -> Hit {
        let chunk = Chunk::new(ChunkFields {
            document_id: "d".into(),
            document_title: "t".into(),
            document_version: "1".into(),
            document_type: DocumentType::Standard,
            ordinal,
            content: format!("content {ordinal}"),
            token_count: 5,
            section_hierarchy: vec![],
            clause_number: String::new(),
            page_numbers: vec![1],
            chunk_type: ChunkType::Prose,
            normative: Normative::Unknown,
            table_group_id: None,
            ingested_at: Utc::now(),
        })
        .unwrap();
        Hit { chunk, score }
    }

    #[tokio::test]
    async fn truncates_without_reordering() {
        let hits = vec![hit(0, 0.9), hit(1, 0.5), hit(2, 0.2)];
        let reranked = NoopReranker.rerank("query", hits.clone(), 2).await.unwrap();
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].chunk.id, hits[0].chunk.id);
        assert_eq!(reranked[1].chunk.id, hits[1].chunk.id);
    }
}
