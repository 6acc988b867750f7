//! Integration tests for the fallback (SQLite) vector store, exercised
//! through the public [`VectorStoreBackend`] contract rather than any
//! internal detail - the same way `wg-ragsmith`'s
//! `tests/integration_mock_embeddings.rs` drives its pipeline end to end.

use std::sync::Arc;

use chrono::Utc;
use specsmith::chunk::{Chunk, ChunkFields, ChunkType, DocumentType, Normative};
use specsmith::embed::{EmbeddingProvider, MockEmbeddingProvider};
use specsmith::store::sqlite::SqliteVectorStore;
use specsmith::store::{Filter, VectorStoreBackend};

const DIM: usize = 16;

async fn store() -> (SqliteVectorStore, Arc<dyn EmbeddingProvider>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteVectorStore::open(dir.path().join("store.sqlite3")).await.unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::with_dimension(DIM));
    store.ensure_collection("docs", DIM, embedder.model_identity()).await.unwrap();
    (store, embedder, dir)
}

fn fields(document_id: &str, ordinal: u64, content: &str, clause_number: &str, normative: Normative) -> ChunkFields {
    ChunkFields {
        document_id: document_id.into(),
        document_title: "Widget Spec".into(),
        document_version: "1.0".into(),
        document_type: DocumentType::Specification,
        ordinal,
        content: content.into(),
        token_count: content.split_whitespace().count() as u32,
        section_hierarchy: vec!["4 Requirements".into()],
        clause_number: clause_number.into(),
        page_numbers: vec![1],
        chunk_type: ChunkType::Prose,
        normative,
        table_group_id: None,
        ingested_at: Utc::now(),
    }
}

async fn embed_and_upsert(store: &SqliteVectorStore, embedder: &Arc<dyn EmbeddingProvider>, chunk: Chunk) -> Chunk {
    let vector = embedder.embed(&chunk.content).await.unwrap();
    let embedded = chunk.with_embedding(vector, embedder.model_identity());
    store.upsert("docs", std::slice::from_ref(&embedded)).await.unwrap();
    embedded
}

/// P4: a chunk is retrievable by its own content within the top 3 results.
#[tokio::test]
async fn semantic_search_retrieves_inserted_chunk_within_top_three() {
    let (store, embedder, _dir) = store().await;
    let target = Chunk::new(fields(
        "doc-1",
        0,
        "The maximum operating temperature SHALL be 85 degrees Celsius.",
        "4.2.3",
        Normative::Normative,
    ))
    .unwrap();
    embed_and_upsert(&store, &embedder, target.clone()).await;

    for i in 1..5 {
        let filler = Chunk::new(fields("doc-1", i, &format!("Unrelated filler content number {i}."), "4.2.3", Normative::Unknown)).unwrap();
        embed_and_upsert(&store, &embedder, filler).await;
    }

    let query_vector = embedder.embed(&target.content).await.unwrap();
    let hits = store.search("docs", &query_vector, 3, &Filter::new()).await.unwrap();
    assert!(hits.iter().any(|hit| hit.chunk.id == target.id));
}

/// S3: the top hit for a query carries the expected clause citation.
#[tokio::test]
async fn search_result_carries_source_clause_number() {
    let (store, embedder, _dir) = store().await;
    let target = Chunk::new(fields(
        "doc-1",
        0,
        "The maximum operating temperature SHALL be 85 degrees Celsius.",
        "4.2.3",
        Normative::Normative,
    ))
    .unwrap();
    embed_and_upsert(&store, &embedder, target.clone()).await;
    for i in 1..5 {
        let filler = Chunk::new(fields("doc-1", i, &format!("Unrelated filler content number {i}."), "9.9", Normative::Unknown)).unwrap();
        embed_and_upsert(&store, &embedder, filler).await;
    }

    // The mock embedder has no semantic notion of similarity, only
    // deterministic hashing - querying with the chunk's own content is
    // the one query guaranteed to rank it first (cosine similarity 1.0).
    let query_vector = embedder.embed(&target.content).await.unwrap();
    let hits = store.search("docs", &query_vector, 5, &Filter::new()).await.unwrap();
    let top = hits.first().expect("expected at least one hit");
    assert_eq!(top.chunk.clause_number, "4.2.3");
}

/// S4: a normative-only filter excludes informative/unknown chunks
/// regardless of corpus-wide distribution.
#[tokio::test]
async fn normative_filter_excludes_other_classifications() {
    let (store, embedder, _dir) = store().await;
    let normative = Chunk::new(fields("doc-1", 0, "Systems SHALL fail safe.", "5.1", Normative::Normative)).unwrap();
    let informative = Chunk::new(fields("doc-1", 1, "NOTE: this is informational only.", "5.2", Normative::Informative)).unwrap();
    let unknown = Chunk::new(fields("doc-1", 2, "General background text.", "5.3", Normative::Unknown)).unwrap();
    embed_and_upsert(&store, &embedder, normative.clone()).await;
    embed_and_upsert(&store, &embedder, informative).await;
    embed_and_upsert(&store, &embedder, unknown).await;

    let query_vector = embedder.embed("safety integrity").await.unwrap();
    let filter = Filter::new().with_normative(Normative::Normative);
    let hits = store.search("docs", &query_vector, 10, &filter).await.unwrap();

    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.chunk.normative == Normative::Normative));
}

/// P7: hybrid_search at the weight extremes delegates exactly to the
/// single-mode searches.
#[tokio::test]
async fn hybrid_search_delegates_exactly_at_weight_extremes() {
    let (store, embedder, _dir) = store().await;
    for (i, text) in ["alpha beta gamma", "delta epsilon zeta", "eta theta iota"].iter().enumerate() {
        let chunk = Chunk::new(fields("doc-1", i as u64, text, "1", Normative::Unknown)).unwrap();
        embed_and_upsert(&store, &embedder, chunk).await;
    }

    let query_vector = embedder.embed("alpha beta gamma").await.unwrap();
    let filter = Filter::new();

    let semantic = store.search("docs", &query_vector, 5, &filter).await.unwrap();
    let hybrid_one = store.hybrid_search("docs", &query_vector, "alpha beta gamma", 5, &filter, 1.0).await.unwrap();
    assert_eq!(
        semantic.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>(),
        hybrid_one.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>()
    );

    let keyword = store.keyword_search("docs", "alpha beta gamma", 5, &filter).await.unwrap();
    let hybrid_zero = store.hybrid_search("docs", &query_vector, "alpha beta gamma", 5, &filter, 0.0).await.unwrap();
    assert_eq!(
        keyword.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>(),
        hybrid_zero.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>()
    );
}

/// S6: re-ingesting the same chunk id is a dedup write, not a duplicate insert.
#[tokio::test]
async fn reupserting_same_chunk_id_does_not_grow_the_collection() {
    let (store, embedder, _dir) = store().await;
    let chunk = Chunk::new(fields("doc-1", 0, "Stable content for dedup.", "1", Normative::Unknown)).unwrap();
    let embedded = embed_and_upsert(&store, &embedder, chunk.clone()).await;

    let first_count = store.count("docs", &Filter::new()).await.unwrap();
    assert_eq!(first_count, 1);

    store.upsert("docs", &[embedded]).await.unwrap();
    let second_count = store.count("docs", &Filter::new()).await.unwrap();
    assert_eq!(second_count, first_count);
}

/// P5: a chunk embedded under the wrong model is rejected at `upsert`,
/// not silently stored.
#[tokio::test]
async fn upsert_rejects_chunk_with_mismatched_embedding_model() {
    let (store, embedder, _dir) = store().await;
    let chunk = Chunk::new(fields("doc-1", 0, "Widgets SHALL be blue.", "1", Normative::Normative)).unwrap();
    let vector = embedder.embed(&chunk.content).await.unwrap();
    let mismatched = chunk.with_embedding(vector, "some-other-model@2");

    let result = store.upsert("docs", &[mismatched]).await;
    assert!(result.is_err());
    assert_eq!(store.count("docs", &Filter::new()).await.unwrap(), 0);
}

/// `delete_document` removes every chunk belonging to that document and
/// no others.
#[tokio::test]
async fn delete_document_removes_only_its_own_chunks() {
    let (store, embedder, _dir) = store().await;
    let keep = Chunk::new(fields("doc-keep", 0, "Keep this chunk.", "1", Normative::Unknown)).unwrap();
    let drop = Chunk::new(fields("doc-drop", 0, "Drop this chunk.", "1", Normative::Unknown)).unwrap();
    embed_and_upsert(&store, &embedder, keep.clone()).await;
    embed_and_upsert(&store, &embedder, drop).await;

    let removed = store.delete_document("docs", "doc-drop").await.unwrap();
    assert_eq!(removed, 1);

    let remaining = store.all_chunks("docs", &Filter::new()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
}
