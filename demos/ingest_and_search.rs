//! End-to-end pipeline demo: element stream -> chunks -> embeddings ->
//! SQLite store -> semantic search, without any of the real ingestors,
//! config file, or network collaborators.
//!
//! ```bash
//! cargo run --example ingest_and_search
//! ```

use std::sync::Arc;

use chrono::Utc;
use specsmith::chunker::tokenizer::TiktokenTokenizer;
use specsmith::chunker::{Chunker, ChunkerParams, DocumentMeta};
use specsmith::embed::{EmbeddingProvider, MockEmbeddingProvider};
use specsmith::ingest::Element;
use specsmith::rerank::NoopReranker;
use specsmith::store::sqlite::SqliteVectorStore;
use specsmith::store::{Filter, VectorStoreBackend};
use specsmith::{Chunk, DocumentType, Searcher};

#[tokio::main]
async fn main() -> specsmith::Result<()> {
    let elements = vec![
        Element::SectionHeader {
            level: 1,
            text: "Power Requirements".into(),
            clause_number: Some("4".into()),
            page: 1,
        },
        Element::Paragraph {
            text: "The widget SHALL draw no more than 5 watts under normal load.".into(),
            page: 1,
        },
        Element::Paragraph {
            text: "Operators should avoid running the widget above its rated voltage.".into(),
            page: 2,
        },
    ];

    let tokenizer: Arc<dyn specsmith::chunker::tokenizer::Tokenizer> = Arc::new(TiktokenTokenizer::cl100k()?);
    let chunker = Chunker::new(ChunkerParams::default(), tokenizer);
    let doc = DocumentMeta {
        document_id: "widget-spec-v1".into(),
        document_title: "Widget Power Specification".into(),
        document_version: "1.0".into(),
        document_type: DocumentType::Specification,
    };
    let chunks: Vec<Chunk> = chunker.chunk_elements(&elements, &doc, Utc::now())?;
    println!("chunked into {} chunks", chunks.len());

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::with_dimension(16));
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteVectorStore::open(dir.path().join("demo.sqlite3")).await?;
    store.ensure_collection("widgets", 16, embedder.model_identity()).await?;

    let mut embedded = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let vector = embedder.embed(&chunk.content).await?;
        embedded.push(chunk.with_embedding(vector, embedder.model_identity()));
    }
    let store: Arc<dyn VectorStoreBackend> = Arc::new(store);
    let written = store.upsert("widgets", &embedded).await?;
    println!("wrote {written} chunks to the store");

    let searcher = Searcher::new(embedder, store, Arc::new(NoopReranker), "widgets", 3);
    let results = searcher.semantic_search("how much power does the widget use", 3, &Filter::new(), false).await?;
    for result in &results {
        println!("[{}] {}", result.citation.clause_number, result.content);
    }

    let stats = searcher.stats().await?;
    println!("collection {} holds {} chunks across {} documents", stats.collection.name, stats.total_chunks, stats.total_documents);

    Ok(())
}
