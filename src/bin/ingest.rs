//! Ingestion CLI: parses one or more source documents and upserts their
//! chunks into the configured vector store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use chrono::Utc;

use specsmith::chunk::DocumentType;
use specsmith::chunker::tokenizer::{Tokenizer, TiktokenTokenizer};
use specsmith::chunker::{Chunker, ChunkerParams, DocumentMeta};
use specsmith::config::{Config, EmbeddingConfig};
use specsmith::embed::EmbeddingProvider;
use specsmith::error::RetrievalError;
use specsmith::ingest::registry::IngestorRegistry;
use specsmith::store::factory::StoreFactory;
use specsmith::store::VectorStoreBackend;

/// Builds the local `fastembed` provider for a `local/`-prefixed model
/// identity. Returns `Ok(None)` when `config.model` doesn't name a local
/// model, so the caller falls through to the remote provider.
#[cfg(feature = "local-models")]
fn try_build_local_embedder(config: &EmbeddingConfig) -> specsmith::Result<Option<Arc<dyn EmbeddingProvider>>> {
    use fastembed::EmbeddingModel;
    use specsmith::embed::LocalEmbeddingProvider;

    if !config.model.starts_with("local/") {
        return Ok(None);
    }
    let model = match config.model.as_str() {
        "local/bge-small-en-v1.5@1" => EmbeddingModel::BGESmallENV15,
        other => return Err(RetrievalError::config(format!("unknown local embedding model '{other}'"))),
    };
    let provider = LocalEmbeddingProvider::new(model, config.model.clone(), config.dimension)?;
    Ok(Some(Arc::new(provider)))
}

#[cfg(not(feature = "local-models"))]
fn try_build_local_embedder(_config: &EmbeddingConfig) -> specsmith::Result<Option<Arc<dyn EmbeddingProvider>>> {
    Ok(None)
}

/// Picks the embedding provider declared by `embedding.model`: the
/// in-process `fastembed` model when the identity is prefixed `local/`
/// and the feature is enabled, otherwise a remote HTTP provider backed
/// by `embedding.endpoint`.
fn build_embedder(config: &EmbeddingConfig) -> specsmith::Result<Arc<dyn EmbeddingProvider>> {
    if let Some(local) = try_build_local_embedder(config)? {
        return Ok(local);
    }

    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| RetrievalError::config("embedding.endpoint is required for remote models"))?;
    let api_key = std::env::var("SPECSMITH_EMBEDDING_API_KEY").ok();
    let mut provider = specsmith::embed::RemoteEmbeddingProvider::new(endpoint, config.model.clone(), config.dimension)?;
    if let Some(key) = api_key {
        provider = provider.with_api_key(key);
    }
    Ok(Arc::new(provider))
}

#[derive(Parser)]
#[command(name = "specsmith-ingest", about = "Ingest documents into the knowledge store")]
struct Args {
    /// Source documents to parse and chunk.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Stable identifier for the document; defaults to the file stem.
    #[arg(long)]
    document_id: Option<String>,

    /// Project config file.
    #[arg(long, default_value = "specsmith.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> specsmith::Result<()> {
    specsmith::telemetry::init();
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let embedder = build_embedder(&config.embedding)?;
    let selected = StoreFactory::build(&config.vector_store).await?;
    if selected.used_fallback {
        info!(target: "specsmith::bin::ingest", reason = ?selected.reason, "using fallback vector store");
    }
    let store: Arc<dyn VectorStoreBackend> = selected.backend;
    let collection = if selected.used_fallback {
        &config.vector_store.fallback.collection
    } else {
        &config.vector_store.primary.collection
    };
    store
        .ensure_collection(collection, config.embedding.dimension, embedder.model_identity())
        .await?;

    let registry = IngestorRegistry::with_defaults();
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::by_name(&config.chunking.tokenizer)?);
    let chunker = Chunker::new(ChunkerParams::from(&config.chunking), tokenizer);

    for path in &args.files {
        let document_id = args
            .document_id
            .clone()
            .unwrap_or_else(|| path.file_stem().and_then(|s| s.to_str()).unwrap_or("document").to_string());

        match ingest_one(&registry, &chunker, &*embedder, &*store, collection, path, &document_id).await {
            Ok(count) => info!(target: "specsmith::bin::ingest", %document_id, chunks = count, "ingested document"),
            Err(err) => error!(target: "specsmith::bin::ingest", %document_id, error = %err, "failed to ingest document"),
        }
    }

    Ok(())
}

async fn ingest_one(
    registry: &IngestorRegistry,
    chunker: &Chunker,
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStoreBackend,
    collection: &str,
    path: &std::path::Path,
    document_id: &str,
) -> specsmith::Result<usize> {
    let elements = registry.parse(path).await?;
    let meta = DocumentMeta {
        document_id: document_id.to_string(),
        document_title: document_id.to_string(),
        document_version: "1".to_string(),
        document_type: DocumentType::Standard,
    };
    let chunks = chunker.chunk_elements(&elements, &meta, Utc::now())?;

    let mut embedded = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let vector = embedder.embed(&chunk.content).await?;
        embedded.push(chunk.with_embedding(vector, embedder.model_identity()));
    }
    store.upsert(collection, &embedded).await
}
