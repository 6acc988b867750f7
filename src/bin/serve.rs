//! Dispatcher CLI: reads newline-delimited tool calls from stdin and writes
//! newline-delimited [`ToolResponse`]s to stdout.
//!
//! Framing (line-delimited JSON on stdio) is a placeholder transport only -
//! the real wire protocol (stdio framing, JSON-RPC envelope) is out of
//! scope here and belongs to whatever outer process embeds this binary.
//! Each input line is `{"tool": "knowledge_search", "args": {...}}`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use specsmith::config::Config;
use specsmith::dispatch::Dispatcher;
use specsmith::embed::EmbeddingProvider;
use specsmith::rerank::{NoopReranker, RemoteReranker, Reranker};
use specsmith::search::Searcher;
use specsmith::store::factory::StoreFactory;
use specsmith::store::VectorStoreBackend;

#[derive(Parser)]
#[command(name = "specsmith-serve", about = "Serve knowledge tool calls over stdio")]
struct Args {
    /// Project config file.
    #[arg(long, default_value = "specsmith.toml")]
    config: PathBuf,
}

#[derive(Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[tokio::main]
async fn main() -> specsmith::Result<()> {
    specsmith::telemetry::init();
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let embedder = build_embedder(&config)?;
    let selected = StoreFactory::build(&config.vector_store).await?;
    if selected.used_fallback {
        warn!(target: "specsmith::bin::serve", reason = ?selected.reason, "serving from fallback vector store");
    }
    let store: Arc<dyn VectorStoreBackend> = selected.backend;
    let collection = if selected.used_fallback {
        config.vector_store.fallback.collection.clone()
    } else {
        config.vector_store.primary.collection.clone()
    };

    let reranker = build_reranker(&config)?;
    let searcher = Searcher::new(embedder, store, reranker, collection, config.search.rerank_overfetch);
    let dispatcher = Dispatcher::new(searcher);

    info!(target: "specsmith::bin::serve", "ready, reading tool calls from stdin");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await.map_err(|err| {
        specsmith::RetrievalError::connection("reading stdin").with_source(err)
    })? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolCall>(&line) {
            Ok(call) => dispatcher.dispatch(&call.tool, &call.args).await,
            Err(err) => {
                specsmith::dispatch::ToolResponse::error(&specsmith::RetrievalError::invalid_input(format!(
                    "malformed tool call: {err}"
                )))
            }
        };
        let serialized = serde_json::to_string(&response).unwrap_or_else(|_| {
            "{\"isError\":true,\"error\":{\"code\":\"internal\",\"message\":\"failed to serialize response\",\"recoverable\":false,\"suggestion\":\"\"}}".to_string()
        });
        if let Err(err) = stdout.write_all(serialized.as_bytes()).await {
            error!(target: "specsmith::bin::serve", error = %err, "failed writing response");
            break;
        }
        let _ = stdout.write_all(b"\n").await;
        let _ = stdout.flush().await;
    }

    Ok(())
}

fn build_embedder(config: &Config) -> specsmith::Result<Arc<dyn EmbeddingProvider>> {
    #[cfg(feature = "local-models")]
    if config.embedding.model.starts_with("local/") {
        use fastembed::EmbeddingModel;
        use specsmith::embed::LocalEmbeddingProvider;

        let model = match config.embedding.model.as_str() {
            "local/bge-small-en-v1.5@1" => EmbeddingModel::BGESmallENV15,
            other => {
                return Err(specsmith::RetrievalError::config(format!(
                    "unknown local embedding model '{other}'"
                )))
            }
        };
        let provider = LocalEmbeddingProvider::new(model, config.embedding.model.clone(), config.embedding.dimension)?;
        return Ok(Arc::new(provider));
    }

    let endpoint = config
        .embedding
        .endpoint
        .clone()
        .ok_or_else(|| specsmith::RetrievalError::config("embedding.endpoint is required for remote models"))?;
    let api_key = std::env::var("SPECSMITH_EMBEDDING_API_KEY").ok();
    let mut provider = specsmith::embed::RemoteEmbeddingProvider::new(
        endpoint,
        config.embedding.model.clone(),
        config.embedding.dimension,
    )?;
    if let Some(key) = api_key {
        provider = provider.with_api_key(key);
    }
    Ok(Arc::new(provider))
}

fn build_reranker(config: &Config) -> specsmith::Result<Arc<dyn Reranker>> {
    if !config.search.rerank.enabled {
        return Ok(Arc::new(NoopReranker));
    }
    let model = config
        .search
        .rerank
        .model
        .clone()
        .unwrap_or_else(|| "cross-encoder".to_string());

    #[cfg(feature = "local-models")]
    if model.starts_with("local/") {
        use fastembed::RerankerModel;
        use specsmith::rerank::LocalReranker;

        let reranker = LocalReranker::new(RerankerModel::BGERerankerBase, model)?;
        return Ok(Arc::new(reranker));
    }

    let endpoint = config
        .embedding
        .endpoint
        .clone()
        .ok_or_else(|| specsmith::RetrievalError::config("search.rerank.model requires a remote endpoint"))?;
    let mut reranker = RemoteReranker::new(endpoint, model)?;
    if let Ok(key) = std::env::var("SPECSMITH_EMBEDDING_API_KEY") {
        reranker = reranker.with_api_key(key);
    }
    Ok(Arc::new(reranker))
}
