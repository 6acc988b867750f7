//! In-process cross-encoder reranking via `fastembed`'s `TextRerank`.
//! Like the local embedder, inference runs on the blocking thread pool
//! so it never stalls the async scheduler (§4.2, §5).

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::Reranker;
use crate::error::{ErrorKind, RetrievalError, Result};
use crate::store::Hit;

pub struct LocalReranker {
    model: Arc<Mutex<TextRerank>>,
    identity: String,
}

impl LocalReranker {
    pub fn new(model: RerankerModel, identity: impl Into<String>) -> Result<Self> {
        let init = RerankInitOptions::new(model).with_show_download_progress(false);
        let reranker = TextRerank::try_new(init).map_err(|err| {
            RetrievalError::new(ErrorKind::Internal)
                .with_message("failed to load local reranker model")
                .with_source(err.to_string())
        })?;
        Ok(Self {
            model: Arc::new(Mutex::new(reranker)),
            identity: identity.into(),
        })
    }
}

#[async_trait]
impl Reranker for LocalReranker {
    async fn rerank(&self, query: &str, hits: Vec<Hit>, limit: usize) -> Result<Vec<Hit>> {
        if hits.is_empty() {
            return Ok(hits);
        }
        let model = self.model.clone();
        let query_owned = query.to_string();
        let documents: Vec<String> = hits.iter().map(|hit| hit.chunk.content.clone()).collect();

        let ranked = tokio::task::spawn_blocking(move || {
            let guard = model.blocking_lock();
            guard
                .rerank(query_owned, documents, false, None)
                .map_err(|err| RetrievalError::new(ErrorKind::Internal).with_message("local rerank inference failed").with_source(err.to_string()))
        })
        .await
        .map_err(|err| RetrievalError::new(ErrorKind::Internal).with_source(err))??;

        let mut scored: Vec<Hit> = ranked
            .into_iter()
            .filter_map(|result| {
                hits.get(result.index).map(|hit| Hit {
                    chunk: hit.chunk.clone(),
                    score: result.score,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn model_identity(&self) -> &str {
        &self.identity
    }
}
