//! In-process embedding via `fastembed` (ONNX). `fastembed`'s API is
//! synchronous, so every call is offloaded to the blocking thread pool -
//! otherwise a local embed would starve other concurrent tool calls on the
//! cooperative scheduler (§4.2, §5).

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::error::{ErrorKind, RetrievalError, Result};

pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
    identity: String,
}

impl LocalEmbeddingProvider {
    pub fn new(model: EmbeddingModel, identity: impl Into<String>, dimension: usize) -> Result<Self> {
        let init = InitOptions::new(model).with_show_download_progress(false);
        let embedding = TextEmbedding::try_new(init).map_err(|err| {
            RetrievalError::new(ErrorKind::Internal)
                .with_message("failed to load local embedding model")
                .with_source(err.to_string())
        })?;
        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            dimension,
            identity: identity.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        super::validate_nonempty(text)?;
        let mut vectors = self.embed_batch(&[text.to_string()], 1).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::new(ErrorKind::Internal).with_message("local embedder returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            super::validate_nonempty(text)?;
        }
        let model = self.model.clone();
        let owned: Vec<String> = texts.to_vec();
        let cap = batch_size.max(1);

        tokio::task::spawn_blocking(move || {
            let guard = model.blocking_lock();
            guard
                .embed(owned, Some(cap))
                .map_err(|err| RetrievalError::new(ErrorKind::Internal).with_message("local embedding inference failed").with_source(err.to_string()))
        })
        .await
        .map_err(|err| RetrievalError::new(ErrorKind::Internal).with_source(err))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_identity(&self) -> &str {
        &self.identity
    }
}
