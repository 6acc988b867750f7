//! Text → vector embedding.

#[cfg(feature = "local-models")]
pub mod local;
pub mod mock;
pub mod remote;

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::error::{ErrorKind, RetrievalError, Result};

#[cfg(feature = "local-models")]
pub use local::LocalEmbeddingProvider;
pub use mock::MockEmbeddingProvider;
pub use remote::RemoteEmbeddingProvider;

/// Text → fixed-dimension vector. Implementations are called from
/// concurrent contexts and must expose no shared mutable state (§4.2).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch, preserving input order. The default implementation
    /// embeds sequentially; implementations that can batch natively (e.g.
    /// one HTTP call per batch) should override this.
    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            for text in chunk {
                out.push(self.embed(text).await?);
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;

    fn model_identity(&self) -> &str;
}

/// Bounded exponential backoff retry for transient embedder failures
/// (connection, timeout, rate limit). Permanent failures (auth, invalid
/// input) surface on the first attempt (§4.2, §7).
pub async fn retry_embed<F, Fut>(max_attempts: u32, operation: F) -> Result<Vec<f32>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<f32>>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(vector) => return Ok(vector),
            Err(err) if err.kind.is_retryable() && attempt < max_attempts => {
                let delay = err.kind.retry_delay().unwrap_or(Duration::from_millis(200));
                warn!(target: "specsmith::embed", attempt, ?delay, kind = ?err.kind, "retrying embed after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn validate_nonempty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        Err(RetrievalError::new(ErrorKind::InvalidInput).with_message("cannot embed empty text"))
    } else {
        Ok(())
    }
}
