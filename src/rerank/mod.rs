//! Cross-encoder reranking: reorders an over-fetched candidate set by a
//! finer-grained query/document relevance score than the vector store's
//! first-pass ranking.

pub mod noop;
pub mod remote;

#[cfg(feature = "local-models")]
pub mod local;

pub use noop::NoopReranker;
pub use remote::RemoteReranker;

#[cfg(feature = "local-models")]
pub use local::LocalReranker;

use async_trait::async_trait;

use crate::error::Result;
use crate::store::Hit;

/// Reorders `hits` against `query`, returning at most `limit` results in
/// descending relevance order. Implementations must not drop hits beyond
/// reordering and truncation - the candidate set is already filtered.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, hits: Vec<Hit>, limit: usize) -> Result<Vec<Hit>>;

    fn model_identity(&self) -> &str;
}
