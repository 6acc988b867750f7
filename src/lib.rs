//! Semantic retrieval over structured technical documents.
//!
//! Pipeline: [`ingest`] parses source documents into structural elements,
//! [`chunker`] assembles those into searchable [`chunk::Chunk`]s,
//! [`embed`] turns chunk content into vectors, [`store`] persists and
//! queries them, [`rerank`] refines candidate ordering, [`search`]
//! composes all of the above into the query-time API, and [`dispatch`]
//! exposes that API as a fixed set of tools with strict schemas.

pub mod chunk;
pub mod chunker;
pub mod config;
pub mod dispatch;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod rerank;
pub mod search;
pub mod store;
pub mod telemetry;

pub use chunk::{Chunk, ChunkType, Collection, DocumentType, Normative};
pub use config::Config;
pub use error::{ErrorKind, Result, RetrievalError};
pub use search::Searcher;
