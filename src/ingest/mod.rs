//! Source-file parsing: turns a document into a typed element stream.
//!
//! Document parser internals are an opaque library collaborator (spec §1);
//! this module only defines the element shapes an [`Ingestor`] must produce
//! and the registry that dispatches by file extension.

pub mod docx;
pub mod pdf;
pub mod registry;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

pub use registry::IngestorRegistry;

/// One parsed unit from a source document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    SectionHeader {
        level: u8,
        text: String,
        clause_number: Option<String>,
        page: u32,
    },
    Paragraph {
        text: String,
        page: u32,
    },
    ListItem {
        text: String,
        level: u8,
        page: u32,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
        caption: Option<String>,
        page_start: u32,
        page_end: u32,
    },
    CodeBlock {
        text: String,
        language: Option<String>,
        page: u32,
    },
    FigureCaption {
        text: String,
        page: u32,
    },
}

/// Parses one source file into a finite, ordered element stream.
///
/// A parser failure on a single element is not this trait's concern - it is
/// handled inside the implementation, which logs a warning and omits the
/// element (§4.4). A failure to parse the document at all should be
/// returned as `Err` with [`crate::error::ErrorKind::Ingestion`].
#[async_trait]
pub trait Ingestor: Send + Sync {
    /// File extensions this ingestor claims, lowercase, without the dot.
    fn extensions(&self) -> &[&str];

    async fn parse(&self, path: &Path) -> Result<Vec<Element>>;
}
