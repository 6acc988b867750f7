//! PDF ingestor, built on `pdf-extract`'s page-aware text extraction.
//!
//! `pdf-extract` yields plain text per page with no structural markup, so
//! headings, clauses, and tables are recovered heuristically from layout
//! cues (leading numbering, blank-line paragraph breaks, whitespace-aligned
//! columns). This mirrors the "opaque parser library" boundary the
//! component design assumes (§4.4): we only promise typed elements, not
//! perfect structural fidelity from a format that doesn't encode structure.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{Element, Ingestor};
use crate::error::{ErrorKind, RetrievalError, Result};

fn heading_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(\d+(?:\.\d+){0,4})\s+(.+)$").unwrap())
}

fn table_row_re() -> &'static regex::Regex {
    // Heuristic: three-or-more columns separated by 2+ spaces or a tab.
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(\t|  +)").unwrap())
}

pub struct PdfIngestor;

impl PdfIngestor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ingestor for PdfIngestor {
    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn parse(&self, path: &Path) -> Result<Vec<Element>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || parse_blocking(&path))
            .await
            .map_err(|err| RetrievalError::new(ErrorKind::Ingestion).with_source(err))?
    }
}

fn parse_blocking(path: &PathBuf) -> Result<Vec<Element>> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|err| {
        RetrievalError::new(ErrorKind::Ingestion)
            .with_message(format!("failed to parse PDF {}", path.display()))
            .with_source(Box::new(err))
    })?;

    let mut elements = Vec::new();
    for (index, page_text) in pages.into_iter().enumerate() {
        let page = (index + 1) as u32;
        for block in page_text.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                tracing::warn!(target: "specsmith::ingest::pdf", page, "skipping empty block");
                continue;
            }
            elements.push(classify_block(block, page));
        }
    }
    Ok(elements)
}

fn classify_block(block: &str, page: u32) -> Element {
    let first_line = block.lines().next().unwrap_or_default();

    if let Some(caps) = heading_re().captures(first_line) {
        if block.lines().count() == 1 && first_line.len() < 120 {
            return Element::SectionHeader {
                level: caps[1].matches('.').count() as u8 + 1,
                text: caps[2].trim().to_string(),
                clause_number: Some(caps[1].to_string()),
                page,
            };
        }
    }

    let lines: Vec<&str> = block.lines().collect();
    let table_like = lines.len() >= 2 && lines.iter().all(|l| table_row_re().is_match(l));
    if table_like {
        let mut rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| table_row_re().split(line).map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .collect();
        let header = rows.remove(0);
        return Element::Table {
            header,
            rows,
            caption: None,
            page_start: page,
            page_end: page,
        };
    }

    Element::Paragraph {
        text: block.to_string(),
        page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_numbered_heading() {
        let element = classify_block("4.2.3 Operating Temperature", 1);
        match element {
            Element::SectionHeader { clause_number, text, .. } => {
                assert_eq!(clause_number.as_deref(), Some("4.2.3"));
                assert_eq!(text, "Operating Temperature");
            }
            other => panic!("expected SectionHeader, got {other:?}"),
        }
    }

    #[test]
    fn classifies_plain_paragraph() {
        let element = classify_block("The device SHALL operate within spec.", 2);
        assert!(matches!(element, Element::Paragraph { .. }));
    }
}
