//! Element stream → chunk stream.
//!
//! The most intricate component in the crate (§4.5). Implements, in order:
//! section-stack tracking, token-bounded accumulation with boundary
//! preference (section > paragraph > sentence > token), table-safe
//! splitting, overlap, small-chunk merging, clause extraction, and
//! normative classification - ending with content-addressed id assignment
//! so re-ingesting an unchanged document is stable (I5, P3).

pub mod clause;
pub mod config;
pub mod section_stack;
pub mod tables;
pub mod tokenizer;

use chrono::{DateTime, Utc};
use std::sync::OnceLock;

pub use config::ChunkerParams;
use section_stack::SectionStack;
use tokenizer::SharedTokenizer;

use crate::chunk::{classify_normative, Chunk, ChunkFields, ChunkType, DocumentType, Normative};
use crate::error::Result;
use crate::ingest::Element;

/// Document-level metadata attached to every chunk produced from one file.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub document_id: String,
    pub document_title: String,
    pub document_version: String,
    pub document_type: DocumentType,
}

/// One unfinished chunk during assembly: everything [`Chunk::new`] needs
/// except the final ordinal (assigned once the whole stream is known, so
/// that merging doesn't leave ordinal gaps affecting ids elsewhere).
struct Draft {
    content: String,
    token_count: u32,
    section_hierarchy: Vec<String>,
    clause_number: String,
    page_numbers: Vec<u32>,
    chunk_type: ChunkType,
    table_group_id: Option<String>,
    section_marker: Option<crate::chunk::SectionMarker>,
}

pub struct Chunker {
    params: ChunkerParams,
    tokenizer: SharedTokenizer,
}

impl Chunker {
    pub fn new(params: ChunkerParams, tokenizer: SharedTokenizer) -> Self {
        Self { params, tokenizer }
    }

    /// Runs the full algorithm, returning chunks in document order with
    /// stable, content-addressed ids.
    pub fn chunk_elements(
        &self,
        elements: &[Element],
        doc: &DocumentMeta,
        ingested_at: DateTime<Utc>,
    ) -> Result<Vec<Chunk>> {
        let drafts = self.assemble(elements);
        let merged = self.merge_small_chunks(drafts);
        self.finalize(merged, doc, ingested_at)
    }

    /// Step 1-5, 7-8 minus the final ordinal/id (deferred until after
    /// merging): walks the element stream, accumulating prose/list text
    /// into token-bounded buffers and emitting tables/code/figures as
    /// standalone drafts.
    fn assemble(&self, elements: &[Element]) -> Vec<Draft> {
        let mut stack = SectionStack::new();
        let mut drafts = Vec::new();
        let mut buffer = Buffer::new();
        let mut pending_overlap: Option<String> = None;

        for element in elements {
            match element {
                Element::SectionHeader {
                    level,
                    text,
                    clause_number,
                    page: _,
                } => {
                    self.flush_buffer(&mut buffer, &mut drafts, &mut pending_overlap);
                    stack.push(*level, text, clause_number.clone());
                }
                Element::Paragraph { text, page } => {
                    self.accumulate(
                        &mut buffer,
                        &mut drafts,
                        &mut pending_overlap,
                        &stack,
                        ChunkType::Prose,
                        text,
                        *page,
                    );
                }
                Element::ListItem { text, page, .. } => {
                    self.accumulate(
                        &mut buffer,
                        &mut drafts,
                        &mut pending_overlap,
                        &stack,
                        ChunkType::List,
                        text,
                        *page,
                    );
                }
                Element::CodeBlock { text, page, .. } => {
                    self.flush_buffer(&mut buffer, &mut drafts, &mut pending_overlap);
                    drafts.push(self.draft_from_text(text, ChunkType::Code, &stack, &[*page], None));
                    pending_overlap = None;
                }
                Element::FigureCaption { text, page } => {
                    self.flush_buffer(&mut buffer, &mut drafts, &mut pending_overlap);
                    drafts.push(self.draft_from_text(text, ChunkType::FigureCaption, &stack, &[*page], None));
                    pending_overlap = None;
                }
                Element::Table {
                    header,
                    rows,
                    caption,
                    page_start,
                    page_end,
                } => {
                    self.flush_buffer(&mut buffer, &mut drafts, &mut pending_overlap);
                    pending_overlap = None;
                    let parts = tables::split_table(
                        header,
                        rows,
                        caption.as_deref(),
                        *page_start,
                        *page_end,
                        self.params.max_tokens,
                        self.tokenizer.as_ref(),
                    );
                    for part in parts {
                        drafts.push(Draft {
                            content: part.content,
                            token_count: part.token_count,
                            section_hierarchy: stack.hierarchy(),
                            clause_number: clause::extract_clause(
                                part.caption.as_deref().unwrap_or_default(),
                                stack.nearest_clause().as_deref(),
                            ),
                            page_numbers: page_range(part.page_start, part.page_end),
                            chunk_type: ChunkType::Table,
                            table_group_id: part.table_group_id,
                            section_marker: stack.section_marker(),
                        });
                    }
                }
            }
        }

        self.flush_buffer(&mut buffer, &mut drafts, &mut pending_overlap);
        drafts
    }

    fn accumulate(
        &self,
        buffer: &mut Buffer,
        drafts: &mut Vec<Draft>,
        pending_overlap: &mut Option<String>,
        stack: &SectionStack,
        chunk_type: ChunkType,
        text: &str,
        page: u32,
    ) {
        if buffer.chunk_type.is_some_and(|t| t != chunk_type) {
            self.flush_buffer(buffer, drafts, pending_overlap);
        }

        let text_tokens = self.tokenizer.count(text);
        if text_tokens > self.params.max_tokens {
            // A single element too large to fit in one chunk even alone:
            // flush whatever's pending, then split this element itself on
            // sentence boundaries, falling back to raw token windows.
            self.flush_buffer(buffer, drafts, pending_overlap);
            for part in self.split_oversized(text) {
                self.flush_buffer(buffer, drafts, pending_overlap);
                buffer.start(chunk_type, stack.hierarchy(), stack.section_marker());
                buffer.push(&part, page, self.tokenizer.count(&part));
                self.flush_buffer(buffer, drafts, pending_overlap);
            }
            return;
        }

        if buffer.would_overflow(text_tokens, self.params.max_tokens) {
            self.flush_buffer(buffer, drafts, pending_overlap);
        }
        if buffer.chunk_type.is_none() {
            buffer.start(chunk_type, stack.hierarchy(), stack.section_marker());
            if let Some(overlap) = pending_overlap.take() {
                buffer.prepend_overlap(&overlap, &self.params.overlap_separator, self.tokenizer.as_ref());
            }
        }
        buffer.push(text, page, text_tokens);
    }

    fn flush_buffer(&self, buffer: &mut Buffer, drafts: &mut Vec<Draft>, pending_overlap: &mut Option<String>) {
        let Some(flushed) = buffer.take() else { return };
        let clause = clause::extract_clause(&flushed.text, flushed.nearest_clause.as_deref());
        *pending_overlap = Some(self.tokenizer.tail(&flushed.text, self.params.overlap_tokens));
        drafts.push(Draft {
            token_count: self.tokenizer.count(&flushed.text),
            content: flushed.text,
            section_hierarchy: flushed.hierarchy,
            clause_number: clause,
            page_numbers: flushed.pages,
            chunk_type: flushed.chunk_type,
            table_group_id: None,
            section_marker: flushed.section_marker,
        });
    }

    fn draft_from_text(
        &self,
        text: &str,
        chunk_type: ChunkType,
        stack: &SectionStack,
        pages: &[u32],
        table_group_id: Option<String>,
    ) -> Draft {
        Draft {
            token_count: self.tokenizer.count(text),
            content: text.to_string(),
            section_hierarchy: stack.hierarchy(),
            clause_number: clause::extract_clause(text, stack.nearest_clause().as_deref()),
            page_numbers: pages.to_vec(),
            chunk_type,
            table_group_id,
            section_marker: stack.section_marker(),
        }
    }

    /// Boundary preference beyond the element granularity: sentence
    /// boundary, then raw token-window fallback (§4.5 step 3).
    fn split_oversized(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        let mut groups: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0u32;

        for sentence in sentences {
            let sentence_tokens = self.tokenizer.count(&sentence);
            if sentence_tokens > self.params.max_tokens {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                groups.extend(self.tokenizer.split_into_token_windows(&sentence, self.params.max_tokens));
                continue;
            }
            if current_tokens + sentence_tokens > self.params.max_tokens && !current.is_empty() {
                groups.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
            current_tokens += sentence_tokens;
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    /// Step 6: merge any chunk below `min_tokens` with its forward
    /// neighbor in the same section, bounded to one residual exception per
    /// section (P1). Tables are never merge candidates. A second
    /// unmergeable sub-`min_tokens` draft in the same section is forced
    /// onto a same-section neighbor (past `max_tokens` if need be) rather
    /// than standing as a second exception.
    fn merge_small_chunks(&self, drafts: Vec<Draft>) -> Vec<Draft> {
        let mut merged: Vec<Draft> = Vec::with_capacity(drafts.len());
        let mut residual_used: std::collections::HashSet<Vec<String>> = std::collections::HashSet::new();

        let mut iter = drafts.into_iter().peekable();
        while let Some(draft) = iter.next() {
            if draft.chunk_type == ChunkType::Table || draft.token_count >= self.params.min_tokens {
                merged.push(draft);
                continue;
            }

            let can_merge_forward = iter.peek().is_some_and(|next| {
                next.chunk_type != ChunkType::Table
                    && next.section_hierarchy == draft.section_hierarchy
                    && draft.token_count + next.token_count <= self.params.max_tokens
            });

            if can_merge_forward {
                let next = iter.next().expect("peeked Some");
                merged.push(self.merge_drafts(draft, next));
                continue;
            }

            if residual_used.insert(draft.section_hierarchy.clone()) {
                // No legal merge: stands as the section's one bounded
                // residual exception (P1).
                merged.push(draft);
                continue;
            }

            // A second sub-min residual in this section: force-attach to
            // whichever same-section neighbor exists, even past
            // `max_tokens`, rather than emit a second exception.
            let prev_same_section = merged
                .last()
                .is_some_and(|prev| prev.chunk_type != ChunkType::Table && prev.section_hierarchy == draft.section_hierarchy);
            if prev_same_section {
                let prev = merged.pop().expect("checked above");
                merged.push(self.merge_drafts(prev, draft));
            } else if iter
                .peek()
                .is_some_and(|next| next.chunk_type != ChunkType::Table && next.section_hierarchy == draft.section_hierarchy)
            {
                let next = iter.next().expect("peeked Some");
                merged.push(self.merge_drafts(draft, next));
            } else {
                // No same-section neighbor at all (e.g. a lone residual
                // flanked only by tables): nothing legal to attach to.
                merged.push(draft);
            }
        }
        merged
    }

    fn merge_drafts(&self, first: Draft, second: Draft) -> Draft {
        let mut content = first.content;
        content.push('\n');
        content.push_str(&second.content);
        Draft {
            token_count: self.tokenizer.count(&content),
            content,
            section_hierarchy: second.section_hierarchy,
            clause_number: if first.clause_number.is_empty() {
                second.clause_number
            } else {
                first.clause_number
            },
            page_numbers: merge_pages(first.page_numbers, second.page_numbers),
            chunk_type: second.chunk_type,
            table_group_id: second.table_group_id,
            section_marker: second.section_marker.or(first.section_marker),
        }
    }

    fn finalize(&self, drafts: Vec<Draft>, doc: &DocumentMeta, ingested_at: DateTime<Utc>) -> Result<Vec<Chunk>> {
        drafts
            .into_iter()
            .enumerate()
            .map(|(ordinal, draft)| {
                let normative = classify_normative(&draft.content, draft.section_marker);
                Chunk::new(ChunkFields {
                    document_id: doc.document_id.clone(),
                    document_title: doc.document_title.clone(),
                    document_version: doc.document_version.clone(),
                    document_type: doc.document_type,
                    ordinal: ordinal as u64,
                    content: draft.content,
                    token_count: draft.token_count,
                    section_hierarchy: draft.section_hierarchy,
                    clause_number: draft.clause_number,
                    page_numbers: draft.page_numbers,
                    chunk_type: draft.chunk_type,
                    normative,
                    table_group_id: draft.table_group_id,
                    ingested_at,
                })
            })
            .collect()
    }
}

/// Accumulates element text into one chunk-in-progress.
struct Buffer {
    chunk_type: Option<ChunkType>,
    text: String,
    token_count: u32,
    pages: Vec<u32>,
    hierarchy: Vec<String>,
    nearest_clause: Option<String>,
    section_marker: Option<crate::chunk::SectionMarker>,
}

struct FlushedBuffer {
    text: String,
    pages: Vec<u32>,
    hierarchy: Vec<String>,
    nearest_clause: Option<String>,
    chunk_type: ChunkType,
    section_marker: Option<crate::chunk::SectionMarker>,
}

impl Buffer {
    fn new() -> Self {
        Self {
            chunk_type: None,
            text: String::new(),
            token_count: 0,
            pages: Vec::new(),
            hierarchy: Vec::new(),
            nearest_clause: None,
            section_marker: None,
        }
    }

    fn start(&mut self, chunk_type: ChunkType, hierarchy: Vec<String>, section_marker: Option<crate::chunk::SectionMarker>) {
        self.chunk_type = Some(chunk_type);
        self.hierarchy = hierarchy;
        self.section_marker = section_marker;
    }

    fn would_overflow(&self, incoming_tokens: u32, max_tokens: u32) -> bool {
        self.chunk_type.is_some() && self.token_count + incoming_tokens > max_tokens
    }

    fn push(&mut self, text: &str, page: u32, tokens: u32) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(text);
        self.token_count += tokens;
        if !self.pages.contains(&page) {
            self.pages.push(page);
        }
    }

    fn prepend_overlap(&mut self, overlap: &str, separator: &str, tokenizer: &dyn tokenizer::Tokenizer) {
        self.text = format!("{overlap}\n{separator}\n");
        self.token_count = tokenizer.count(&self.text);
    }

    fn take(&mut self) -> Option<FlushedBuffer> {
        let chunk_type = self.chunk_type.take()?;
        if self.text.trim().is_empty() {
            *self = Self::new();
            return None;
        }
        let flushed = FlushedBuffer {
            text: std::mem::take(&mut self.text),
            pages: std::mem::take(&mut self.pages),
            hierarchy: std::mem::take(&mut self.hierarchy),
            nearest_clause: self.nearest_clause.take(),
            chunk_type,
            section_marker: self.section_marker.take(),
        };
        self.token_count = 0;
        Some(flushed)
    }
}

fn page_range(start: u32, end: u32) -> Vec<u32> {
    (start..=end).collect()
}

fn merge_pages(mut a: Vec<u32>, b: Vec<u32>) -> Vec<u32> {
    for page in b {
        if !a.contains(&page) {
            a.push(page);
        }
    }
    a.sort_unstable();
    a
}

fn sentence_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"[^.!?]+[.!?]+(?:\s+|$)|[^.!?]+$").unwrap())
}

fn split_sentences(text: &str) -> Vec<String> {
    let found: Vec<String> = sentence_re()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if found.is_empty() {
        vec![text.trim().to_string()]
    } else {
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::tokenizer::TiktokenTokenizer;
    use std::sync::Arc;

    fn chunker(max_tokens: u32, min_tokens: u32) -> Chunker {
        let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
        Chunker::new(
            ChunkerParams {
                target_tokens: max_tokens / 2,
                max_tokens,
                min_tokens,
                overlap_tokens: 10,
                overlap_separator: "---".into(),
            },
            tokenizer,
        )
    }

    fn doc() -> DocumentMeta {
        DocumentMeta {
            document_id: "doc-1".into(),
            document_title: "Standard 1".into(),
            document_version: "1.0".into(),
            document_type: DocumentType::Standard,
        }
    }

    #[test]
    fn section_and_normative_classification() {
        let chunker = chunker(1000, 50);
        let elements = vec![
            Element::SectionHeader {
                level: 1,
                text: "1 Introduction".into(),
                clause_number: None,
                page: 1,
            },
            Element::Paragraph {
                text: "This document describes general operation.".into(),
                page: 1,
            },
            Element::SectionHeader {
                level: 1,
                text: "2 Requirements".into(),
                clause_number: None,
                page: 2,
            },
            Element::Paragraph {
                text: "4.2.3 The maximum operating temperature SHALL be 85C.".into(),
                page: 2,
            },
        ];

        let chunks = chunker.chunk_elements(&elements, &doc(), Utc::now()).unwrap();
        assert!(chunks.iter().any(|c| c.section_hierarchy == vec!["1 Introduction".to_string()]));
        assert!(chunks.iter().any(|c| c.normative == Normative::Normative));
        assert!(chunks.iter().any(|c| c.clause_number == "4.2.3"));
    }

    #[test]
    fn table_rows_never_split_and_share_group_id_when_oversize() {
        let chunker = chunker(60, 10);
        let header = vec!["Param".into(), "Min".into(), "Max".into()];
        let rows: Vec<Vec<String>> = (0..40)
            .map(|i| vec![format!("p{i}"), "0".into(), "100".into()])
            .collect();
        let elements = vec![Element::Table {
            header,
            rows,
            caption: Some("Table 1 - Parameters".into()),
            page_start: 1,
            page_end: 2,
        }];

        let chunks = chunker.chunk_elements(&elements, &doc(), Utc::now()).unwrap();
        assert!(chunks.len() >= 2);
        let group_id = chunks[0].table_group_id.clone();
        assert!(group_id.is_some());
        for chunk in &chunks {
            assert_eq!(chunk.chunk_type, ChunkType::Table);
            assert_eq!(chunk.table_group_id, group_id);
            assert!(chunk.content.contains("Param"));
        }
    }

    #[test]
    fn reingesting_unchanged_elements_is_stable() {
        let chunker = chunker(1000, 10);
        let elements = vec![Element::Paragraph {
            text: "Stable content for id derivation.".into(),
            page: 1,
        }];
        let first = chunker.chunk_elements(&elements, &doc(), Utc::now()).unwrap();
        let second = chunker.chunk_elements(&elements, &doc(), Utc::now()).unwrap();
        assert_eq!(first.iter().map(|c| &c.id).collect::<Vec<_>>(), second.iter().map(|c| &c.id).collect::<Vec<_>>());
    }

    #[test]
    fn small_residual_chunk_may_fall_below_min_tokens() {
        let chunker = chunker(1000, 500);
        let elements = vec![Element::Paragraph {
            text: "Short.".into(),
            page: 1,
        }];
        let chunks = chunker.chunk_elements(&elements, &doc(), Utc::now()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].token_count < 500);
    }
}
