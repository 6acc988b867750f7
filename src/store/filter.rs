//! The filter language (§4.3): equality and set-membership over a fixed
//! set of fields, plus a clause-number prefix match. Each backend
//! translates this into its native query form; combinations it can't
//! express fail with a typed error rather than silently ignoring part of
//! the filter.

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkType, DocumentType, Normative};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub document_id: Option<FieldMatch<String>>,
    pub document_type: Option<FieldMatch<DocumentType>>,
    pub chunk_type: Option<FieldMatch<ChunkType>>,
    pub normative: Option<FieldMatch<Normative>>,
    pub clause_number_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMatch<T> {
    Eq(T),
    In(Vec<T>),
}

impl<T: PartialEq> FieldMatch<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Self::Eq(expected) => expected == value,
            Self::In(options) => options.contains(value),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(FieldMatch::Eq(id.into()));
        self
    }

    #[must_use]
    pub fn with_document_type(mut self, value: DocumentType) -> Self {
        self.document_type = Some(FieldMatch::Eq(value));
        self
    }

    #[must_use]
    pub fn with_chunk_type(mut self, value: ChunkType) -> Self {
        self.chunk_type = Some(FieldMatch::Eq(value));
        self
    }

    #[must_use]
    pub fn with_normative(mut self, value: Normative) -> Self {
        self.normative = Some(FieldMatch::Eq(value));
        self
    }

    #[must_use]
    pub fn with_clause_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.clause_number_prefix = Some(prefix.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.document_id.is_none()
            && self.document_type.is_none()
            && self.chunk_type.is_none()
            && self.normative.is_none()
            && self.clause_number_prefix.is_none()
    }

    /// Evaluates the filter against a chunk's fields directly - used by
    /// the SQLite backend, which applies filters in application code
    /// rather than via a native query language.
    pub fn matches(&self, chunk: &crate::chunk::Chunk) -> bool {
        if let Some(m) = &self.document_id {
            if !m.matches(&chunk.document_id) {
                return false;
            }
        }
        if let Some(m) = &self.document_type {
            if !m.matches(&chunk.document_type) {
                return false;
            }
        }
        if let Some(m) = &self.chunk_type {
            if !m.matches(&chunk.chunk_type) {
                return false;
            }
        }
        if let Some(m) = &self.normative {
            if !m.matches(&chunk.normative) {
                return false;
            }
        }
        if let Some(prefix) = &self.clause_number_prefix {
            if !chunk.clause_number.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFields};
    use chrono::Utc;

    fn chunk(document_id: &str, normative: Normative) -> crate::chunk::Chunk {
        crate::chunk::Chunk::new(ChunkFields {
            document_id: document_id.into(),
            document_title: "t".into(),
            document_version: "1".into(),
            document_type: DocumentType::Standard,
            ordinal: 0,
            content: "content".into(),
            token_count: 10,
            section_hierarchy: vec![],
            clause_number: "4.2".into(),
            page_numbers: vec![1],
            chunk_type: ChunkType::Prose,
            normative,
            table_group_id: None,
            ingested_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&chunk("d1", Normative::Unknown)));
    }

    #[test]
    fn document_id_filter_excludes_others() {
        let filter = Filter::new().with_document_id("d1");
        assert!(filter.matches(&chunk("d1", Normative::Unknown)));
        assert!(!filter.matches(&chunk("d2", Normative::Unknown)));
    }

    #[test]
    fn clause_prefix_matches() {
        let filter = Filter::new().with_clause_prefix("4");
        assert!(filter.matches(&chunk("d1", Normative::Unknown)));
        let filter = Filter::new().with_clause_prefix("5");
        assert!(!filter.matches(&chunk("d1", Normative::Unknown)));
    }
}
