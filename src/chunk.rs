//! The chunk model: an immutable, content-addressed searchable unit.
//!
//! `chunk_type` is a tagged variant, not an inheritance hierarchy; table
//! specific data (header row, group id) is carried on [`Chunk`] itself with
//! fields documented as meaningful only for that variant.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::error::{ErrorKind, RetrievalError, Result};

/// Kind of document a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Standard,
    Handbook,
    Specification,
    Other,
}

/// The structural role a chunk plays in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Prose,
    Table,
    List,
    Code,
    FigureCaption,
    Definition,
}

/// Whether a chunk carries a binding requirement, per RFC 2119 (I4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normative {
    Normative,
    Informative,
    Unknown,
}

fn normative_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(SHALL|MUST|REQUIRED|SHOULD|RECOMMENDED)\b").unwrap())
}

fn informative_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(MAY|OPTIONAL|CAN|NOTE|EXAMPLE|INFORMATIVE)\b").unwrap())
}

/// A section-level override marker, e.g. a heading suffixed `(normative)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionMarker {
    Normative,
    Informative,
}

/// Applies the deterministic classification rule of invariant I4: a
/// section-level marker always wins; otherwise the first RFC 2119 verb
/// found in `text` decides; absent both, the chunk is `unknown`.
pub fn classify_normative(text: &str, section_marker: Option<SectionMarker>) -> Normative {
    if let Some(marker) = section_marker {
        return match marker {
            SectionMarker::Normative => Normative::Normative,
            SectionMarker::Informative => Normative::Informative,
        };
    }
    if normative_verb_re().is_match(text) {
        Normative::Normative
    } else if informative_marker_re().is_match(text) {
        Normative::Informative
    } else {
        Normative::Unknown
    }
}

fn clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+){0,4}").unwrap())
}

/// Validates a clause number against the dotted-digit grammar required by
/// the data model (`\d+(\.\d+){0,4}`), allowing an empty clause.
pub fn validate_clause_number(clause: &str) -> Result<()> {
    if clause.is_empty() || clause_re().is_match(clause) && clause_re().find(clause).unwrap().as_str() == clause {
        Ok(())
    } else {
        Err(RetrievalError::invalid_input(format!(
            "clause_number '{clause}' does not match \\d+(\\.\\d+){{0,4}}"
        )))
    }
}

/// An immutable, searchable fragment of a source document.
///
/// Constructed via [`Chunk::new`], which derives [`Chunk::content_hash`] and
/// [`Chunk::id`] and validates every field. Use [`Chunk::with_embedding`] to
/// obtain a new instance carrying a vector - the original is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub content_hash: String,
    pub token_count: u32,
    pub document_id: String,
    pub document_title: String,
    pub document_version: String,
    pub document_type: DocumentType,
    pub section_hierarchy: Vec<String>,
    pub clause_number: String,
    pub page_numbers: Vec<u32>,
    pub chunk_type: ChunkType,
    pub normative: Normative,
    /// Only meaningful when `chunk_type == Table` and the source table was
    /// split: all parts of one original table share this id.
    pub table_group_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// Everything [`Chunk::new`] needs that isn't derived.
pub struct ChunkFields {
    pub document_id: String,
    pub document_title: String,
    pub document_version: String,
    pub document_type: DocumentType,
    pub ordinal: u64,
    pub content: String,
    pub token_count: u32,
    pub section_hierarchy: Vec<String>,
    pub clause_number: String,
    pub page_numbers: Vec<u32>,
    pub chunk_type: ChunkType,
    pub normative: Normative,
    pub table_group_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

impl Chunk {
    /// Builds a new chunk, computing `content_hash` and the content-addressed
    /// `id` (I5), and validating constraints that don't require a
    /// collection (I3's clause-grammar check, non-empty content, hierarchy
    /// depth).
    pub fn new(fields: ChunkFields) -> Result<Self> {
        let trimmed = fields.content.trim();
        if trimmed.is_empty() {
            return Err(RetrievalError::invalid_input(
                "chunk content must be non-empty after trimming",
            ));
        }
        if fields.section_hierarchy.len() > 6 {
            return Err(RetrievalError::invalid_input(
                "section_hierarchy depth must not exceed 6",
            ));
        }
        validate_clause_number(&fields.clause_number)?;

        let content_hash = hash_content(trimmed);
        let id = derive_id(&fields.document_id, fields.ordinal, &content_hash);

        Ok(Self {
            id,
            content: fields.content,
            content_hash,
            token_count: fields.token_count,
            document_id: fields.document_id,
            document_title: fields.document_title,
            document_version: fields.document_version,
            document_type: fields.document_type,
            section_hierarchy: fields.section_hierarchy,
            clause_number: fields.clause_number,
            page_numbers: fields.page_numbers,
            chunk_type: fields.chunk_type,
            normative: fields.normative,
            table_group_id: fields.table_group_id,
            embedding: None,
            embedding_model: None,
            ingested_at: fields.ingested_at,
        })
    }

    /// Returns a new chunk carrying `embedding`/`embedding_model`. Does not
    /// mutate `self` - chunks are immutable once created.
    #[must_use]
    pub fn with_embedding(&self, embedding: Vec<f32>, embedding_model: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.embedding = Some(embedding);
        copy.embedding_model = Some(embedding_model.into());
        copy
    }

    /// Checks I1 against a target collection: embedding present, model and
    /// dimension match.
    pub fn validate_for_collection(&self, dimension: usize, model_identity: &str) -> Result<()> {
        let embedding = self.embedding.as_ref().ok_or_else(|| {
            RetrievalError::invalid_input(format!("chunk {} has no embedding", self.id))
        })?;
        let model = self.embedding_model.as_deref().ok_or_else(|| {
            RetrievalError::invalid_input(format!("chunk {} has no embedding_model", self.id))
        })?;
        if model != model_identity {
            return Err(RetrievalError::invalid_input(format!(
                "chunk {} embedding_model '{model}' does not match collection model '{model_identity}'",
                self.id
            )));
        }
        if embedding.len() != dimension {
            return Err(RetrievalError::invalid_input(format!(
                "chunk {} embedding has {} dims, collection expects {dimension}",
                self.id,
                embedding.len()
            )));
        }
        Ok(())
    }
}

fn hash_content(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn derive_id(document_id: &str, ordinal: u64, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The vector store's unit of isolation: a fixed-dimension vector space
/// tied to exactly one declared embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub dimension: usize,
    pub embedding_model: String,
    pub distance: Distance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Cosine,
}

impl Default for Distance {
    fn default() -> Self {
        Self::Cosine
    }
}
