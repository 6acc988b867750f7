//! Primary vector store backend: Qdrant, reached over its gRPC client.
//! Keyword search and hybrid fusion are implemented on top of a local
//! `bm25` index built from whatever has been upserted, since Qdrant's
//! sparse-vector support is not part of this backend's surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bm25::{Embedder as Bm25Embedder, EmbedderBuilder, Language, ScoredDocument, Scorer};
use chrono::Utc;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance as QdrantDistance, Filter as QdrantFilter,
    PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::RwLock;

use super::{reciprocal_rank_fusion, Filter, HealthState, HealthStatus, Hit, VectorStoreBackend};
use crate::chunk::{Chunk, ChunkFields, ChunkType, Collection, Distance, DocumentType, Normative};
use crate::error::{ErrorKind, Result, RetrievalError};

/// A second-pass keyword index kept in memory, rebuilt lazily from
/// whatever chunks have been upserted through this process. Acceptable
/// because the primary path is semantic search; keyword/hybrid search on
/// Qdrant is a secondary capability (§4.3).
/// Rescales raw cosine similarity (`[-1, 1]`) into the `[0, 1]` relevance
/// range the result record promises (P6). Order-preserving, so RRF (P7)
/// ranks identically either way.
fn normalize_cosine(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Squashes an unbounded BM25 score into `(0, 1)` with a logistic curve.
/// Monotonic, so keyword-search rank order is unaffected.
fn normalize_bm25(score: f32) -> f32 {
    1.0 / (1.0 + (-score).exp())
}

struct KeywordIndex {
    scorer: Scorer<String>,
    embedder: Bm25Embedder,
    chunks: HashMap<String, Chunk>,
}

impl KeywordIndex {
    fn new() -> Self {
        Self {
            scorer: Scorer::new(),
            embedder: EmbedderBuilder::with_avgdl(256.0).language_mode(Language::English).build(),
            chunks: HashMap::new(),
        }
    }

    fn upsert(&mut self, chunk: &Chunk) {
        let embedding = self.embedder.embed(&chunk.content);
        self.scorer.upsert(&chunk.id, embedding);
        self.chunks.insert(chunk.id.clone(), chunk.clone());
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let ids: Vec<String> = self
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            self.scorer.remove(id);
            self.chunks.remove(id);
        }
        ids.len()
    }

    fn search(&self, text: &str, limit: usize, filter: &Filter) -> Vec<Hit> {
        let query_embedding = self.embedder.embed(text);
        let scored: Vec<ScoredDocument<String>> = self.scorer.matches(&query_embedding);
        let mut hits: Vec<Hit> = scored
            .into_iter()
            .filter_map(|doc| self.chunks.get(&doc.id).cloned().map(|chunk| (chunk, doc.score)))
            .filter(|(chunk, _)| filter.matches(chunk))
            .map(|(chunk, score)| Hit { chunk, score: normalize_bm25(score) })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

pub struct QdrantVectorStore {
    client: Qdrant,
    keyword: Arc<RwLock<KeywordIndex>>,
    /// `(dimension, embedding_model)` per collection, as declared by the
    /// most recent `ensure_collection` call. Qdrant's own collection
    /// metadata carries a vector dimension but no notion of "embedding
    /// model identity", so this crate tracks the latter itself to enforce
    /// P5 on `upsert`.
    collections: Arc<RwLock<HashMap<String, (usize, String)>>>,
}

impl QdrantVectorStore {
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|err| RetrievalError::config("building Qdrant client").with_source(err))?;
        Ok(Self {
            client,
            keyword: Arc::new(RwLock::new(KeywordIndex::new())),
            collections: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

#[async_trait]
impl VectorStoreBackend for QdrantVectorStore {
    async fn ensure_collection(&self, name: &str, dimension: usize, embedding_model: &str) -> Result<Collection> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(classify_qdrant_error)?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(dimension as u64, QdrantDistance::Cosine)),
                )
                .await
                .map_err(classify_qdrant_error)?;
            self.collections.write().await.insert(name.to_string(), (dimension, embedding_model.to_string()));
            return Ok(Collection {
                name: name.to_string(),
                dimension,
                embedding_model: embedding_model.to_string(),
                distance: Distance::Cosine,
                created_at: Utc::now(),
            });
        }

        let info = self.client.collection_info(name).await.map_err(classify_qdrant_error)?;
        let existing_dimension = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size as usize),
                _ => None,
            });
        if let Some(existing) = existing_dimension {
            if existing != dimension {
                return Err(RetrievalError::invalid_input(format!(
                    "collection '{name}' has dimension {existing}, requested {dimension}"
                )));
            }
        }
        self.collections.write().await.insert(name.to_string(), (dimension, embedding_model.to_string()));
        Ok(Collection {
            name: name.to_string(),
            dimension,
            embedding_model: embedding_model.to_string(),
            distance: Distance::Cosine,
            created_at: Utc::now(),
        })
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let known = self.collections.read().await;
        let (dimension, embedding_model) = known
            .get(collection)
            .cloned()
            .ok_or_else(|| RetrievalError::invalid_input(format!("collection '{collection}' does not exist")))?;
        drop(known);

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            // P5: never persist a chunk whose declared embedding model
            // disagrees with the collection's.
            chunk.validate_for_collection(dimension, &embedding_model)?;
            let vector = chunk
                .embedding
                .as_ref()
                .ok_or_else(|| RetrievalError::invalid_input(format!("chunk {} has no embedding", chunk.id)))?;
            let payload = chunk_to_payload(chunk);
            points.push(PointStruct::new(point_id(&chunk.id), vector.clone(), payload));
        }
        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(classify_qdrant_error)?;

        let mut index = self.keyword.write().await;
        for chunk in chunks {
            index.upsert(chunk);
        }
        Ok(count)
    }

    async fn search(&self, collection: &str, query_vector: &[f32], limit: usize, filter: &Filter) -> Result<Vec<Hit>> {
        let mut request = SearchPointsBuilder::new(collection, query_vector.to_vec(), limit as u64)
            .with_payload(true)
            .with_vectors(false);
        if let Some(native) = filter_to_qdrant(filter) {
            request = request.filter(native);
        }
        let response = self.client.search_points(request).await.map_err(classify_qdrant_error)?;
        response
            .result
            .into_iter()
            .map(|scored| {
                let chunk = payload_to_chunk(scored.payload)?;
                Ok(Hit { chunk, score: normalize_cosine(scored.score) })
            })
            .collect()
    }

    async fn keyword_search(&self, _collection: &str, text: &str, limit: usize, filter: &Filter) -> Result<Vec<Hit>> {
        Ok(self.keyword.read().await.search(text, limit, filter))
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query_vector: &[f32],
        text: &str,
        limit: usize,
        filter: &Filter,
        weight: f32,
    ) -> Result<Vec<Hit>> {
        if weight >= 1.0 {
            return self.search(collection, query_vector, limit, filter).await;
        }
        if weight <= 0.0 {
            return self.keyword_search(collection, text, limit, filter).await;
        }
        let overfetch = limit.saturating_mul(3).max(limit);
        let semantic = self.search(collection, query_vector, overfetch, filter).await?;
        let keyword = self.keyword_search(collection, text, overfetch, filter).await?;
        Ok(reciprocal_rank_fusion(&semantic, &keyword, weight, limit))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let mut request = ScrollPointsBuilder::new(collection).limit(10_000).with_payload(true);
        if let Some(native) = filter_to_qdrant(filter) {
            request = request.filter(native);
        }
        let response = self.client.scroll(request).await.map_err(classify_qdrant_error)?;
        Ok(response.result.len())
    }

    async fn all_chunks(&self, collection: &str, filter: &Filter) -> Result<Vec<Chunk>> {
        let mut request = ScrollPointsBuilder::new(collection).limit(10_000).with_payload(true);
        if let Some(native) = filter_to_qdrant(filter) {
            request = request.filter(native);
        }
        let response = self.client.scroll(request).await.map_err(classify_qdrant_error)?;
        response.result.into_iter().map(|point| payload_to_chunk(point.payload)).collect()
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let native_filter = QdrantFilter::must([Condition::matches("document_id", document_id.to_string())]);
        let scroll = self
            .client
            .scroll(ScrollPointsBuilder::new(collection).filter(native_filter.clone()).limit(10_000))
            .await
            .map_err(classify_qdrant_error)?;
        let ids: Vec<PointId> = scroll.result.iter().filter_map(|p| p.id.clone()).collect();
        let count = ids.len();
        if !ids.is_empty() {
            self.client
                .delete_points(DeletePointsBuilder::new(collection).points(ids))
                .await
                .map_err(classify_qdrant_error)?;
        }
        self.keyword.write().await.remove_document(document_id);
        Ok(count)
    }

    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        match self.client.health_check().await {
            Ok(_) => HealthStatus {
                backend: "qdrant",
                state: HealthState::Healthy,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                detail: None,
                error_code: None,
            },
            Err(err) => {
                let classified = classify_qdrant_error(err);
                HealthStatus {
                    backend: "qdrant",
                    state: HealthState::Unavailable,
                    latency_ms: None,
                    error_code: Some(classified.kind.as_code()),
                    detail: classified.message,
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

fn point_id(id: &str) -> PointId {
    PointId::from(id.to_string())
}

fn classify_qdrant_error(err: qdrant_client::QdrantError) -> RetrievalError {
    let text = err.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("unauthenticated") || lowered.contains("permission") {
        RetrievalError::auth(text)
    } else if lowered.contains("not found") {
        RetrievalError::new(ErrorKind::NotFound).with_message(text)
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        RetrievalError::timeout(text)
    } else {
        RetrievalError::connection(text)
    }
}

fn filter_to_qdrant(filter: &Filter) -> Option<QdrantFilter> {
    if filter.is_empty() {
        return None;
    }
    let mut conditions = Vec::new();
    if let Some(m) = &filter.document_id {
        push_string_condition(&mut conditions, "document_id", m);
    }
    if let Some(m) = &filter.document_type {
        push_enum_condition(&mut conditions, "document_type", m, document_type_tag);
    }
    if let Some(m) = &filter.chunk_type {
        push_enum_condition(&mut conditions, "chunk_type", m, chunk_type_tag);
    }
    if let Some(m) = &filter.normative {
        push_enum_condition(&mut conditions, "normative", m, normative_tag);
    }
    if let Some(prefix) = &filter.clause_number_prefix {
        conditions.push(Condition::matches_text("clause_number", prefix.clone()));
    }
    Some(QdrantFilter::must(conditions))
}

fn push_string_condition(conditions: &mut Vec<Condition>, field: &str, m: &super::filter::FieldMatch<String>) {
    match m {
        super::filter::FieldMatch::Eq(v) => conditions.push(Condition::matches(field, v.clone())),
        super::filter::FieldMatch::In(values) => {
            conditions.push(Condition::matches(field, values.clone()));
        }
    }
}

fn push_enum_condition<T: Copy>(
    conditions: &mut Vec<Condition>,
    field: &str,
    m: &super::filter::FieldMatch<T>,
    tag: fn(T) -> &'static str,
) {
    match m {
        super::filter::FieldMatch::Eq(v) => conditions.push(Condition::matches(field, tag(*v).to_string())),
        super::filter::FieldMatch::In(values) => {
            let tags: Vec<String> = values.iter().map(|v| tag(*v).to_string()).collect();
            conditions.push(Condition::matches(field, tags));
        }
    }
}

fn document_type_tag(value: DocumentType) -> &'static str {
    match value {
        DocumentType::Standard => "standard",
        DocumentType::Handbook => "handbook",
        DocumentType::Specification => "specification",
        DocumentType::Other => "other",
    }
}

fn chunk_type_tag(value: ChunkType) -> &'static str {
    match value {
        ChunkType::Prose => "prose",
        ChunkType::Table => "table",
        ChunkType::List => "list",
        ChunkType::Code => "code",
        ChunkType::FigureCaption => "figure_caption",
        ChunkType::Definition => "definition",
    }
}

fn normative_tag(value: Normative) -> &'static str {
    match value {
        Normative::Normative => "normative",
        Normative::Informative => "informative",
        Normative::Unknown => "unknown",
    }
}

fn chunk_to_payload(chunk: &Chunk) -> Payload {
    let json = serde_json::to_value(chunk).expect("Chunk serializes to JSON");
    let mut map = Map::new();
    if let JsonValue::Object(obj) = json {
        map = obj;
    }
    map.remove("embedding");
    let mut payload_map = HashMap::new();
    for (key, value) in map {
        payload_map.insert(key, json_to_qdrant_value(value));
    }
    Payload::from(payload_map)
}

fn payload_to_chunk(payload: HashMap<String, QdrantValue>) -> Result<Chunk> {
    let mut map = Map::new();
    for (key, value) in payload {
        map.insert(key, qdrant_value_to_json(value));
    }
    let document_id = field_str(&map, "document_id")?;
    let document_title = field_str(&map, "document_title")?;
    let document_version = field_str(&map, "document_version")?;
    let document_type = serde_json::from_value(map.get("document_type").cloned().unwrap_or(JsonValue::Null))
        .map_err(|_| RetrievalError::internal("payload missing document_type"))?;
    let content = field_str(&map, "content")?;
    let token_count = map.get("token_count").and_then(JsonValue::as_u64).unwrap_or(0) as u32;
    let section_hierarchy: Vec<String> = map
        .get("section_hierarchy")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let clause_number = field_str(&map, "clause_number").unwrap_or_default();
    let page_numbers: Vec<u32> = map
        .get("page_numbers")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let chunk_type = serde_json::from_value(map.get("chunk_type").cloned().unwrap_or(JsonValue::Null))
        .map_err(|_| RetrievalError::internal("payload missing chunk_type"))?;
    let normative = serde_json::from_value(map.get("normative").cloned().unwrap_or(JsonValue::Null))
        .map_err(|_| RetrievalError::internal("payload missing normative"))?;
    let table_group_id = map.get("table_group_id").and_then(|v| v.as_str()).map(str::to_string);
    let ordinal = map
        .get("ordinal")
        .and_then(JsonValue::as_u64)
        .unwrap_or(0);
    let ingested_at = map
        .get("ingested_at")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(Utc::now);

    Chunk::new(ChunkFields {
        document_id,
        document_title,
        document_version,
        document_type,
        ordinal,
        content,
        token_count,
        section_hierarchy,
        clause_number,
        page_numbers,
        chunk_type,
        normative,
        table_group_id,
        ingested_at,
    })
}

fn field_str(map: &Map<String, JsonValue>, key: &str) -> Result<String> {
    map.get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| RetrievalError::internal(format!("payload missing field '{key}'")))
}

fn json_to_qdrant_value(value: JsonValue) -> QdrantValue {
    match value {
        JsonValue::Null => QdrantValue::from(Option::<bool>::None),
        JsonValue::Bool(b) => QdrantValue::from(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                QdrantValue::from(i)
            } else {
                QdrantValue::from(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => QdrantValue::from(s),
        JsonValue::Array(arr) => QdrantValue::from(arr.into_iter().map(json_to_qdrant_value).collect::<Vec<_>>()),
        JsonValue::Object(obj) => {
            let mut map = HashMap::new();
            for (k, v) in obj {
                map.insert(k, json_to_qdrant_value(v));
            }
            QdrantValue::from(map)
        }
    }
}

fn qdrant_value_to_json(value: QdrantValue) -> JsonValue {
    use qdrant_client::qdrant::value::Kind;
    match value.kind {
        Some(Kind::NullValue(_)) | None => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => JsonValue::Array(list.values.into_iter().map(qdrant_value_to_json).collect()),
        Some(Kind::StructValue(s)) => {
            let mut map = Map::new();
            for (k, v) in s.fields {
                map.insert(k, qdrant_value_to_json(v));
            }
            JsonValue::Object(map)
        }
    }
}
