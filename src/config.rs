//! Typed configuration surface.
//!
//! Resolution precedence (highest wins), mirroring the layering used across
//! the example pool's config loaders:
//!
//! 1. Environment variables (`SPECSMITH_*`, via [`Config::apply_env_overlay`])
//! 2. Project config file (`specsmith.toml` in the current directory)
//! 3. Compiled-in defaults ([`Config::default`])
//!
//! CLI flags are layered on top of all of this by the binaries in `src/bin/`,
//! which is why they aren't represented here.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RetrievalError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Loads defaults, then overlays a TOML project config file if present,
    /// then overlays recognized environment variables.
    pub fn load(project_file: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        let path = project_file.as_ref();
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| RetrievalError::config(format!("reading {}", path.display())).with_source(err))?;
            config = toml::from_str(&raw)
                .map_err(|err| RetrievalError::config("parsing project config").with_source(err))?;
        }
        config.apply_env_overlay();
        Ok(config)
    }

    /// Applies `SPECSMITH_*` environment variables on top of whatever was
    /// loaded from file or defaults. Missing variables leave the existing
    /// value untouched. Loads a `.env` file first, if present, so local
    /// development doesn't need variables exported into the shell.
    pub fn apply_env_overlay(&mut self) {
        dotenvy::dotenv().ok();

        if let Ok(model) = std::env::var("SPECSMITH_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(dim) = std::env::var("SPECSMITH_EMBEDDING_DIMENSION") {
            if let Ok(dim) = dim.parse() {
                self.embedding.dimension = dim;
            }
        }
        if let Ok(backend) = std::env::var("SPECSMITH_VECTOR_STORE_BACKEND") {
            self.vector_store.backend = backend;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.vector_store.primary.endpoint = Some(url);
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            self.vector_store.primary.api_key = Some(key);
        }
        if let Ok(path) = std::env::var("SPECSMITH_SQLITE_PATH") {
            self.vector_store.fallback.path = path;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// Base URL for the remote embedding endpoint; unused by the local
    /// (in-process) provider.
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "local/bge-small-en-v1.5@1".into(),
            dimension: 384,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// `"primary"` or `"fallback"` to force a backend; empty string means
    /// "let the factory decide" (spec §4.3).
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub primary: PrimaryStoreConfig,
    #[serde(default)]
    pub fallback: FallbackStoreConfig,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: String::new(),
            primary: PrimaryStoreConfig::default(),
            fallback: FallbackStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrimaryStoreConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "PrimaryStoreConfig::default_collection")]
    pub collection: String,
}

impl PrimaryStoreConfig {
    fn default_collection() -> String {
        "specsmith".into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStoreConfig {
    #[serde(default = "FallbackStoreConfig::default_path")]
    pub path: String,
    #[serde(default = "PrimaryStoreConfig::default_collection")]
    pub collection: String,
}

impl Default for FallbackStoreConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            collection: PrimaryStoreConfig::default_collection(),
        }
    }
}

impl FallbackStoreConfig {
    fn default_path() -> String {
        "./specsmith.sqlite3".into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "ChunkingConfig::default_target_tokens")]
    pub target_tokens: u32,
    #[serde(default = "ChunkingConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "ChunkingConfig::default_min_tokens")]
    pub min_tokens: u32,
    #[serde(default = "ChunkingConfig::default_overlap_tokens")]
    pub overlap_tokens: u32,
    #[serde(default = "ChunkingConfig::default_overlap_separator")]
    pub overlap_separator: String,
    #[serde(default = "ChunkingConfig::default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: Self::default_target_tokens(),
            max_tokens: Self::default_max_tokens(),
            min_tokens: Self::default_min_tokens(),
            overlap_tokens: Self::default_overlap_tokens(),
            overlap_separator: Self::default_overlap_separator(),
            tokenizer: Self::default_tokenizer(),
        }
    }
}

impl ChunkingConfig {
    fn default_target_tokens() -> u32 {
        500
    }
    fn default_max_tokens() -> u32 {
        1000
    }
    fn default_min_tokens() -> u32 {
        100
    }
    fn default_overlap_tokens() -> u32 {
        100
    }
    fn default_overlap_separator() -> String {
        "---".into()
    }
    fn default_tokenizer() -> String {
        "cl100k_base".into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestionConfig {
    #[serde(default)]
    pub ocr_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default = "SearchConfig::default_rerank_overfetch")]
    pub rerank_overfetch: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rerank: RerankConfig::default(),
            hybrid: HybridConfig::default(),
            rerank_overfetch: Self::default_rerank_overfetch(),
        }
    }
}

impl SearchConfig {
    fn default_rerank_overfetch() -> usize {
        3
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "HybridConfig::default_weight")]
    pub weight: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weight: Self::default_weight(),
        }
    }
}

impl HybridConfig {
    fn default_weight() -> f32 {
        0.5
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "HealthConfig::default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ms: Self::default_latency_threshold_ms(),
        }
    }
}

impl HealthConfig {
    fn default_latency_threshold_ms() -> u64 {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.chunking.target_tokens, 500);
        assert_eq!(config.chunking.max_tokens, 1000);
        assert_eq!(config.chunking.min_tokens, 100);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert_eq!(config.chunking.overlap_separator, "---");
    }

    #[test]
    fn missing_project_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/specsmith.toml").unwrap();
        assert_eq!(config.embedding.dimension, 384);
    }
}
