//! Chunker parameters (spec §4.5 parameter table).

#[derive(Debug, Clone)]
pub struct ChunkerParams {
    pub target_tokens: u32,
    pub max_tokens: u32,
    pub min_tokens: u32,
    pub overlap_tokens: u32,
    pub overlap_separator: String,
}

impl Default for ChunkerParams {
    fn default() -> Self {
        Self {
            target_tokens: 500,
            max_tokens: 1000,
            min_tokens: 100,
            overlap_tokens: 100,
            overlap_separator: "---".into(),
        }
    }
}

impl From<&crate::config::ChunkingConfig> for ChunkerParams {
    fn from(config: &crate::config::ChunkingConfig) -> Self {
        Self {
            target_tokens: config.target_tokens,
            max_tokens: config.max_tokens,
            min_tokens: config.min_tokens,
            overlap_tokens: config.overlap_tokens,
            overlap_separator: config.overlap_separator.clone(),
        }
    }
}
