use serde::{Deserialize, Serialize};

use crate::error::{Result, SluiceError};
use crate::term::Term;

/// Ingestion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Highest n-gram order generated for each stream
    pub max_gram_size: usize,
    /// Shard definitions, ordered by ascending `min_postings`
    pub shards: Vec<ShardConfig>,
    /// Number of recently ingested documents kept for diagnostics
    pub document_cache_capacity: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_gram_size: 1,
            shards: vec![ShardConfig::default()],
            document_cache_capacity: 1024,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Set the highest n-gram order
    pub fn with_max_gram_size(mut self, max_gram_size: usize) -> Self {
        self.max_gram_size = max_gram_size;
        self
    }

    /// Replace the shard definitions
    pub fn with_shards(mut self, shards: Vec<ShardConfig>) -> Self {
        self.shards = shards;
        self
    }

    /// Set the document cache capacity (0 disables the cache)
    pub fn with_document_cache_capacity(mut self, capacity: usize) -> Self {
        self.document_cache_capacity = capacity;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Check the configuration for values the ingestor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_gram_size == 0 || self.max_gram_size > Term::MAX_GRAM_SIZE {
            return Err(SluiceError::InvalidConfig(format!(
                "max_gram_size must be in 1..={}, got {}",
                Term::MAX_GRAM_SIZE,
                self.max_gram_size
            )));
        }
        if self.shards.is_empty() {
            return Err(SluiceError::InvalidConfig(
                "at least one shard is required".to_string(),
            ));
        }
        if self.shards.len() > u16::MAX as usize {
            return Err(SluiceError::InvalidConfig(format!(
                "too many shards: {}",
                self.shards.len()
            )));
        }
        if self.shards[0].min_postings != 0 {
            return Err(SluiceError::InvalidConfig(
                "the first shard must accept documents with 0 postings".to_string(),
            ));
        }
        for pair in self.shards.windows(2) {
            if pair[1].min_postings <= pair[0].min_postings {
                return Err(SluiceError::InvalidConfig(
                    "shard min_postings must be strictly increasing".to_string(),
                ));
            }
        }
        for shard in &self.shards {
            if shard.slice_capacity == 0 || shard.max_slices == 0 {
                return Err(SluiceError::InvalidConfig(
                    "slice_capacity and max_slices must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Shard configuration
///
/// A shard accepts documents whose posting count is at least
/// `min_postings` and below the next shard's `min_postings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub min_postings: usize,
    /// Rows per slice
    pub slice_capacity: usize,
    /// Upper bound on slices this shard may allocate
    pub max_slices: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            min_postings: 0,
            slice_capacity: 4096,
            max_slices: 1024,
        }
    }
}

impl ShardConfig {
    pub fn new(min_postings: usize, slice_capacity: usize, max_slices: usize) -> Self {
        Self {
            min_postings,
            slice_capacity,
            max_slices,
        }
    }

    /// Maximum number of documents the shard can hold at once
    pub fn row_capacity(&self) -> usize {
        self.slice_capacity.saturating_mul(self.max_slices)
    }
}

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub remove_stopwords: bool,
    pub stem: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: false,
            stem: false,
            min_token_length: 1,
            max_token_length: 64,
        }
    }
}
