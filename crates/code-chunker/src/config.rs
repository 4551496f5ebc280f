use serde::{Deserialize, Serialize};

/// Smallest chunk size accepted by `validate`
pub const MIN_CHUNK_SIZE: usize = 100;

/// Configuration for code chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters (hard limit, overlap included)
    pub max_chunk_size: usize,

    /// Characters copied from the end of the previous piece at a forced split
    pub overlap: usize,

    /// Prefix embedding text with a file/layer/feature header
    pub include_header: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1500,
            overlap: 200,
            include_header: true,
        }
    }
}

impl ChunkerConfig {
    /// Create config with explicit size limits
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            max_chunk_size,
            overlap,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size < MIN_CHUNK_SIZE {
            return Err(format!(
                "max_chunk_size ({}) must be at least {MIN_CHUNK_SIZE}",
                self.max_chunk_size
            ));
        }

        if self.overlap.saturating_mul(2) >= self.max_chunk_size {
            return Err(format!(
                "overlap ({}) must be less than half of max_chunk_size ({})",
                self.overlap, self.max_chunk_size
            ));
        }

        Ok(())
    }

    /// Characters available for new text in a piece that carries overlap
    pub(crate) fn body_budget(&self) -> usize {
        self.max_chunk_size - self.overlap
    }
}
