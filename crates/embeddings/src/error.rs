use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Invalid or incomplete provider setup, raised before any work starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Request failed: {0}")]
    Fatal(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<EmbeddingError>,
    },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// Local model failed to load or run
    #[error("Model error: {0}")]
    Model(String),
}

impl EmbeddingError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Rate limits and transient failures are worth another attempt
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub(crate) const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(EmbeddingError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}
