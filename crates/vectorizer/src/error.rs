use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorizerError>;

/// Failures that stop a run before any file is processed
#[derive(Error, Debug)]
pub enum VectorizerError {
    #[error("Source path not found or not a directory: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding provider error: {0}")]
    Embedding(#[from] cortex_embeddings::EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VectorizerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
