use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{EmbeddingError, Result};
use crate::local::LocalProvider;
use crate::remote::RemoteProvider;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome for one input text of a batch
pub type ItemResult = std::result::Result<Vec<f32>, EmbeddingError>;

/// Turns ordered batches of text into vectors of a fixed dimension
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identity recorded with every vector, e.g. `local:all-minilm-l6-v2`
    fn id(&self) -> String;

    fn model(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Largest batch a single `embed` call should receive
    fn batch_size(&self) -> usize;

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Like `embed`, but reports per-item failures when the backend can tell them apart.
    ///
    /// `Err` still means the whole batch failed.
    async fn embed_items(&self, texts: &[String]) -> Result<Vec<ItemResult>> {
        Ok(self.embed(texts).await?.into_iter().map(Ok).collect())
    }

    /// Network attempts made so far (zero for providers without a network)
    fn attempts(&self) -> u64 {
        0
    }
}

/// Build the provider selected by configuration.
///
/// Fails with `Configuration` for an unknown model, a missing credential or missing model
/// files; nothing is loaded or sent yet.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Local => Arc::new(LocalProvider::new(config)?),
        ProviderKind::Remote => Arc::new(RemoteProvider::new(config)?),
    };
    log::info!(
        "Embedding provider {} (dim {}, batch {})",
        provider.id(),
        provider.dimension(),
        provider.batch_size()
    );
    Ok(provider)
}

/// Cosine similarity of two vectors, 0.0 when undefined
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalMode;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_unknown_local_model_is_configuration_error() {
        let mut config = ProviderConfig::local("no-such-model");
        config.local.mode = LocalMode::Stub;
        assert!(matches!(
            build_provider(&config),
            Err(EmbeddingError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let mut config = ProviderConfig::remote("text-embedding-3-small");
        config.remote.api_key_env = "CORTEX_TEST_UNSET_KEY_9F2C".to_string();
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, EmbeddingError::Configuration(_)));
        assert!(err.to_string().contains("CORTEX_TEST_UNSET_KEY_9F2C"));
    }
}
