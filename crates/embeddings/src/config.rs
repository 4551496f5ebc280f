use crate::error::{EmbeddingError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Overrides `[embedding.local] mode` (`onnx` | `stub`)
pub const EMBEDDING_MODE_ENV: &str = "CORTEX_EMBEDDING_MODE";
/// Overrides `[embedding.local] model_dir`
pub const MODEL_DIR_ENV: &str = "CORTEX_MODEL_DIR";

pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";
pub const DEFAULT_REMOTE_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    #[serde(alias = "openai")]
    Remote,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = EmbeddingError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "openai" => Ok(Self::Remote),
            other => Err(EmbeddingError::configuration(format!(
                "Unsupported provider '{other}' (expected 'local' or 'remote')"
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalMode {
    /// ONNX Runtime inference
    #[default]
    Onnx,
    /// Deterministic hash-seeded vectors, no model files
    Stub,
}

impl LocalMode {
    /// Mode forced through the environment, if any
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(raw) = env::var(EMBEDDING_MODE_ENV) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Some(Self::Onnx)),
            "stub" => Ok(Some(Self::Stub)),
            other => Err(EmbeddingError::configuration(format!(
                "Unsupported {EMBEDDING_MODE_ENV} '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub mode: LocalMode,

    /// Directory holding `<model>/model.onnx` and `<model>/tokenizer.json`
    pub model_dir: PathBuf,

    /// Skip accelerator detection and run on the CPU
    pub force_cpu: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            mode: LocalMode::Onnx,
            model_dir: PathBuf::from("models"),
            force_cpu: false,
        }
    }
}

impl LocalConfig {
    /// Mode after applying the environment override
    pub fn effective_mode(&self) -> Result<LocalMode> {
        Ok(LocalMode::from_env()?.unwrap_or(self.mode))
    }

    /// Model directory after applying the environment override
    pub fn effective_model_dir(&self) -> PathBuf {
        env::var(MODEL_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| self.model_dir.clone(), PathBuf::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// OpenAI-compatible API root; requests go to `{base_url}/embeddings`
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Attempt ceiling per batch, first attempt included
    pub max_attempts: u32,

    /// Per-request timeout
    pub timeout_secs: u64,

    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Requested output dimension (models that support shortening)
    pub dimensions: Option<usize>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_attempts: 4,
            timeout_secs: 30,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            dimensions: None,
        }
    }
}

impl RemoteConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                EmbeddingError::configuration(format!(
                    "Remote embedding provider requires an API key in ${}",
                    self.api_key_env
                ))
            })
    }
}

/// Provider selection and tuning (`[embedding]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: ProviderKind,

    /// Model identifier; defaults depend on the provider
    pub model: Option<String>,

    /// Texts per provider call; defaults depend on the provider
    pub batch_size: Option<usize>,

    /// Batches allowed in flight at once
    pub concurrency: Option<usize>,

    pub local: LocalConfig,
    pub remote: RemoteConfig,
}

impl ProviderConfig {
    pub fn local(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Local,
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn remote(model: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Remote,
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn model_id(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model.as_str(),
            (None, ProviderKind::Local) => DEFAULT_LOCAL_MODEL,
            (None, ProviderKind::Remote) => DEFAULT_REMOTE_MODEL,
        }
    }

    /// Small batches for on-device memory, large ones for network efficiency
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(match self.provider {
            ProviderKind::Local => 32,
            ProviderKind::Remote => 100,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_id().trim().is_empty() {
            return Err(EmbeddingError::configuration("model must not be empty"));
        }
        if self.batch_size() == 0 {
            return Err(EmbeddingError::configuration("batch_size must be at least 1"));
        }
        if self.concurrency() == 0 {
            return Err(EmbeddingError::configuration(
                "concurrency must be at least 1",
            ));
        }
        if self.provider == ProviderKind::Remote {
            let remote = &self.remote;
            if remote.base_url.trim().is_empty() {
                return Err(EmbeddingError::configuration("remote.base_url is empty"));
            }
            if remote.max_attempts == 0 {
                return Err(EmbeddingError::configuration(
                    "remote.max_attempts must be at least 1",
                ));
            }
            if remote.timeout_secs == 0 {
                return Err(EmbeddingError::configuration(
                    "remote.timeout_secs must be at least 1",
                ));
            }
            if remote.dimensions == Some(0) {
                return Err(EmbeddingError::configuration(
                    "remote.dimensions must be positive",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_depend_on_provider() {
        let local = ProviderConfig::default();
        assert_eq!(local.model_id(), DEFAULT_LOCAL_MODEL);
        assert_eq!(local.batch_size(), 32);

        let remote = ProviderConfig {
            provider: ProviderKind::Remote,
            ..ProviderConfig::default()
        };
        assert_eq!(remote.model_id(), DEFAULT_REMOTE_MODEL);
        assert_eq!(remote.batch_size(), 100);
        assert_eq!(remote.concurrency(), 1);
    }

    #[test]
    fn test_validation() {
        let mut config = ProviderConfig::remote("text-embedding-3-small");
        assert!(config.validate().is_ok());

        config.batch_size = Some(0);
        assert!(matches!(
            config.validate(),
            Err(EmbeddingError::Configuration(_))
        ));

        config.batch_size = None;
        config.remote.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::Remote);
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert!("gpu".parse::<ProviderKind>().is_err());

        let parsed: ProviderConfig =
            serde_json::from_str(r#"{"provider": "openai", "batch_size": 8}"#).unwrap();
        assert_eq!(parsed.provider, ProviderKind::Remote);
        assert_eq!(parsed.batch_size(), 8);
        assert_eq!(parsed.remote.max_attempts, 4);
    }
}
