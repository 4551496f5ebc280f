use crate::config::{LocalMode, ProviderConfig};
use crate::error::{EmbeddingError, Result};
use crate::onnx::{Device, ModelAssets, OnnxBackend};
use crate::provider::EmbeddingProvider;
use crate::stub::stub_embed;
use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// On-device model known to the local provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub dimension: usize,
    /// Token limit applied by the tokenizer
    pub max_length: usize,
    /// Texts per inference call
    pub max_batch: usize,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "all-minilm-l6-v2",
        aliases: &["minilm", "all-minilm"],
        dimension: 384,
        max_length: 256,
        max_batch: 32,
    },
    ModelSpec {
        id: "all-mpnet-base-v2",
        aliases: &["mpnet"],
        dimension: 768,
        max_length: 384,
        max_batch: 16,
    },
    ModelSpec {
        id: "paraphrase-multilingual-minilm-l12-v2",
        aliases: &["multilingual"],
        dimension: 384,
        max_length: 128,
        max_batch: 32,
    },
    ModelSpec {
        id: "bge-small",
        aliases: &["bge-small-en", "bge-small-en-v1.5"],
        dimension: 384,
        max_length: 512,
        max_batch: 32,
    },
];

const MODEL_PREFIXES: &[&str] = &["local:", "sentence-transformers/", "baai/"];

impl ModelSpec {
    /// Look up a model by id or alias, ignoring case and hub prefixes
    pub fn find(raw: &str) -> Option<&'static Self> {
        let mut name = raw.trim().to_ascii_lowercase();
        for prefix in MODEL_PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix) {
                name = rest.to_string();
            }
        }
        MODELS
            .iter()
            .find(|spec| spec.id == name || spec.aliases.contains(&name.as_str()))
    }

    fn resolve(raw: &str) -> Result<&'static Self> {
        Self::find(raw).ok_or_else(|| {
            let known: Vec<&str> = MODELS.iter().map(|spec| spec.id).collect();
            EmbeddingError::configuration(format!(
                "Unknown local embedding model '{raw}' (known: {})",
                known.join(", ")
            ))
        })
    }
}

enum Backend {
    Onnx(OnnxBackend),
    Stub { dimension: usize },
}

impl Backend {
    fn load(spec: &ModelSpec, key: &HandleKey) -> Result<Self> {
        match key.mode {
            LocalMode::Stub => {
                log::debug!("Using stub embeddings for '{}'", spec.id);
                Ok(Self::Stub {
                    dimension: spec.dimension,
                })
            }
            LocalMode::Onnx => Ok(Self::Onnx(OnnxBackend::new(
                spec,
                &key.model_dir,
                key.force_cpu,
            )?)),
        }
    }

    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Onnx(backend) => backend.embed_batch_blocking(texts),
            Self::Stub { dimension } => Ok(texts
                .iter()
                .map(|text| stub_embed(text, *dimension))
                .collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    model: &'static str,
    mode: LocalMode,
    force_cpu: bool,
    model_dir: PathBuf,
}

type Handle = Arc<OnceCell<Arc<Backend>>>;

/// Loaded models, one per distinct key, alive until process exit
static HANDLES: Lazy<Mutex<HashMap<HandleKey, Handle>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn shared_handle(key: &HandleKey) -> Handle {
    let mut handles = HANDLES.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(handles.entry(key.clone()).or_default())
}

/// Embeds on this machine with a model loaded once per process
pub struct LocalProvider {
    spec: &'static ModelSpec,
    key: HandleKey,
    batch_size: usize,
    handle: Handle,
}

impl LocalProvider {
    /// Resolve the model and check its files; loading waits for the first call
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let spec = ModelSpec::resolve(config.model_id())?;
        let mode = config.local.effective_mode()?;
        let key = HandleKey {
            model: spec.id,
            mode,
            force_cpu: config.local.force_cpu,
            model_dir: match mode {
                LocalMode::Onnx => config.local.effective_model_dir(),
                LocalMode::Stub => PathBuf::new(),
            },
        };
        if mode == LocalMode::Onnx {
            ModelAssets::locate(spec, &key.model_dir).check(spec.id)?;
        }

        let handle = shared_handle(&key);
        Ok(Self {
            spec,
            key,
            batch_size: config.batch_size(),
            handle,
        })
    }

    pub const fn spec(&self) -> &'static ModelSpec {
        self.spec
    }

    pub const fn mode(&self) -> LocalMode {
        self.key.mode
    }

    /// Load the model now instead of on the first `embed`
    pub async fn warm_up(&self) -> Result<()> {
        self.backend().await.map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Whether both providers resolve to the same loaded model
    pub fn shares_handle_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    /// Device the ONNX session runs on, once loaded
    pub fn device(&self) -> Option<Device> {
        match self.handle.get()?.as_ref() {
            Backend::Onnx(backend) => Some(backend.device()),
            Backend::Stub { .. } => None,
        }
    }

    async fn backend(&self) -> Result<Arc<Backend>> {
        if let Some(backend) = self.handle.get() {
            return Ok(Arc::clone(backend));
        }

        let handle = Arc::clone(&self.handle);
        let spec = self.spec;
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || {
            handle
                .get_or_try_init(|| Backend::load(spec, &key).map(Arc::new))
                .map(Arc::clone)
        })
        .await
        .map_err(|e| EmbeddingError::Model(format!("Model load task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn id(&self) -> String {
        match self.key.mode {
            LocalMode::Onnx => format!("local:{}", self.spec.id),
            LocalMode::Stub => format!("local-stub:{}", self.spec.id),
        }
    }

    fn model(&self) -> &str {
        self.spec.id
    }

    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let backend = self.backend().await?;
        let vectors = if matches!(backend.as_ref(), Backend::Stub { .. }) {
            backend.embed_blocking(texts)?
        } else {
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || backend.embed_blocking(&texts))
                .await
                .map_err(|e| EmbeddingError::Model(format!("Inference task failed: {e}")))??
        };

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Model(format!(
                "Model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_model_lookup_accepts_aliases_and_prefixes() {
        let find = |raw| ModelSpec::find(raw).map(|spec| spec.id);
        assert_eq!(find("all-MiniLM-L6-v2"), Some("all-minilm-l6-v2"));
        assert_eq!(
            find("sentence-transformers/all-mpnet-base-v2"),
            Some("all-mpnet-base-v2")
        );
        assert_eq!(find("BAAI/bge-small-en-v1.5"), Some("bge-small"));
        assert_eq!(find("local:multilingual"), Some("paraphrase-multilingual-minilm-l12-v2"));
        assert_eq!(find("gpt-2"), None);
    }

    #[test]
    fn test_missing_model_files_fail_before_loading() {
        let mut config = ProviderConfig::local("all-minilm-l6-v2");
        config.local.model_dir = PathBuf::from("/nonexistent/cortex-models");
        if LocalMode::from_env().ok().flatten() == Some(LocalMode::Stub) {
            return;
        }
        let err = LocalProvider::new(&config).err().unwrap();
        assert!(matches!(err, EmbeddingError::Configuration(_)));
        assert!(err.to_string().contains("model.onnx"));
    }
}
