use crate::error::{Result, VectorizerError};
use cortex_code_chunker::{ChunkerConfig, LayerConfig};
use cortex_embeddings::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Upper bound on file size; larger files are skipped without an error
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1_048_576;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

/// File selection (`[walker]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Allowed extensions, with or without the leading dot
    pub extensions: BTreeSet<String>,

    /// Directory names skipped wherever they appear
    pub ignore_dirs: BTreeSet<String>,

    /// File names skipped wherever they appear
    pub ignore_files: BTreeSet<String>,

    pub max_file_bytes: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            extensions: set(&["js", "jsx", "ts", "tsx", "py", "rs"]),
            ignore_dirs: set(&[
                ".git",
                ".hg",
                ".svn",
                ".idea",
                ".vscode",
                ".cache",
                ".expo",
                ".next",
                "node_modules",
                "__pycache__",
                ".venv",
                "build",
                "dist",
                "coverage",
                "target",
                "ios",
                "android",
            ]),
            ignore_files: set(&[
                "package-lock.json",
                "yarn.lock",
                "pnpm-lock.yaml",
                "Cargo.lock",
            ]),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl WalkerConfig {
    /// Whether `name`'s extension is on the allow-list (case-insensitive)
    pub fn allows_extension(&self, name: &str) -> bool {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Everything a run needs, as read from `cortex.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    pub walker: WalkerConfig,
    pub chunking: ChunkerConfig,
    pub embedding: ProviderConfig,
    pub architecture: LayerConfig,
}

impl VectorizerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.walker.extensions.is_empty() {
            return Err(VectorizerError::configuration(
                "walker.extensions must not be empty",
            ));
        }
        if self.walker.max_file_bytes == 0 {
            return Err(VectorizerError::configuration(
                "walker.max_file_bytes must be positive",
            ));
        }
        self.chunking
            .validate()
            .map_err(|msg| VectorizerError::configuration(format!("chunking: {msg}")))?;
        self.architecture
            .validate()
            .map_err(|msg| VectorizerError::configuration(format!("architecture: {msg}")))?;
        self.embedding
            .validate()
            .map_err(|err| VectorizerError::configuration(format!("embedding: {err}")))?;
        Ok(())
    }
}
