use serde::{Deserialize, Serialize};
use std::path::Path;

/// Source language, as far as the structural scanner cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Python,
    Rust,
    Other,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "jsx" => Language::Jsx,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "py" | "pyw" => Language::Python,
            "rs" => Language::Rust,
            _ => Language::Other,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Other)
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Jsx => "jsx",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Other => "other",
        }
    }

    /// JavaScript and TypeScript dialects share one declaration grammar
    pub fn is_ecmascript(self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::Jsx | Language::TypeScript | Language::Tsx
        )
    }

    /// Whether the file may contain JSX markup
    pub fn allows_jsx(self) -> bool {
        matches!(self, Language::Jsx | Language::Tsx | Language::JavaScript)
    }

    /// Block structure is delimited by indentation rather than braces
    pub fn is_indent_scoped(self) -> bool {
        matches!(self, Language::Python)
    }

    /// `#` starts a line comment
    pub(crate) fn hash_comments(self) -> bool {
        matches!(self, Language::Python)
    }

    /// Single quotes delimit strings (not lifetimes or char literals)
    pub(crate) fn single_quote_strings(self) -> bool {
        !matches!(self, Language::Rust)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
