use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of a detected structural unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    /// UI component (function returning markup or a component class)
    Component,
    /// Plain function or arrow function
    Function,
    /// Custom hook (`useSomething`)
    Hook,
    /// Class, struct, trait or similar type-level block
    Class,
    /// Any other declaration the scanner keeps intact (interfaces, stylesheets)
    Other,
}

impl UnitKind {
    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Function => "function",
            Self::Hook => "hook",
            Self::Class => "class",
            Self::Other => "other",
        }
    }
}

/// Lexical pattern detected in a unit or file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternTag {
    /// State container usage (useState, reducers, stores)
    State,
    /// Context provider/consumer usage
    Context,
    /// Navigation primitives
    Navigation,
    /// Stylesheet definitions
    Stylesheet,
    /// Network call primitives
    Network,
    /// Built-in hook usage
    Hooks,
    /// Test-suite primitives
    Test,
}

impl PatternTag {
    pub const ALL: [PatternTag; 7] = [
        Self::State,
        Self::Context,
        Self::Navigation,
        Self::Stylesheet,
        Self::Network,
        Self::Hooks,
        Self::Test,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Context => "context",
            Self::Navigation => "navigation",
            Self::Stylesheet => "stylesheet",
            Self::Network => "network",
            Self::Hooks => "hooks",
            Self::Test => "test",
        }
    }
}

/// Ordered set of pattern tags
pub type PatternSet = BTreeSet<PatternTag>;

/// Complexity bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityTier {
    #[default]
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Weighted complexity score and its bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    pub score: f32,
    pub tier: ComplexityTier,
}

/// Target platform inferred from file name and content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Ios,
    Android,
    MultiPlatform,
    #[default]
    Universal,
}

impl Platform {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::MultiPlatform => "multi-platform",
            Self::Universal => "universal",
        }
    }
}

/// Architectural layer assigned to a chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Presentation,
    BusinessLogic,
    DataAccess,
    Infrastructure,
    #[default]
    Unclassified,
}

impl Layer {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Presentation => "presentation",
            Self::BusinessLogic => "business-logic",
            Self::DataAccess => "data-access",
            Self::Infrastructure => "infrastructure",
            Self::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected code construct with its byte span `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralUnit {
    pub kind: UnitKind,
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub patterns: PatternSet,
    pub complexity: ComplexityTier,
}

impl StructuralUnit {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    #[must_use]
    pub fn to_ref(&self) -> UnitRef {
        UnitRef {
            kind: self.kind,
            name: self.name.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

/// Lightweight reference to the unit a chunk was cut from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub kind: UnitKind,
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Everything the structural analyzer learned about one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub language: Option<Language>,
    /// Top-level units ordered by start offset, never overlapping
    pub units: Vec<StructuralUnit>,
    /// Import sources in order of first appearance
    pub imports: Vec<String>,
    /// Exported names (`default` for a default export)
    pub exports: Vec<String>,
    /// Hook identifiers called anywhere in the file
    pub hooks: Vec<String>,
    /// Union of unit patterns and patterns found between units
    pub patterns: PatternSet,
    pub complexity: Complexity,
    pub platform: Platform,
}

/// Position of a piece within a region that had to be split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPart {
    pub index: usize,
    pub total: usize,
}

/// Metadata attached to every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub language: Language,
    /// Enclosing unit, `None` for misc chunks
    pub unit: Option<UnitRef>,
    /// Set when the chunk is one piece of a split region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<ChunkPart>,
    pub complexity: ComplexityTier,
    pub layer: Layer,
    pub feature: String,
    pub patterns: PatternSet,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    pub platform: Platform,
}

impl ChunkMetadata {
    /// Metadata with language only, unclassified
    pub fn with_language(language: Language) -> Self {
        Self {
            language,
            unit: None,
            part: None,
            complexity: ComplexityTier::Low,
            layer: Layer::Unclassified,
            feature: crate::classifier::SHARED_FEATURE.to_string(),
            patterns: PatternSet::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            hooks: Vec::new(),
            platform: Platform::Universal,
        }
    }

    /// Builder: set enclosing unit
    #[must_use]
    pub fn unit(mut self, unit: &StructuralUnit) -> Self {
        self.unit = Some(unit.to_ref());
        self
    }

    /// Builder: set complexity tier
    #[must_use]
    pub const fn complexity(mut self, tier: ComplexityTier) -> Self {
        self.complexity = tier;
        self
    }

    /// Builder: set pattern tags
    #[must_use]
    pub fn patterns(mut self, patterns: PatternSet) -> Self {
        self.patterns = patterns;
        self
    }
}

/// A bounded, boundary-aware span of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Path relative to the project root, `/`-separated
    pub file_path: String,

    /// Sequence index within the file
    pub index: usize,

    /// Byte offset of the first byte (inclusive)
    pub start: usize,

    /// Byte offset past the last byte
    pub end: usize,

    /// Leading bytes copied from the previous chunk at a forced split
    pub overlap: usize,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// The text slice `[start, end)` copied out of the file
    pub content: String,

    pub metadata: ChunkMetadata,
}

impl CodeChunk {
    /// Offset where the non-overlapping part of the chunk begins
    #[must_use]
    pub const fn body_start(&self) -> usize {
        self.start + self.overlap
    }

    /// Number of characters in the chunk text
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    #[must_use]
    pub const fn is_misc(&self) -> bool {
        self.metadata.unit.is_none()
    }

    /// Text handed to the embedding provider
    #[must_use]
    pub fn embedding_text(&self, include_header: bool) -> String {
        if !include_header {
            return self.content.clone();
        }
        let mut header = format!(
            "File: {}\nLayer: {}\nFeature: {}\nChunk: {}",
            self.file_path,
            self.metadata.layer,
            self.metadata.feature,
            self.index + 1
        );
        if let Some(unit) = &self.metadata.unit {
            header.push_str(&format!("\nUnit: {} {}", unit.kind.as_str(), unit.name));
        }
        format!("{header}\n\n{}", self.content)
    }
}
