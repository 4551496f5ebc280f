//! # Cortex Code Chunker
//!
//! Structure-aware code chunking for embedding pipelines.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language Detection (from extension)
//!     │
//!     ├──> Lexical Scan → code mask, bracket depth
//!     │
//!     ├──> Structural Analysis
//!     │    ├─> Components, hooks, functions, classes
//!     │    ├─> Imports, exports, hook usage, platform
//!     │    └─> Pattern tags and complexity
//!     │
//!     ├──> Chunk Generation
//!     │    ├─> Whole units when they fit
//!     │    └─> Split oversized regions with overlap
//!     │
//!     └──> Layer Classification (path conventions, then patterns)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cortex_code_chunker::{Chunker, ChunkerConfig, LayerClassifier};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let code = "export function useToggle(initial) {\n  return useState(initial);\n}\n";
//!
//! let (analysis, mut chunks) = chunker.chunk_str("src/hooks/useToggle.js", code).unwrap();
//! LayerClassifier::default().apply(&mut chunks);
//!
//! assert_eq!(analysis.units.len(), 1);
//! assert_eq!(chunks[0].metadata.layer.as_str(), "business-logic");
//! ```

mod analyzer;
mod chunker;
mod classifier;
mod config;
mod error;
mod language;
mod patterns;
mod scanner;
mod strategy;
mod types;

pub use analyzer::{
    detect_platform, score_complexity, tier_for, StructuralAnalyzer, BRANCH_WEIGHT,
    LINES_PER_POINT, LOW_THRESHOLD, MEDIUM_THRESHOLD, NESTING_WEIGHT, UNIT_WEIGHT,
};
pub use chunker::Chunker;
pub use classifier::{LayerClassifier, LayerConfig, SHARED_FEATURE};
pub use config::{ChunkerConfig, MIN_CHUNK_SIZE};
pub use error::{ChunkerError, Result};
pub use language::Language;
pub use patterns::detect as detect_patterns;
pub use types::{
    ChunkMetadata, ChunkPart, CodeChunk, Complexity, ComplexityTier, FileAnalysis, Layer,
    PatternSet, PatternTag, Platform, StructuralUnit, UnitKind, UnitRef,
};
