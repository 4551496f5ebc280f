//! # Cortex Vectorizer
//!
//! Turns a source tree into embedding records for a retrieval knowledge base.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> FileWalker (extension allow-list, ignored dirs, lexicographic)
//!     │      └─> SourceFile (UTF-8, Latin-1 fallback)
//!     │
//!     ├──> StructuralAnalyzer → Chunker → LayerClassifier
//!     │      └─> Chunks with layer / feature / pattern metadata
//!     │
//!     └──> EmbeddingProvider (batches span files)
//!            └─> EmbeddingRecords + ProcessingErrors + RunStats
//! ```
//!
//! Failures are attributed to the file they happened in and never abort a run; only a
//! missing root directory or an invalid configuration does, and both are detected before
//! any file is read.
//!
//! ## Example
//!
//! ```no_run
//! use cortex_vectorizer::{VectorizerConfig, VectorizerPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VectorizerConfig::load("cortex.toml")?;
//!     let pipeline = VectorizerPipeline::new(config)?;
//!     let output = pipeline.run("/path/to/project").await?;
//!
//!     println!(
//!         "Embedded {} chunks from {} files",
//!         output.stats.chunks_embedded, output.stats.files_seen
//!     );
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pipeline;
mod record;
mod source;
mod stats;
mod walker;

pub use config::{VectorizerConfig, WalkerConfig, DEFAULT_MAX_FILE_BYTES};
pub use error::{Result, VectorizerError};
pub use pipeline::{VectorizerOutput, VectorizerPipeline};
pub use record::{EmbeddingRecord, FileReport, FileState, ProcessingError, Stage};
pub use source::{decode, Encoding, SourceFile};
pub use stats::RunStats;
pub use walker::FileWalker;
