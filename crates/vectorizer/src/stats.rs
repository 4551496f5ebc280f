use crate::record::{EmbeddingRecord, FileReport, FileState, ProcessingError, Stage};
use cortex_code_chunker::{ComplexityTier, Layer, PatternTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub files_seen: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,

    pub chunks_produced: usize,
    pub chunks_embedded: usize,

    /// Lines across every file that was read
    pub total_lines: usize,

    pub errors_by_stage: BTreeMap<Stage, usize>,

    /// Embedded chunks per layer
    pub layers: BTreeMap<Layer, usize>,
    pub features: BTreeMap<String, usize>,
    pub patterns: BTreeMap<PatternTag, usize>,
    pub complexity: BTreeMap<ComplexityTier, usize>,
    pub languages: BTreeMap<String, usize>,

    /// Network attempts made by the embedding provider during the run
    pub provider_attempts: u64,

    pub elapsed_ms: u64,
}

impl RunStats {
    pub fn add_record(&mut self, record: &EmbeddingRecord) {
        let metadata = &record.chunk.metadata;
        self.chunks_embedded += 1;
        *self.layers.entry(metadata.layer).or_insert(0) += 1;
        *self.features.entry(metadata.feature.clone()).or_insert(0) += 1;
        *self.complexity.entry(metadata.complexity).or_insert(0) += 1;
        *self
            .languages
            .entry(metadata.language.as_str().to_string())
            .or_insert(0) += 1;
        for pattern in &metadata.patterns {
            *self.patterns.entry(*pattern).or_insert(0) += 1;
        }
    }

    pub fn add_error(&mut self, error: &ProcessingError) {
        *self.errors_by_stage.entry(error.stage).or_insert(0) += 1;
    }

    /// Count final file states
    pub fn add_files(&mut self, files: &[FileReport]) {
        for file in files {
            if file.state.is_failed() {
                self.files_failed += 1;
            } else if file.state == FileState::Done {
                self.files_succeeded += 1;
            }
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors_by_stage.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_states_are_counted() {
        let mut done = FileReport::new("a.js".to_string());
        done.advance(FileState::Done);
        let mut failed = FileReport::new("b.js".to_string());
        failed.fail(Stage::Read);

        let mut stats = RunStats::default();
        stats.add_files(&[done, failed]);
        stats.add_error(&ProcessingError {
            file: "b.js".to_string(),
            stage: Stage::Read,
            message: "binary".to_string(),
            chunks: Vec::new(),
        });

        assert_eq!(stats.files_succeeded, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.errors_by_stage.get(&Stage::Read), Some(&1));
        assert_eq!(stats.error_count(), 1);
    }
}
