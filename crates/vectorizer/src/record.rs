use cortex_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing step a file can fail in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Read,
    Analyze,
    Chunk,
    Classify,
    Embed,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Read,
        Self::Analyze,
        Self::Chunk,
        Self::Classify,
        Self::Embed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Analyze => "analyze",
            Self::Chunk => "chunk",
            Self::Classify => "classify",
            Self::Embed => "embed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a file ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "stage")]
pub enum FileState {
    Pending,
    Read,
    Analyzed,
    Chunked,
    Classified,
    Embedded,
    Done,
    Failed(Stage),
}

impl FileState {
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-file outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub state: FileState,
    pub chunks: usize,
    pub embedded: usize,
}

impl FileReport {
    pub(crate) fn new(path: String) -> Self {
        Self {
            path,
            state: FileState::Pending,
            chunks: 0,
            embedded: 0,
        }
    }

    /// Move forward unless the file already failed
    pub(crate) fn advance(&mut self, state: FileState) {
        if !self.state.is_failed() {
            self.state = state;
        }
    }

    pub(crate) fn fail(&mut self, stage: Stage) {
        if !self.state.is_failed() {
            self.state = FileState::Failed(stage);
        }
    }
}

/// A failure attributed to one file; never aborts the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub file: String,
    pub stage: Stage,
    pub message: String,
    /// Chunk indexes within the file that were lost, for embed failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<usize>,
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.file, self.stage, self.message)
    }
}

/// One embedded chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: CodeChunk,
    pub vector: Vec<f32>,
    /// Provider identity, e.g. `local:all-minilm-l6-v2`
    pub provider: String,
    pub dimension: usize,
}

impl EmbeddingRecord {
    /// Stable identifier: `<file>:<index>`
    pub fn id(&self) -> String {
        format!("{}:{}", self.chunk.file_path, self.chunk.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_failed_state_is_sticky() {
        let mut report = FileReport::new("src/app.js".to_string());
        report.advance(FileState::Read);
        report.fail(Stage::Analyze);
        report.advance(FileState::Done);
        report.fail(Stage::Embed);
        assert_eq!(report.state, FileState::Failed(Stage::Analyze));
    }

    #[test]
    fn test_file_state_serialization() {
        assert_eq!(
            serde_json::to_value(FileState::Failed(Stage::Read)).unwrap(),
            serde_json::json!({"state": "failed", "stage": "read"})
        );
        assert_eq!(
            serde_json::to_value(FileState::Done).unwrap(),
            serde_json::json!({"state": "done"})
        );
    }
}
