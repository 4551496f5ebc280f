use anyhow::{Context, Result};
use clap::ValueEnum;
use cortex_code_chunker::ChunkMetadata;
use cortex_vectorizer::{EmbeddingRecord, RunStats, VectorizerOutput};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const KNOWLEDGE_BASE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// One JSON document with `metadata` and `records`
    Json,
    /// One record per line
    Jsonl,
}

impl ExportFormat {
    const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KnowledgeBaseMetadata<'a> {
    pub schema_version: u32,
    pub project_name: &'a str,
    pub generator: String,
    pub generated_at_unix: u64,
    pub provider: &'a str,
    pub embedding_model: &'a str,
    pub dimension: usize,
    pub total_records: usize,
    pub stats: &'a RunStats,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeRecord<'a> {
    pub id: String,
    pub file: &'a str,
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: &'a str,
    pub metadata: &'a ChunkMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<&'a [f32]>,
}

impl<'a> KnowledgeRecord<'a> {
    pub fn new(record: &'a EmbeddingRecord, include_vectors: bool) -> Self {
        let chunk = &record.chunk;
        Self {
            id: record.id(),
            file: &chunk.file_path,
            index: chunk.index,
            start: chunk.start,
            end: chunk.end,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            content: &chunk.content,
            metadata: &chunk.metadata,
            embedding: include_vectors.then_some(record.vector.as_slice()),
        }
    }
}

#[derive(Debug, Serialize)]
struct KnowledgeBase<'a> {
    metadata: KnowledgeBaseMetadata<'a>,
    records: Vec<KnowledgeRecord<'a>>,
}

/// Where and how to write the knowledge base
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub project_name: String,
    pub include_vectors: bool,
    pub pretty: bool,
}

impl ExportOptions {
    /// Output path with the extension matching the format
    pub fn resolved_path(&self) -> PathBuf {
        self.path.with_extension(self.format.extension())
    }
}

pub fn metadata<'a>(output: &'a VectorizerOutput, project_name: &'a str) -> KnowledgeBaseMetadata<'a> {
    let generated_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    KnowledgeBaseMetadata {
        schema_version: KNOWLEDGE_BASE_SCHEMA_VERSION,
        project_name,
        generator: format!("cortex {}", env!("CARGO_PKG_VERSION")),
        generated_at_unix,
        provider: &output.provider,
        embedding_model: &output.model,
        dimension: output.dimension,
        total_records: output.records.len(),
        stats: &output.stats,
    }
}

/// Write the knowledge base and return the path written
pub fn write_knowledge_base(output: &VectorizerOutput, options: &ExportOptions) -> Result<PathBuf> {
    let path = options.resolved_path();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let records = output
        .records
        .iter()
        .map(|record| KnowledgeRecord::new(record, options.include_vectors));
    match options.format {
        ExportFormat::Json => {
            let document = KnowledgeBase {
                metadata: metadata(output, &options.project_name),
                records: records.collect(),
            };
            if options.pretty {
                serde_json::to_writer_pretty(&mut writer, &document)?;
            } else {
                serde_json::to_writer(&mut writer, &document)?;
            }
            writer.write_all(b"\n")?;
        }
        ExportFormat::Jsonl => {
            for record in records {
                serde_json::to_writer(&mut writer, &record)?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!(
        "Exported {} records to {}",
        output.records.len(),
        path.display()
    );
    Ok(path)
}

/// Summary path next to the knowledge base
pub fn summary_path(knowledge_base: &Path) -> PathBuf {
    knowledge_base.with_file_name("cortex_summary.md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_code_chunker::{CodeChunk, Language};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tempfile::tempdir;

    fn output() -> VectorizerOutput {
        let chunk = CodeChunk {
            file_path: "src/app.js".to_string(),
            index: 0,
            start: 0,
            end: 12,
            overlap: 0,
            start_line: 1,
            end_line: 1,
            content: "let a = 1;\n".to_string(),
            metadata: ChunkMetadata::with_language(Language::JavaScript),
        };
        VectorizerOutput {
            provider: "local-stub:all-minilm-l6-v2".to_string(),
            model: "all-minilm-l6-v2".to_string(),
            dimension: 2,
            records: vec![EmbeddingRecord {
                chunk,
                vector: vec![0.6, 0.8],
                provider: "local-stub:all-minilm-l6-v2".to_string(),
                dimension: 2,
            }],
            errors: Vec::new(),
            files: Vec::new(),
            stats: RunStats::default(),
        }
    }

    fn options(dir: &Path, format: ExportFormat) -> ExportOptions {
        ExportOptions {
            path: dir.join("out/kb.json"),
            format,
            project_name: "demo".to_string(),
            include_vectors: true,
            pretty: false,
        }
    }

    #[test]
    fn test_json_document_shape() {
        let temp = tempdir().unwrap();
        let path = write_knowledge_base(&output(), &options(temp.path(), ExportFormat::Json)).unwrap();

        assert_eq!(path, temp.path().join("out/kb.json"));
        let doc: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc["metadata"]["project_name"], "demo");
        assert_eq!(doc["metadata"]["total_records"], 1);
        assert_eq!(doc["metadata"]["dimension"], 2);
        assert_eq!(doc["records"][0]["id"], "src/app.js:0");
        assert_eq!(doc["records"][0]["metadata"]["layer"], "unclassified");
        assert_eq!(doc["records"][0]["embedding"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_jsonl_without_vectors() {
        let temp = tempdir().unwrap();
        let mut options = options(temp.path(), ExportFormat::Jsonl);
        options.include_vectors = false;

        let path = write_knowledge_base(&output(), &options).unwrap();

        assert_eq!(path, temp.path().join("out/kb.jsonl"));
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let record: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["file"], "src/app.js");
        assert!(record.get("embedding").is_none());
    }
}
