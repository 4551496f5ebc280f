use crate::config::VectorizerConfig;
use crate::error::{Result, VectorizerError};
use crate::record::{EmbeddingRecord, FileReport, FileState, ProcessingError, Stage};
use crate::stats::RunStats;
use crate::walker::FileWalker;
use cortex_code_chunker::{Chunker, CodeChunk, LayerClassifier, StructuralAnalyzer};
use cortex_embeddings::{build_provider, EmbeddingError, EmbeddingProvider, ItemResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Everything a run produced, ready for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerOutput {
    /// Provider identity recorded on every vector
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    /// In file order, then chunk order
    pub records: Vec<EmbeddingRecord>,
    pub errors: Vec<ProcessingError>,
    pub files: Vec<FileReport>,
    pub stats: RunStats,
}

/// A chunk waiting for its vector, tagged with its file
struct PendingChunk {
    file: usize,
    chunk: CodeChunk,
}

/// What came back for one embedding batch
enum BatchOutcome {
    Items(Vec<ItemResult>),
    Failed(String),
}

type FileFailure = (Stage, String);

/// Walks, analyzes, chunks, classifies and embeds a source tree
pub struct VectorizerPipeline {
    config: VectorizerConfig,
    analyzer: StructuralAnalyzer,
    chunker: Chunker,
    classifier: LayerClassifier,
    provider: Arc<dyn EmbeddingProvider>,
}

impl VectorizerPipeline {
    /// Validate the configuration and build the configured provider.
    ///
    /// A missing API key or unknown model fails here, before any file is touched.
    pub fn new(config: VectorizerConfig) -> Result<Self> {
        config.validate()?;
        let provider = build_provider(&config.embedding).map_err(|err| match err {
            EmbeddingError::Configuration(msg) => VectorizerError::Configuration(msg),
            other => VectorizerError::Embedding(other),
        })?;
        Self::with_provider(config, provider)
    }

    /// Pipeline over a caller-supplied provider
    pub fn with_provider(
        config: VectorizerConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.clone())
            .map_err(|err| VectorizerError::configuration(err.to_string()))?;
        let classifier = LayerClassifier::new(&config.architecture);
        Ok(Self {
            config,
            analyzer: StructuralAnalyzer::new(),
            chunker,
            classifier,
            provider,
        })
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Process every candidate under `root`.
    ///
    /// Only a missing root fails the call; everything else is attributed to a file and
    /// reported in the output.
    pub async fn run(&self, root: impl AsRef<Path>) -> Result<VectorizerOutput> {
        let started = Instant::now();
        let walker = FileWalker::new(root, self.config.walker.clone())?;
        let attempts_before = self.provider.attempts();
        log::info!(
            "Vectorizing {} with {}",
            walker.root().display(),
            self.provider.id()
        );

        let mut stats = RunStats::default();
        let mut files = Vec::new();
        let mut errors = Vec::new();
        let mut pending = Vec::new();

        for path in walker.candidates() {
            let file = files.len();
            let mut report = FileReport::new(walker.relative_path(&path));
            stats.files_seen += 1;

            match self
                .prepare_file(&walker, &path, &mut report, &mut stats)
                .await
            {
                Ok(chunks) => {
                    log::debug!("{}: {} chunks", report.path, chunks.len());
                    report.chunks = chunks.len();
                    stats.chunks_produced += chunks.len();
                    if chunks.is_empty() {
                        report.advance(FileState::Done);
                    }
                    pending.extend(chunks.into_iter().map(|chunk| PendingChunk { file, chunk }));
                }
                Err((stage, message)) => {
                    log::warn!("{} failed at {stage}: {message}", report.path);
                    report.fail(stage);
                    errors.push(ProcessingError {
                        file: report.path.clone(),
                        stage,
                        message,
                        chunks: Vec::new(),
                    });
                }
            }
            files.push(report);
        }

        let records = self.embed_all(pending, &mut files, &mut errors).await;

        for file in &mut files {
            if file.state == FileState::Embedded {
                file.advance(FileState::Done);
            }
        }
        for record in &records {
            stats.add_record(record);
        }
        for error in &errors {
            stats.add_error(error);
        }
        stats.add_files(&files);
        stats.provider_attempts = self.provider.attempts().saturating_sub(attempts_before);
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::info!(
            "Vectorized {} files ({} failed): {} of {} chunks embedded in {} ms",
            stats.files_seen,
            stats.files_failed,
            stats.chunks_embedded,
            stats.chunks_produced,
            stats.elapsed_ms
        );

        Ok(VectorizerOutput {
            provider: self.provider.id(),
            model: self.provider.model().to_string(),
            dimension: self.provider.dimension(),
            records,
            errors,
            files,
            stats,
        })
    }

    /// Read → Analyzed → Chunked → Classified for one file
    async fn prepare_file(
        &self,
        walker: &FileWalker,
        path: &Path,
        report: &mut FileReport,
        stats: &mut RunStats,
    ) -> std::result::Result<Vec<CodeChunk>, FileFailure> {
        let source = walker
            .read(path)
            .await
            .map_err(|message| (Stage::Read, message))?;
        stats.total_lines += source.text.lines().count();
        report.advance(FileState::Read);

        let relative = source.relative_path.as_str();
        let text = source.text.as_str();

        let analysis = guarded(Stage::Analyze, || {
            Ok(self.analyzer.analyze_file(relative, text))
        })?;
        report.advance(FileState::Analyzed);

        let mut chunks = guarded(Stage::Chunk, || {
            self.chunker
                .chunk(relative, text, &analysis)
                .map_err(|err| err.to_string())
        })?;
        report.advance(FileState::Chunked);

        guarded(Stage::Classify, || {
            self.classifier.apply(&mut chunks);
            Ok(())
        })?;
        report.advance(FileState::Classified);

        Ok(chunks)
    }

    /// Embed chunks in batches that span files; failures are attributed per file
    async fn embed_all(
        &self,
        pending: Vec<PendingChunk>,
        files: &mut [FileReport],
        errors: &mut Vec<ProcessingError>,
    ) -> Vec<EmbeddingRecord> {
        if pending.is_empty() {
            return Vec::new();
        }

        let batch_size = self.provider.batch_size().max(1);
        let include_header = self.config.chunking.include_header;
        let batches: Vec<&[PendingChunk]> = pending.chunks(batch_size).collect();
        log::info!(
            "Embedding {} chunks in {} batches",
            pending.len(),
            batches.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.embedding.concurrency().max(1)));
        let mut tasks = JoinSet::new();
        let mut batch_of_task = HashMap::new();
        for (batch_no, batch) in batches.iter().enumerate() {
            let texts: Vec<String> = batch
                .iter()
                .map(|pending| pending.chunk.embedding_text(include_header))
                .collect();
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let handle = tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EmbeddingError::Fatal(format!("embedding scheduler closed: {e}")))?;
                provider.embed_items(&texts).await
            });
            batch_of_task.insert(handle.id(), batch_no);
        }

        let mut outcomes: BTreeMap<usize, BatchOutcome> = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (task, outcome) = match joined {
                Ok((task, Ok(items))) => (task, BatchOutcome::Items(items)),
                Ok((task, Err(err))) => (task, BatchOutcome::Failed(err.to_string())),
                Err(err) => (err.id(), BatchOutcome::Failed(format!("embedding task failed: {err}"))),
            };
            if let Some(batch_no) = batch_of_task.get(&task) {
                outcomes.insert(*batch_no, outcome);
            }
        }

        let dimension = self.provider.dimension();
        let provider_id = self.provider.id();
        let mut records = Vec::with_capacity(pending.len());
        for (batch_no, batch) in batches.iter().enumerate() {
            let outcome = outcomes
                .remove(&batch_no)
                .unwrap_or_else(|| BatchOutcome::Failed("embedding task vanished".to_string()));
            let items = match outcome {
                BatchOutcome::Items(items) if items.len() == batch.len() => items,
                BatchOutcome::Items(items) => {
                    let message = format!(
                        "provider returned {} results for {} chunks",
                        items.len(),
                        batch.len()
                    );
                    attribute_failures(batch.iter().collect(), &message, files, errors);
                    continue;
                }
                BatchOutcome::Failed(message) => {
                    log::warn!("Embedding batch {} failed: {message}", batch_no + 1);
                    attribute_failures(batch.iter().collect(), &message, files, errors);
                    continue;
                }
            };

            let mut failed: Vec<(&PendingChunk, String)> = Vec::new();
            for (pending, item) in batch.iter().zip(items) {
                match item {
                    Ok(vector) if vector.len() == dimension => {
                        let report = &mut files[pending.file];
                        report.embedded += 1;
                        if report.embedded == report.chunks {
                            report.advance(FileState::Embedded);
                        }
                        records.push(EmbeddingRecord {
                            chunk: pending.chunk.clone(),
                            vector,
                            provider: provider_id.clone(),
                            dimension,
                        });
                    }
                    Ok(vector) => failed.push((
                        pending,
                        EmbeddingError::InvalidDimension {
                            expected: dimension,
                            actual: vector.len(),
                        }
                        .to_string(),
                    )),
                    Err(err) => failed.push((pending, err.to_string())),
                }
            }
            for (pending, message) in failed {
                attribute_failures(vec![pending], &message, files, errors);
            }
        }
        records
    }
}

/// Mark each chunk's file as failed at embed, one error per file and message
fn attribute_failures(
    chunks: Vec<&PendingChunk>,
    message: &str,
    files: &mut [FileReport],
    errors: &mut Vec<ProcessingError>,
) {
    let mut by_file: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for pending in chunks {
        by_file
            .entry(pending.file)
            .or_default()
            .push(pending.chunk.index);
    }
    for (file, lost) in by_file {
        let report = &mut files[file];
        report.fail(Stage::Embed);
        if let Some(existing) = errors.iter_mut().find(|error| {
            error.stage == Stage::Embed && error.file == report.path && error.message == message
        }) {
            existing.chunks.extend(lost);
            continue;
        }
        errors.push(ProcessingError {
            file: report.path.clone(),
            stage: Stage::Embed,
            message: message.to_string(),
            chunks: lost,
        });
    }
}

/// Run one stage, turning an error or a panic into a stage failure
fn guarded<T>(
    stage: Stage,
    step: impl FnOnce() -> std::result::Result<T, String>,
) -> std::result::Result<T, FileFailure> {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result.map_err(|message| (stage, message)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err((stage, format!("panicked: {message}")))
        }
    }
}
