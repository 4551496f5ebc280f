use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Parser, ValueEnum};
use cortex_embeddings::{ProviderKind, EMBEDDING_MODE_ENV, MODEL_DIR_ENV};
use cortex_vectorizer::{VectorizerConfig, VectorizerPipeline};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod export;
mod report;

pub use export::{write_knowledge_base, ExportFormat, ExportOptions};
pub use report::render_summary;

const DEFAULT_CONFIG_FILE: &str = "cortex.toml";

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "cortex")]
#[command(about = "Chunk a source tree and embed it into a retrieval knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directory to vectorize
    #[arg(default_value = ".")]
    source: PathBuf,

    /// Knowledge base output file (extension follows --format)
    #[arg(short, long, default_value = "cortex_knowledge_base.json")]
    output: PathBuf,

    /// TOML configuration (defaults to ./cortex.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the embedding provider
    #[arg(long, value_enum)]
    provider: Option<ProviderFlag>,

    /// Override the embedding model id
    #[arg(long)]
    model: Option<String>,

    /// Override texts per provider call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override batches in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override the local embedding backend in this process
    #[arg(long, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Model directory (overrides CORTEX_MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Knowledge base layout
    #[arg(long, value_enum, default_value = "json")]
    format: ExportFormat,

    /// Project name recorded in the knowledge base (defaults to the directory name)
    #[arg(long)]
    project_name: Option<String>,

    /// Leave vectors out of the export
    #[arg(long)]
    no_vectors: bool,

    /// Pretty-print the JSON document
    #[arg(long)]
    pretty: bool,

    /// Skip the Markdown summary
    #[arg(long)]
    no_summary: bool,

    /// Exit with an error when any file failed
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum ProviderFlag {
    Local,
    Remote,
}

impl ProviderFlag {
    const fn as_domain(self) -> ProviderKind {
        match self {
            ProviderFlag::Local => ProviderKind::Local,
            ProviderFlag::Remote => ProviderKind::Remote,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Onnx,
    Stub,
}

impl EmbedMode {
    const fn as_str(self) -> &'static str {
        match self {
            EmbedMode::Onnx => "onnx",
            EmbedMode::Stub => "stub",
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.model_dir {
        env::set_var(MODEL_DIR_ENV, dir);
    }
    if let Some(mode) = cli.embed_mode {
        env::set_var(EMBEDDING_MODE_ENV, mode.as_str());
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT logs every session option at info level
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(&cli)?;
    let pipeline = VectorizerPipeline::new(config).context("Failed to set up the pipeline")?;
    let output = pipeline
        .run(&cli.source)
        .await
        .with_context(|| format!("Failed to vectorize {}", cli.source.display()))?;

    let options = ExportOptions {
        path: cli.output.clone(),
        format: cli.format,
        project_name: cli
            .project_name
            .clone()
            .unwrap_or_else(|| project_name(&cli.source)),
        include_vectors: !cli.no_vectors,
        pretty: cli.pretty,
    };
    let knowledge_base = write_knowledge_base(&output, &options)?;

    if !cli.no_summary {
        let summary_path = export::summary_path(&knowledge_base);
        let md = render_summary(&cli.source, &knowledge_base, &output);
        fs::write(&summary_path, md)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;
        log::info!("Summary written to {}", summary_path.display());
    }

    let stats = &output.stats;
    log::info!(
        "Embedded {} of {} chunks from {} files ({} failed) in {} ms",
        stats.chunks_embedded,
        stats.chunks_produced,
        stats.files_seen,
        stats.files_failed,
        stats.elapsed_ms
    );
    print_stdout(&knowledge_base.display().to_string())?;

    if cli.strict && !output.errors.is_empty() {
        bail!(
            "{} processing errors across {} files",
            output.errors.len(),
            stats.files_failed
        );
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<VectorizerConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let mut config = match &cli.config {
        Some(path) => VectorizerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if default_path.is_file() => VectorizerConfig::load(default_path)
            .with_context(|| format!("Failed to load config {DEFAULT_CONFIG_FILE}"))?,
        None => VectorizerConfig::default(),
    };

    let embedding = &mut config.embedding;
    if let Some(provider) = cli.provider {
        let kind = provider.as_domain();
        if embedding.provider != kind {
            // Model ids and batch sizes do not carry over between providers
            embedding.model = None;
            embedding.batch_size = None;
        }
        embedding.provider = kind;
    }
    if let Some(model) = &cli.model {
        embedding.model = Some(model.clone());
    }
    if let Some(batch_size) = cli.batch_size {
        embedding.batch_size = Some(batch_size);
    }
    if let Some(concurrency) = cli.concurrency {
        embedding.concurrency = Some(concurrency);
    }
    Ok(config)
}

fn project_name(source: &Path) -> String {
    fs::canonicalize(source)
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string())
}
