use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cex_core::config_file::{self, ConfigFile};
use cex_core::{
    AnchorStyle, ExceptionTable, Extraction, ExtractionConfigBuilder, ExtractionEngine,
    HeadingAligner, RuleSegmenter, SectionErrorPolicy, SentenceSegmenter,
};
use cex_ingest::TeiInput;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

mod output;

use output::{ColorMode, RunSummary};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_ARCHIVE_MB: u32 = 500;

/// Citation-context extractor - pull the citing sentence of every reference
/// out of GROBID TEI documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract citation contexts from TEI files, directories, or archives
    Extract(ExtractArgs),

    /// Print the sentences of a plain-text file, one per line
    Segment {
        /// Text file to segment
        file: PathBuf,

        /// JSON exception table of words that never end a sentence
        #[arg(long)]
        exceptions: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct ExtractArgs {
    /// TEI files, directories, or .zip/.tar/.tar.gz archives
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the JSON output files
    #[arg(short, long)]
    output_dir: PathBuf,

    /// JSON exception table of words that never end a sentence
    #[arg(long)]
    exceptions: Option<PathBuf>,

    /// Also write `<stem>_targets.json` mapping keys to bibliography ids
    #[arg(long)]
    targets: bool,

    /// Number of documents processed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Per-document time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Align section labels to a list of canonical headings
    #[arg(long)]
    align: bool,

    /// Canonical headings (JSON array or one per line)
    #[arg(long)]
    headings: Option<PathBuf>,

    /// Keyword mappings (JSON object of keyword -> headings)
    #[arg(long)]
    mappings: Option<PathBuf>,

    /// Minimum similarity for fuzzy heading alignment
    #[arg(long)]
    threshold: Option<f64>,

    /// Fail a document when one of its sections cannot be segmented
    #[arg(long)]
    abort_on_section_error: bool,

    /// Keep the anchor key token (`citN`) in CITATION instead of the marker text
    #[arg(long)]
    anchor_key: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let file_config = config_file::load_config();
    match cli.command {
        Command::Extract(args) => {
            let env = |name: &str| std::env::var(name).ok();
            let settings = Settings::resolve(&args, env, &file_config)?;
            extract(args, settings).await
        }
        Command::Segment { file, exceptions } => {
            let exceptions = exceptions
                .or_else(|| std::env::var("CEX_EXCEPTIONS").ok().map(PathBuf::from))
                .or_else(|| exceptions_from_file(&file_config));
            segment(&file, exceptions.as_deref())
        }
    }
}

/// `RUST_LOG` wins over `--verbose`/`--quiet`.
fn init_tracing(verbose: bool, quiet: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exceptions_from_file(file: &ConfigFile) -> Option<PathBuf> {
    file.extraction
        .as_ref()
        .and_then(|s| s.exceptions_path.as_ref())
        .map(PathBuf::from)
}

/// Alignment inputs, present only when `--align` is given.
#[derive(Debug)]
struct AlignSettings {
    headings: PathBuf,
    mappings: Option<PathBuf>,
    threshold: Option<f64>,
}

/// Effective settings for one run.
///
/// Precedence: CLI flags > env vars > config file > defaults.
#[derive(Debug)]
struct Settings {
    exceptions: Option<PathBuf>,
    workers: usize,
    timeout: Duration,
    max_archive_bytes: u64,
    emit_targets: bool,
    anchor_style: AnchorStyle,
    section_errors: SectionErrorPolicy,
    formula_regex: Option<String>,
    untitled_prefix: Option<String>,
    figure_section: Option<String>,
    align: Option<AlignSettings>,
}

impl Settings {
    fn resolve(
        args: &ExtractArgs,
        env: impl Fn(&str) -> Option<String>,
        file: &ConfigFile,
    ) -> anyhow::Result<Self> {
        let extraction = file.extraction.clone().unwrap_or_default();
        let concurrency = file.concurrency.clone().unwrap_or_default();
        let alignment = file.alignment.clone().unwrap_or_default();

        let exceptions = args
            .exceptions
            .clone()
            .or_else(|| env("CEX_EXCEPTIONS").map(PathBuf::from))
            .or_else(|| extraction.exceptions_path.as_ref().map(PathBuf::from));
        let workers = args
            .workers
            .or_else(|| env("CEX_WORKERS").and_then(|v| v.parse().ok()))
            .or(concurrency.num_workers)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, |n| n.get()))
            .max(1);
        let timeout_secs = args
            .timeout
            .or_else(|| env("CEX_TIMEOUT").and_then(|v| v.parse().ok()))
            .or(concurrency.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_archive_mb = concurrency.max_archive_size_mb.unwrap_or(DEFAULT_MAX_ARCHIVE_MB);

        let anchor_style = if args.anchor_key {
            AnchorStyle::Key
        } else {
            extraction.anchor_style.unwrap_or_default()
        };
        let section_errors = if args.abort_on_section_error {
            SectionErrorPolicy::Abort
        } else {
            extraction.section_errors.unwrap_or_default()
        };

        let align = if args.align {
            let headings = args
                .headings
                .clone()
                .or_else(|| alignment.headings_path.as_ref().map(PathBuf::from))
                .context("--align needs canonical headings: pass --headings or set alignment.headings_path")?;
            Some(AlignSettings {
                headings,
                mappings: args
                    .mappings
                    .clone()
                    .or_else(|| alignment.mappings_path.as_ref().map(PathBuf::from)),
                threshold: args.threshold.or(alignment.threshold),
            })
        } else {
            None
        };

        Ok(Self {
            exceptions,
            workers,
            timeout: Duration::from_secs(timeout_secs),
            max_archive_bytes: u64::from(max_archive_mb) * 1024 * 1024,
            emit_targets: args.targets || extraction.emit_targets.unwrap_or(false),
            anchor_style,
            section_errors,
            formula_regex: extraction.formula_regex,
            untitled_prefix: extraction.untitled_prefix,
            figure_section: extraction.figure_section,
            align,
        })
    }

    fn build_engine(&self) -> anyhow::Result<ExtractionEngine> {
        let mut builder = ExtractionConfigBuilder::new()
            .anchor_style(self.anchor_style)
            .section_error_policy(self.section_errors);
        if let Some(ref pattern) = self.formula_regex {
            builder = builder.formula_regex(pattern);
        }
        if let Some(ref prefix) = self.untitled_prefix {
            builder = builder.untitled_prefix(prefix);
        }
        if let Some(ref label) = self.figure_section {
            builder = builder.figure_section(label);
        }
        let config = builder.build().context("invalid formula_regex in config")?;
        let exceptions = load_exceptions(self.exceptions.as_deref())?;
        Ok(ExtractionEngine::with_config(
            config,
            exceptions,
            Arc::new(RuleSegmenter::new()),
        ))
    }

    fn build_aligner(&self) -> anyhow::Result<Option<HeadingAligner>> {
        let Some(ref align) = self.align else {
            return Ok(None);
        };
        let mut aligner = HeadingAligner::new(HeadingAligner::load_canonical(&align.headings)?);
        if let Some(ref mappings) = align.mappings {
            aligner = aligner.with_mappings(HeadingAligner::load_mappings(mappings)?);
        }
        if let Some(threshold) = align.threshold {
            aligner = aligner.with_threshold(threshold);
        }
        Ok(Some(aligner))
    }
}

fn load_exceptions(path: Option<&Path>) -> anyhow::Result<ExceptionTable> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Exception table not found: {}", path.display());
            }
            Ok(ExceptionTable::from_path(path)?)
        }
        None => Ok(ExceptionTable::new()),
    }
}

/// One manifest record per resolved document.
#[derive(Debug, Serialize)]
struct ManifestEntry {
    filename: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overwritten: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections_skipped: Option<usize>,
}

type Outcome = Result<Extraction, String>;

async fn extract(args: ExtractArgs, settings: Settings) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let color = ColorMode(!args.no_color && std::io::stdout().is_terminal());
    let mut stdout = std::io::stdout();

    let engine = Arc::new(settings.build_engine()?);
    let aligner = settings.build_aligner()?;

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;
    let scratch = tempfile::tempdir()?;
    let inputs = cex_ingest::resolve_inputs(&args.inputs, scratch.path(), settings.max_archive_bytes)?;
    output::print_input_report(
        &mut stdout,
        inputs.documents.len(),
        &inputs.unsupported,
        &inputs.warnings,
        color,
    )?;
    if inputs.documents.is_empty() {
        writeln!(stdout, "No TEI documents to process.")?;
        return Ok(());
    }

    let bar = ProgressBar::new(inputs.documents.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    // Closing the pool on Ctrl+C fails every document still waiting for a worker
    let pool = Arc::new(Semaphore::new(settings.workers));
    {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                pool.close();
            }
        });
    }

    let timeout = settings.timeout;
    let handles: Vec<_> = inputs
        .documents
        .iter()
        .cloned()
        .map(|input| {
            let pool = Arc::clone(&pool);
            let engine = Arc::clone(&engine);
            let bar = bar.clone();
            tokio::spawn(async move {
                let Ok(permit) = pool.acquire_owned().await else {
                    return (input, Err("cancelled".to_string()));
                };
                bar.set_message(input.name.clone());
                let outcome = run_one(engine, input.path.clone(), timeout, permit).await;
                bar.inc(1);
                (input, outcome)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }
    bar.finish_and_clear();

    let mut summary = RunSummary {
        documents: results.len(),
        unsupported: inputs.unsupported.len(),
        ..Default::default()
    };
    let mut failures = Vec::new();
    let mut manifest = Vec::with_capacity(results.len());
    let mut stems = StemAllocator::default();

    for (input, outcome) in results {
        match outcome {
            Ok(mut extraction) => {
                let stem = stems.allocate(&input);
                let alignment = aligner.as_ref().map(|a| a.annotate(&mut extraction.contexts));
                write_json(&args.output_dir.join(format!("{stem}.json")), &extraction.contexts)?;
                if settings.emit_targets {
                    write_json(
                        &args.output_dir.join(format!("{stem}_targets.json")),
                        &extraction.targets,
                    )?;
                }
                if let Some(alignment) = alignment {
                    write_json(
                        &args.output_dir.join(format!("{stem}_aligned_mapping.json")),
                        &alignment,
                    )?;
                }

                let stats = &extraction.stats;
                summary.succeeded += 1;
                summary.entries += stats.entries;
                summary.overwritten += stats.overwritten;
                summary.sections_skipped += stats.sections_skipped;
                summary.superscript_documents += usize::from(stats.superscript);
                manifest.push(ManifestEntry {
                    filename: input.name,
                    status: "ok",
                    output: Some(format!("{stem}.json")),
                    error: None,
                    entries: Some(stats.entries),
                    overwritten: Some(stats.overwritten),
                    sections_skipped: Some(stats.sections_skipped),
                });
            }
            Err(error) => {
                tracing::warn!(document = %input.name, error = %error, "extraction failed");
                summary.failed += 1;
                failures.push((input.name.clone(), error.clone()));
                manifest.push(ManifestEntry {
                    filename: input.name,
                    status: "error",
                    output: None,
                    error: Some(error),
                    entries: None,
                    overwritten: None,
                    sections_skipped: None,
                });
            }
        }
    }

    write_json(&args.output_dir.join("manifest.json"), &manifest)?;
    output::print_failures(&mut stdout, &failures, color)?;
    output::print_summary(&mut stdout, &summary, color)?;
    Ok(())
}

/// Extract one document on the blocking pool, bounded by `timeout`.
async fn run_one(
    engine: Arc<ExtractionEngine>,
    path: PathBuf,
    timeout: Duration,
    permit: OwnedSemaphorePermit,
) -> Outcome {
    run_blocking(permit, timeout, move || engine.extract_path(&path)).await
}

/// Run `work` on the blocking pool while it holds `permit`.
///
/// A timed-out job keeps running on its thread and keeps its worker slot
/// until it returns; only its result is dropped.
async fn run_blocking<E>(
    permit: OwnedSemaphorePermit,
    timeout: Duration,
    work: impl FnOnce() -> Result<Extraction, E> + Send + 'static,
) -> Outcome
where
    E: std::fmt::Display + Send + 'static,
{
    let job = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work()
    });
    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(Ok(extraction))) => Ok(extraction),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(join)) => Err(format!("worker failed: {join}")),
        Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
    }
}

/// Hands out output stems, suffixing `_2`, `_3`, ... on collisions.
#[derive(Debug, Default)]
struct StemAllocator {
    seen: HashMap<String, usize>,
}

impl StemAllocator {
    fn allocate(&mut self, input: &TeiInput) -> String {
        let stem = input.stem().to_string();
        let count = self.seen.entry(stem.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            stem
        } else {
            format!("{stem}_{count}")
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn segment(file: &Path, exceptions: Option<&Path>) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let text = std::fs::read_to_string(file)?;
    let exceptions = load_exceptions(exceptions)?;
    let sentences = RuleSegmenter::new().segment(&text, &exceptions)?;

    let mut stdout = std::io::stdout();
    for (i, sentence) in sentences.iter().enumerate() {
        writeln!(stdout, "{:>4}  {}", i + 1, sentence)?;
    }
    Ok(())
}
