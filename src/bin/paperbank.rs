//! CLI binary for paperbank.
//!
//! A thin shim over the library crate: flags map to `IngestConfig`, results
//! are printed as JSON or written to files, and `serve` starts the HTTP API.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperbank::server::{self, AppState, AttachMarksRequest, ImportMarksRequest, ImportQuestionsRequest};
use paperbank::{
    parse_mark_scheme, parse_question_paper, CommandSpec, IngestConfig, IngestProgressCallback,
    PageOutcome, PaperStore, ProgressCallback, SkipReason, Toolkit,
};
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Classifying and rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Reading");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, outcome: &PageOutcome) {
        let (mark, text) = match outcome {
            PageOutcome::Structured { marks } => (green("✓"), format!("{marks} marks")),
            PageOutcome::Questions { count } => (green("✓"), format!("{count} questions")),
            PageOutcome::Notes => (green("✓"), "notes".to_string()),
            PageOutcome::Reused => (dim("="), "duplicate image, reused".to_string()),
            PageOutcome::Skipped(SkipReason::NoStatus) => (dim("-"), "no status".to_string()),
            PageOutcome::Skipped(SkipReason::BeforeFirstHeader) => {
                (dim("-"), "before first header".to_string())
            }
            PageOutcome::Rejected => (yellow("⚠"), "unreadable reply".to_string()),
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<24}  {}",
            mark,
            page_num,
            total,
            text,
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, records: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} records from {} pages",
            green("✔"),
            bold(&records.to_string()),
            total_pages
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a mark scheme, classifier script provides page status
  paperbank parse-ms ms.pdf --classifier "python3 detect_tables.py {input}" -o output_ms.json

  # Parse a question paper with the default vision model
  paperbank parse-qp qp.pdf -o output_qp.json

  # Store the results
  paperbank import-qp output_qp.json
  paperbank attach-ms output_ms.json

  # Serve the HTTP API
  paperbank serve --addr 0.0.0.0:3000

COMMAND TEMPLATES:
  Tool flags take a program and arguments. {input} and {output} are replaced
  by the document/image path and the output directory; without placeholders
  the paths are appended.

ENVIRONMENT VARIABLES:
  PAPERBANK_DB            SQLite database file
  PAPERBANK_ARTIFACT      Artifact path for `serve` mark-scheme uploads
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter, e.g. paperbank=debug
"#;

/// Import, reconcile and serve math exam papers and mark schemes.
#[derive(Parser, Debug)]
#[command(
    name = "paperbank",
    version,
    about = "Import, reconcile and serve math exam papers and mark schemes",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file.
    #[arg(long, global = true, env = "PAPERBANK_DB", default_value = "paperbank.db")]
    db: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPERBANK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPERBANK_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PAPERBANK_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a mark-scheme PDF into marks.
    ParseMs {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        /// Write the JSON document here instead of stdout.
        #[arg(short, long, env = "PAPERBANK_OUTPUT")]
        output: Option<PathBuf>,
        /// Write note text never attributed to a mark to this file.
        #[arg(long)]
        leftover_notes: Option<PathBuf>,
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Parse a question-paper PDF into questions.
    ParseQp {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        /// Write the JSON document here instead of stdout.
        #[arg(short, long, env = "PAPERBANK_OUTPUT")]
        output: Option<PathBuf>,
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Store parsed marks, creating the paper when needed.
    ImportMs { json: PathBuf },
    /// Store parsed questions, creating the paper when needed.
    ImportQp { json: PathBuf },
    /// Attach parsed marks to the questions of an existing paper.
    AttachMs { json: PathBuf },
    /// List stored papers, newest first.
    Papers,
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "PAPERBANK_ADDR", default_value = "127.0.0.1:3000")]
        addr: String,
        /// Debug artifact written after every mark-scheme upload
        /// [default: <work-dir>/output_marks.json, or tmp/output_marks.json].
        #[arg(long, env = "PAPERBANK_ARTIFACT")]
        artifact: Option<PathBuf>,
        #[command(flatten)]
        ingest: IngestArgs,
    },
}

/// Options shared by every command that runs the pipeline.
#[derive(Args, Debug, Clone)]
struct IngestArgs {
    /// Page classifier command (prints {"pages": [...]}).
    #[arg(long, env = "PAPERBANK_CLASSIFIER")]
    classifier: Option<CommandSpec>,

    /// Page status JSON file used instead of a classifier command.
    #[arg(long, env = "PAPERBANK_PAGE_STATUS", conflicts_with = "classifier")]
    page_status: Option<PathBuf>,

    /// Page renderer command. Default: built-in pdfium.
    #[arg(long, env = "PAPERBANK_RENDERER")]
    renderer: Option<CommandSpec>,

    /// Text recognizer command. Default: tesseract {input} stdout.
    #[arg(long, env = "PAPERBANK_RECOGNIZER")]
    recognizer: Option<CommandSpec>,

    /// Page structurer command. Default: vision LLM.
    #[arg(long, env = "PAPERBANK_STRUCTURER")]
    structurer: Option<CommandSpec>,

    /// Question reader command. Default: vision LLM.
    #[arg(long, env = "PAPERBANK_QUESTION_READER")]
    question_reader: Option<CommandSpec>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file replacing the mark-scheme system prompt.
    #[arg(long, env = "PAPERBANK_MS_PROMPT")]
    ms_prompt: Option<PathBuf>,

    /// Path to a text file replacing the question-paper system prompt.
    #[arg(long, env = "PAPERBANK_QP_PROMPT")]
    qp_prompt: Option<PathBuf>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PAPERBANK_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAPERBANK_PASSWORD")]
    password: Option<String>,

    /// Retries per page on LLM failure.
    #[arg(long, env = "PAPERBANK_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call timeout for external tools, in seconds.
    #[arg(long, env = "PAPERBANK_TOOL_TIMEOUT", default_value_t = 120)]
    tool_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PAPERBANK_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPERBANK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Scratch directory for rendered pages and uploads.
    #[arg(long, env = "PAPERBANK_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Attach notes left at the end of a mark scheme to its last marks.
    #[arg(long, env = "PAPERBANK_FLUSH_TRAILING_NOTES")]
    flush_trailing_notes: bool,

    /// Skip OCR of page 1 for paper metadata.
    #[arg(long, env = "PAPERBANK_NO_PAGE1")]
    no_page1: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let runs_pipeline = matches!(cli.command, Command::ParseMs { .. } | Command::ParseQp { .. });
    let show_progress = runs_pipeline && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::ParseMs {
            ref input,
            ref output,
            ref leftover_notes,
            ref ingest,
        } => {
            let config = build_config(ingest, output.clone(), progress).await?;
            let toolkit = Toolkit::from_config(&config);
            let run = parse_mark_scheme(input, &config, &toolkit)
                .await
                .context("Mark scheme parsing failed")?;

            if let (Some(path), Some(notes)) = (leftover_notes, &run.leftover_notes) {
                tokio::fs::write(path, notes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            match output {
                // The artifact writer already put the document there.
                Some(path) if !cli.quiet => eprintln!(
                    "{}  {} marks  {}ms  →  {}",
                    green("✔"),
                    run.stats.marks,
                    run.stats.total_duration_ms,
                    bold(&path.display().to_string())
                ),
                Some(_) => {}
                None => print_json(&run.document)?,
            }
            if !cli.quiet {
                eprintln!(
                    "   {}",
                    dim(&format!(
                        "{} structured / {} notes / {} skipped / {} reused pages",
                        run.stats.structured_pages,
                        run.stats.note_pages,
                        run.stats.skipped_pages,
                        run.stats.reused_pages
                    ))
                );
            }
        }

        Command::ParseQp {
            ref input,
            ref output,
            ref ingest,
        } => {
            let config = build_config(ingest, None, progress).await?;
            let toolkit = Toolkit::from_config(&config);
            let doc = parse_question_paper(input, &config, &toolkit)
                .await
                .context("Question paper parsing failed")?;
            match output {
                Some(path) => {
                    let json = serde_json::to_vec_pretty(&doc).context("Failed to serialise output")?;
                    tokio::fs::write(path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        eprintln!(
                            "{}  {} questions  →  {}",
                            green("✔"),
                            doc.questions.len(),
                            bold(&path.display().to_string())
                        );
                    }
                }
                None => print_json(&doc)?,
            }
        }

        Command::ImportMs { ref json } => {
            let request: ImportMarksRequest = read_json(json).await?;
            let mut store = open_store(&cli.db)?;
            let report = store
                .import_marks(&request.exam_metadata.into_paper(), &request.marks)
                .context("Import failed")?;
            print_json(&report)?;
        }

        Command::ImportQp { ref json } => {
            let request: ImportQuestionsRequest = read_json(json).await?;
            let mut store = open_store(&cli.db)?;
            let report = store
                .import_questions(&request.exam_metadata.into_paper(), &request.questions)
                .context("Import failed")?;
            print_json(&report)?;
        }

        Command::AttachMs { ref json } => {
            let request: AttachMarksRequest = read_json(json).await?;
            let meta = request
                .exam_metadata
                .map(|m| m.into_paper())
                .unwrap_or_default();
            let mut store = open_store(&cli.db)?;
            let report = store
                .attach_mark_scheme(&meta, &request.marks)
                .context("Attaching mark scheme failed")?;
            print_json(&report)?;
        }

        Command::Papers => {
            let store = open_store(&cli.db)?;
            print_json(&store.list_papers().context("Failed to list papers")?)?;
        }

        Command::Serve {
            ref addr,
            ref artifact,
            ref ingest,
        } => {
            let artifact = artifact.clone().unwrap_or_else(|| default_artifact(ingest));
            tracing::info!("Writing mark-scheme artifacts to {}", artifact.display());
            let config = build_config(ingest, Some(artifact), None).await?;
            let store = open_store(&cli.db)?;
            server::start_server(addr, AppState::new(config, store))
                .await
                .with_context(|| format!("Server on {addr} failed"))?;
        }
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(
    args: &IngestArgs,
    artifact: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .dpi(args.dpi)
        .max_retries(args.max_retries)
        .tool_timeout_secs(args.tool_timeout)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .flush_trailing_notes(args.flush_trailing_notes)
        .extract_page1_text(!args.no_page1);

    if let Some(spec) = &args.classifier {
        builder = builder.classifier_command(spec.clone());
    }
    if let Some(path) = &args.page_status {
        builder = builder.page_status_file(path);
    }
    if let Some(spec) = &args.renderer {
        builder = builder.renderer_command(spec.clone());
    }
    if let Some(spec) = &args.recognizer {
        builder = builder.recognizer_command(spec.clone());
    }
    if let Some(spec) = &args.structurer {
        builder = builder.structurer_command(spec.clone());
    }
    if let Some(spec) = &args.question_reader {
        builder = builder.question_reader_command(spec.clone());
    }
    if let Some(model) = &args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = &args.password {
        builder = builder.password(password);
    }
    if let Some(path) = &args.ms_prompt {
        builder = builder.mark_scheme_prompt(read_prompt(path).await?);
    }
    if let Some(path) = &args.qp_prompt {
        builder = builder.question_prompt(read_prompt(path).await?);
    }
    if let Some(dir) = &args.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(path) = artifact {
        builder = builder.artifact_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn default_artifact(args: &IngestArgs) -> PathBuf {
    args.work_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("tmp"))
        .join("output_marks.json")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {}", path.display()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn open_store(path: &Path) -> Result<PaperStore> {
    PaperStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(argv: &[&str]) -> (Option<PathBuf>, IngestArgs) {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Serve { artifact, ingest, .. } => (artifact, ingest),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_artifact_defaults_under_work_dir() {
        let (artifact, ingest) = serve_args(&["paperbank", "serve", "--work-dir", "/srv/scratch"]);
        assert!(artifact.is_none());
        assert_eq!(default_artifact(&ingest), PathBuf::from("/srv/scratch/output_marks.json"));
    }

    #[test]
    fn serve_artifact_flag_is_kept() {
        let (artifact, _) = serve_args(&["paperbank", "serve", "--artifact", "out/ms.json"]);
        assert_eq!(artifact, Some(PathBuf::from("out/ms.json")));
    }
}
