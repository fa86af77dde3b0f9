//! # paperbank
//!
//! Import, reconcile and serve math exam question papers and mark schemes.
//!
//! A mark-scheme PDF is a table of scoring points (`M1`, `A1*`, `B1ft`, ...)
//! interleaved with free-text guidance pages. This crate drives external page
//! tools over the document, extracts structured marks from the table pages and
//! attributes the guidance text to the marks it talks about. Question papers
//! are read page by page into question records. Both land in a SQLite store
//! and are served over a small HTTP API.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, URL download or upload
//!  ├─ 2. Classify  per-page {has_table, has_header} (external tool)
//!  ├─ 3. Render    page_N.png via pdfium or an external command
//!  ├─ 4. Fold      per page, in order:
//!  │                 header page  → structurer → marks
//!  │                 note page    → OCR → note buffer
//!  │                 seen image   → cached result
//!  ├─ 5. Reconcile note chunks → explanation of matching marks
//!  └─ 6. Output    MarkSchemeDocument (+ JSON artifact)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperbank::{parse_mark_scheme, CommandSpec, IngestConfig, Toolkit};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder()
//!         .classifier_command("python3 detect_tables.py {input}".parse::<CommandSpec>()?)
//!         .artifact_path("output_ms.json")
//!         .build()?;
//!     let toolkit = Toolkit::from_config(&config);
//!
//!     let run = parse_mark_scheme("ms.pdf", &config, &toolkit).await?;
//!     println!("{} marks", run.document.marks.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `paperbank` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The axum HTTP API ([`server`]) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod marks;
pub mod markscheme;
pub mod metadata;
pub mod model;
pub mod notes;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod questions;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, ToolCommands};
pub use error::{IngestError, LabelError, StoreError};
pub use marks::{classify_mark_code, split_label, ParsedLabel};
pub use markscheme::{drive_pages, parse_mark_scheme, parse_mark_scheme_file, MarkSchemeRun};
pub use metadata::infer_paper_metadata;
pub use model::{
    ExamMetadata, Level, Mark, MarkSchemeDocument, MarkType, NoteChunk, PageStatus, PageStatusReport,
    PaperMetadata, Question, QuestionPaperDocument, RunStats, StructuredPage,
};
pub use notes::{reconcile_notes, NoteFormat, StandardNoteFormat};
pub use pipeline::state::{PageOutcome, SkipReason};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use questions::{normalize_questions, parse_question_paper, parse_question_paper_file};
pub use store::{ImportReport, PaperStore, PaperSummary};
pub use tools::process::CommandSpec;
pub use tools::Toolkit;
