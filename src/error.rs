//! Error types for the paperbank library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`IngestError`] is **fatal for a run**. The document cannot be processed
//!   (bad input file, an external tool exited non-zero or hung, the page
//!   structurer returned something that is not JSON). Returned from the
//!   top-level `parse_*` functions and surfaced as HTTP 500.
//!
//! * [`StoreError`]: persistence failures. Duplicate records are *not*
//!   errors: they are skipped, logged and counted in the import report.
//!
//! * [`LabelError`]: a composite question label could not be split into
//!   label and parent. Callers skip the record and keep going.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors of a document-processing run.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or configure an external renderer command."
    )]
    PdfiumBindingFailed(String),

    // ── External tool errors ──────────────────────────────────────────────
    /// The tool's program could not be started at all.
    #[error("Failed to start {tool} ('{program}'): {source}")]
    ToolSpawnFailed {
        tool: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited with a non-zero status.
    #[error("{tool} failed on '{target}' (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        target: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool did not finish within the configured per-call timeout.
    #[error("{tool} timed out after {secs}s on '{target}'")]
    ToolTimeout {
        tool: &'static str,
        target: String,
        secs: u64,
    },

    /// The tool's output could not be decoded (invalid JSON, wrong shape).
    #[error("{tool} produced malformed output for '{target}': {detail}")]
    MalformedOutput {
        tool: &'static str,
        target: String,
        detail: String,
    },

    /// A required tool has no adapter configured.
    #[error("No {tool} configured.\n{hint}")]
    ToolNotConfigured { tool: &'static str, hint: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API kept failing after all retries.
    #[error("LLM API error on '{target}' after {retries} retries: {message}")]
    LlmApiError {
        target: String,
        retries: u32,
        message: String,
    },

    /// A single VLM call exceeded `api_timeout_secs`.
    #[error("LLM call timed out after {secs}s on '{target}'")]
    LlmTimeout { target: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read a rendered page image.
    #[error("Failed to read page image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any SQLite failure other than a handled uniqueness conflict.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No exam paper matches the supplied identity.
    #[error("Exam paper not found: {0}")]
    PaperNotFound(String),

    /// The record set cannot be imported as given.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Why a composite label such as `(a)(i)` could not be split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("label '{0}' contains no parenthesised token")]
    NoTokens(String),

    #[error("label '{label}' contains {count} parenthesised tokens (at most 2 supported)")]
    TooManyTokens { label: String, count: usize },
}

impl IngestError {
    /// Whether the error was caused by the caller's input rather than by a
    /// tool or the environment. The HTTP layer maps these to 4xx.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IngestError::FileNotFound { .. }
                | IngestError::InvalidInput { .. }
                | IngestError::NotAPdf { .. }
                | IngestError::PasswordRequired { .. }
                | IngestError::WrongPassword { .. }
        )
    }
}
