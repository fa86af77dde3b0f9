//! Configuration types for document ingestion.
//!
//! Every run is controlled through an [`IngestConfig`], built via its
//! [`IngestConfigBuilder`]. The same config is shared (behind an `Arc`) by all
//! requests of the HTTP server, so nothing in it is mutated during a run.

use crate::error::IngestError;
use crate::notes::{NoteFormat, StandardNoteFormat};
use crate::progress::ProgressCallback;
use crate::tools::process::CommandSpec;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for mark-scheme and question-paper runs.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use paperbank::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .dpi(200)
///     .tool_timeout_secs(30)
///     .flush_trailing_notes(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    ///
    /// Tesseract reads 150 DPI mark-scheme tables reliably; raise it for
    /// papers typeset in small fonts.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Explicit pdfium shared-library path. Falls back to `PDFIUM_LIB_PATH`
    /// and then to the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for VLM calls. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the VLM may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient VLM API failure. Default: 3.
    ///
    /// Process tools are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// System prompt for the mark-scheme structurer. If None, uses
    /// [`crate::prompts::MARK_SCHEME_PROMPT`].
    pub mark_scheme_prompt: Option<String>,

    /// System prompt for the question reader. If None, uses
    /// [`crate::prompts::QUESTION_PAPER_PROMPT`].
    pub question_prompt: Option<String>,

    /// Timeout for every external process invocation, in seconds. Default: 120.
    ///
    /// Expiry kills the child and aborts the run.
    pub tool_timeout_secs: u64,

    /// Per-VLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// External command templates.
    pub tools: ToolCommands,

    /// Parent directory for per-run scratch directories. Default: system temp dir.
    pub work_dir: Option<PathBuf>,

    /// Where the latest mark-scheme result is written. None disables the artifact.
    pub artifact_path: Option<PathBuf>,

    /// Flush notes left at the end of the run into the last batch of marks.
    /// Default: false (they are returned as leftover notes instead).
    pub flush_trailing_notes: bool,

    /// OCR page 1 for `exam_metadata`. Default: true.
    pub extract_page1_text: bool,

    /// How note lines are chunked and matched to marks.
    pub note_format: Arc<dyn NoteFormat>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

/// Command templates for the external page tools.
///
/// A `None` entry selects the in-process adapter (pdfium renderer, VLM
/// structurer and question reader). The classifier has no in-process
/// fallback: configure either `classifier` or `page_status_file`.
#[derive(Debug, Clone)]
pub struct ToolCommands {
    /// Prints `{"pages": [...]}` (or a bare array) for `{input}`.
    pub classifier: Option<CommandSpec>,
    /// Pre-computed classifier output, read instead of running a command.
    pub page_status_file: Option<PathBuf>,
    /// Renders `{input}` into `page_<n>.png` files under `{output}`.
    pub renderer: Option<CommandSpec>,
    /// Prints the plain text of image `{input}`.
    pub recognizer: CommandSpec,
    /// Prints the structured JSON for image `{input}`.
    pub structurer: Option<CommandSpec>,
    /// Prints a JSON array of questions for image `{input}`.
    pub question_reader: Option<CommandSpec>,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            classifier: None,
            page_status_file: None,
            renderer: None,
            recognizer: CommandSpec::new("tesseract", ["{input}", "stdout"]),
            structurer: None,
            question_reader: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            pdfium_lib_path: None,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            mark_scheme_prompt: None,
            question_prompt: None,
            tool_timeout_secs: 120,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            tools: ToolCommands::default(),
            work_dir: None,
            artifact_path: None,
            flush_trailing_notes: false,
            extract_page1_text: true,
            note_format: Arc::new(StandardNoteFormat),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tools", &self.tools)
            .field("artifact_path", &self.artifact_path)
            .field("flush_trailing_notes", &self.flush_trailing_notes)
            .field("extract_page1_text", &self.extract_page1_text)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn mark_scheme_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.mark_scheme_prompt = Some(prompt.into());
        self
    }

    pub fn question_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.question_prompt = Some(prompt.into());
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn tools(mut self, tools: ToolCommands) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn classifier_command(mut self, spec: CommandSpec) -> Self {
        self.config.tools.classifier = Some(spec);
        self
    }

    pub fn page_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.page_status_file = Some(path.into());
        self
    }

    pub fn renderer_command(mut self, spec: CommandSpec) -> Self {
        self.config.tools.renderer = Some(spec);
        self
    }

    pub fn recognizer_command(mut self, spec: CommandSpec) -> Self {
        self.config.tools.recognizer = spec;
        self
    }

    pub fn structurer_command(mut self, spec: CommandSpec) -> Self {
        self.config.tools.structurer = Some(spec);
        self
    }

    pub fn question_reader_command(mut self, spec: CommandSpec) -> Self {
        self.config.tools.question_reader = Some(spec);
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.artifact_path = Some(path.into());
        self
    }

    pub fn flush_trailing_notes(mut self, v: bool) -> Self {
        self.config.flush_trailing_notes = v;
        self
    }

    pub fn extract_page1_text(mut self, v: bool) -> Self {
        self.config.extract_page1_text = v;
        self
    }

    pub fn note_format(mut self, format: Arc<dyn NoteFormat>) -> Self {
        self.config.note_format = format;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(IngestError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.tool_timeout_secs == 0 || c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.tools.recognizer.program.is_empty() {
            return Err(IngestError::InvalidConfig(
                "Recognizer command must name a program".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IngestConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.tools.recognizer.program, "tesseract");
        assert!(!config.flush_trailing_notes);
        assert!(config.extract_page1_text);
    }

    #[test]
    fn dpi_is_clamped() {
        let config = IngestConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(config.dpi, 400);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = IngestConfig::builder().tool_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }

    #[test]
    fn empty_recognizer_is_rejected() {
        let err = IngestConfig::builder()
            .recognizer_command(CommandSpec::new("", Vec::<String>::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)));
    }
}
