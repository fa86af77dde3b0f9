//! Adapters that drive external programs, plus the file-backed classifier.

use super::process::{run_tool, CommandSpec};
use super::{PageClassifier, PageRenderer, PageStructurer, QuestionReader, TextRecognizer};
use crate::error::IngestError;
use crate::model::{PageStatus, PageStatusReport, StructuredPage};
use crate::pipeline::postprocess::{clean_reply, parse_structured_page};
use crate::pipeline::render::list_page_images;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

const CLASSIFIER: &str = "page classifier";

/// Decode classifier output: `{"pages": [...]}` or a bare array.
pub fn parse_status_report(raw: &str, target: &str) -> Result<PageStatusReport, IngestError> {
    let malformed = |detail: String| IngestError::MalformedOutput {
        tool: CLASSIFIER,
        target: target.to_string(),
        detail,
    };
    let value: Value = serde_json::from_str(&clean_reply(raw)).map_err(|e| malformed(e.to_string()))?;
    if value.is_array() {
        let pages: Vec<PageStatus> =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
        return Ok(PageStatusReport { pages });
    }
    if value.get("pages").is_some() {
        return serde_json::from_value(value).map_err(|e| malformed(e.to_string()));
    }
    Err(malformed("expected {\"pages\": [...]} or an array".into()))
}

/// Runs a classifier command and reads its stdout.
pub struct CommandClassifier {
    spec: CommandSpec,
    timeout_secs: u64,
}

impl CommandClassifier {
    pub fn new(spec: CommandSpec, timeout_secs: u64) -> Self {
        Self { spec, timeout_secs }
    }
}

#[async_trait]
impl PageClassifier for CommandClassifier {
    async fn classify(&self, pdf: &Path) -> Result<PageStatusReport, IngestError> {
        let stdout = run_tool(CLASSIFIER, &self.spec, pdf, None, self.timeout_secs).await?;
        parse_status_report(&stdout, &pdf.display().to_string())
    }
}

/// Reads a pre-computed classifier report from disk, whatever the document.
pub struct StaticClassifier {
    path: PathBuf,
}

impl StaticClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PageClassifier for StaticClassifier {
    async fn classify(&self, _pdf: &Path) -> Result<PageStatusReport, IngestError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|_| IngestError::FileNotFound {
                path: self.path.clone(),
            })?;
        parse_status_report(&raw, &self.path.display().to_string())
    }
}

/// Runs a renderer command that writes page images into `{output}`.
pub struct CommandRenderer {
    spec: CommandSpec,
    timeout_secs: u64,
}

impl CommandRenderer {
    pub fn new(spec: CommandSpec, timeout_secs: u64) -> Self {
        Self { spec, timeout_secs }
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        run_tool("page renderer", &self.spec, pdf, Some(out_dir), self.timeout_secs).await?;
        let images = list_page_images(out_dir)?;
        if images.is_empty() {
            return Err(IngestError::MalformedOutput {
                tool: "page renderer",
                target: pdf.display().to_string(),
                detail: format!("no page images written to {}", out_dir.display()),
            });
        }
        Ok(images)
    }
}

/// Runs an OCR command (tesseract by default) and returns its stdout.
pub struct CommandRecognizer {
    spec: CommandSpec,
    timeout_secs: u64,
}

impl CommandRecognizer {
    pub fn new(spec: CommandSpec, timeout_secs: u64) -> Self {
        Self { spec, timeout_secs }
    }
}

#[async_trait]
impl TextRecognizer for CommandRecognizer {
    async fn recognize(&self, image: &Path) -> Result<String, IngestError> {
        run_tool("text recognizer", &self.spec, image, None, self.timeout_secs).await
    }
}

/// Runs a structurer command printing the page JSON.
pub struct CommandStructurer {
    spec: CommandSpec,
    timeout_secs: u64,
}

impl CommandStructurer {
    pub fn new(spec: CommandSpec, timeout_secs: u64) -> Self {
        Self { spec, timeout_secs }
    }
}

#[async_trait]
impl PageStructurer for CommandStructurer {
    async fn structure(&self, image: &Path) -> Result<StructuredPage, IngestError> {
        let stdout = run_tool("page structurer", &self.spec, image, None, self.timeout_secs).await?;
        parse_structured_page(&stdout, &image.display().to_string())
    }
}

/// Runs a question-reader command printing a JSON array.
pub struct CommandQuestionReader {
    spec: CommandSpec,
    timeout_secs: u64,
}

impl CommandQuestionReader {
    pub fn new(spec: CommandSpec, timeout_secs: u64) -> Self {
        Self { spec, timeout_secs }
    }
}

#[async_trait]
impl QuestionReader for CommandQuestionReader {
    async fn read_questions(&self, image: &Path) -> Result<String, IngestError> {
        run_tool("question reader", &self.spec, image, None, self.timeout_secs).await
    }
}
