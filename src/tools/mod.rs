//! Narrow interfaces to the external page tools.
//!
//! Each collaborator is a single-operation trait so runs can be driven by
//! real programs, by the in-process pdfium/VLM adapters, or by test fakes.
//! [`Toolkit::from_config`] picks an adapter per tool:
//!
//! | Tool            | Configured command      | Otherwise                     |
//! |-----------------|-------------------------|-------------------------------|
//! | classifier      | [`external::CommandClassifier`] | [`external::StaticClassifier`] from `page_status_file`, else none |
//! | renderer        | [`external::CommandRenderer`]   | [`crate::pipeline::render::PdfiumRenderer`] |
//! | recognizer      | [`external::CommandRecognizer`] | (always a command; tesseract by default) |
//! | structurer      | [`external::CommandStructurer`] | [`vlm::VlmStructurer`]        |
//! | question reader | [`external::CommandQuestionReader`] | [`vlm::VlmQuestionReader`] |

pub mod external;
pub mod process;
pub mod vlm;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{PageStatusReport, StructuredPage};
use crate::pipeline::render::PdfiumRenderer;
use async_trait::async_trait;
use external::{
    CommandClassifier, CommandQuestionReader, CommandRecognizer, CommandRenderer,
    CommandStructurer, StaticClassifier,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vlm::{VlmQuestionReader, VlmStructurer};

/// Per-page table/header flags for a whole document.
#[async_trait]
pub trait PageClassifier: Send + Sync {
    async fn classify(&self, pdf: &Path) -> Result<PageStatusReport, IngestError>;
}

/// Writes one image per page into `out_dir` and returns them in page order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, IngestError>;
}

/// Plain text of one page image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, IngestError>;
}

/// Structured marks (or free explanation) of one header-bearing page.
#[async_trait]
pub trait PageStructurer: Send + Sync {
    async fn structure(&self, image: &Path) -> Result<StructuredPage, IngestError>;
}

/// Raw reply text for one question-paper page; parsed and normalised by
/// [`crate::questions`].
#[async_trait]
pub trait QuestionReader: Send + Sync {
    async fn read_questions(&self, image: &Path) -> Result<String, IngestError>;
}

/// The set of tools a run uses.
#[derive(Clone)]
pub struct Toolkit {
    pub classifier: Option<Arc<dyn PageClassifier>>,
    pub renderer: Arc<dyn PageRenderer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub structurer: Arc<dyn PageStructurer>,
    pub question_reader: Arc<dyn QuestionReader>,
}

impl Toolkit {
    /// Build the default adapters for `config`. Nothing is spawned or bound
    /// here; failures surface on first use.
    pub fn from_config(config: &IngestConfig) -> Self {
        let t = &config.tools;
        let secs = config.tool_timeout_secs;

        let classifier: Option<Arc<dyn PageClassifier>> = match (&t.classifier, &t.page_status_file) {
            (Some(spec), _) => Some(Arc::new(CommandClassifier::new(spec.clone(), secs))),
            (None, Some(path)) => Some(Arc::new(StaticClassifier::new(path))),
            (None, None) => None,
        };

        let renderer: Arc<dyn PageRenderer> = match &t.renderer {
            Some(spec) => Arc::new(CommandRenderer::new(spec.clone(), secs)),
            None => Arc::new(PdfiumRenderer::from_config(config)),
        };

        let structurer: Arc<dyn PageStructurer> = match &t.structurer {
            Some(spec) => Arc::new(CommandStructurer::new(spec.clone(), secs)),
            None => Arc::new(VlmStructurer::from_config(config)),
        };

        let question_reader: Arc<dyn QuestionReader> = match &t.question_reader {
            Some(spec) => Arc::new(CommandQuestionReader::new(spec.clone(), secs)),
            None => Arc::new(VlmQuestionReader::from_config(config)),
        };

        Self {
            classifier,
            renderer,
            recognizer: Arc::new(CommandRecognizer::new(t.recognizer.clone(), secs)),
            structurer,
            question_reader,
        }
    }

    /// The classifier, or the error explaining how to configure one.
    pub fn require_classifier(&self) -> Result<&Arc<dyn PageClassifier>, IngestError> {
        self.classifier
            .as_ref()
            .ok_or_else(|| IngestError::ToolNotConfigured {
                tool: "page classifier",
                hint: "Set a classifier command (--classifier) or a page status file (--page-status)."
                    .into(),
            })
    }
}
