//! Request and response bodies of the HTTP API.

use crate::model::{Mark, PaperMetadata, Question};
use serde::{Deserialize, Serialize};

/// Paper identity as sent by clients.
///
/// Accepts either the flat `PaperMetadata` fields or a parsed mark scheme's
/// `exam_metadata` (`{page1_text, paper: {...}}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMetadata {
    #[serde(flatten)]
    pub flat: PaperMetadata,
    #[serde(default)]
    pub paper: Option<PaperMetadata>,
}

impl IncomingMetadata {
    pub fn into_paper(self) -> PaperMetadata {
        self.paper.unwrap_or(self.flat)
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportMarksRequest {
    pub exam_metadata: IncomingMetadata,
    pub marks: Vec<Mark>,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuestionsRequest {
    pub exam_metadata: IncomingMetadata,
    pub questions: Vec<Question>,
}

/// Body of `/api/upload-mark-scheme`. Metadata may be absent, in which case
/// the paper lookup fails with 400.
#[derive(Debug, Deserialize)]
pub struct AttachMarksRequest {
    #[serde(default)]
    pub exam_metadata: Option<IncomingMetadata>,
    pub marks: Vec<Mark>,
}

#[derive(Debug, Serialize)]
pub struct ImportMarksResponse {
    pub exam_paper_id: i64,
    pub inserted: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportQuestionsResponse {
    pub exam_paper_id: i64,
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct AttachMarksResponse {
    pub success: bool,
    pub inserted: usize,
    pub skipped: usize,
    pub exam_paper_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkSchemeResponse {
    pub marks: Vec<Mark>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
