//! Record types shared by the pipeline, the store and the HTTP layer.
//!
//! Field names follow the JSON emitted by the page structurer and accepted by
//! the import endpoints (`snake_case`, `mark_code`, `ao_code`, ...), so the
//! same types round-trip through every surface without adapter structs.

use serde::{Deserialize, Deserializer, Serialize};

/// Per-page classification produced once per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStatus {
    /// 1-based page number.
    pub page: u32,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_header: bool,
}

/// The classifier's document-level report, `{"pages": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageStatusReport {
    #[serde(default)]
    pub pages: Vec<PageStatus>,
}

impl PageStatusReport {
    /// Status entry for a 1-based page number, if the classifier emitted one.
    pub fn get(&self, page: u32) -> Option<&PageStatus> {
        self.pages.iter().find(|p| p.page == page)
    }
}

/// Nesting depth of a question or mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Whole question, no label.
    #[default]
    Main,
    /// `(a)`, `(b)`, ...
    Sub,
    /// `(a)(i)`, `(b)(ii)`, ...
    Subsub,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Main => "main",
            Level::Sub => "sub",
            Level::Subsub => "subsub",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(Level::Main),
            "sub" => Some(Level::Sub),
            "subsub" => Some(Level::Subsub),
            _ => None,
        }
    }
}

/// Category of a scoring point, derived from its mark code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkType {
    /// Dependent method mark.
    #[serde(rename = "dM")]
    DependentMethod,
    #[serde(rename = "M")]
    Method,
    #[serde(rename = "A")]
    Accuracy,
    #[serde(rename = "B")]
    Independent,
}

impl MarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkType::DependentMethod => "dM",
            MarkType::Method => "M",
            MarkType::Accuracy => "A",
            MarkType::Independent => "B",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dM" => Some(MarkType::DependentMethod),
            "M" => Some(MarkType::Method),
            "A" => Some(MarkType::Accuracy),
            "B" => Some(MarkType::Independent),
            _ => None,
        }
    }
}

/// One scoring point of a mark scheme.
///
/// `explanation` is always present in serialised output; a structurer reply
/// that omits it deserialises to the empty string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mark {
    #[serde(default, deserialize_with = "string_or_number")]
    pub question_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(default)]
    pub parent_label: Option<String>,
    #[serde(default)]
    pub level: Level,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mark_code: String,
    #[serde(default)]
    pub mark_type: Option<MarkType>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mark_content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub explanation: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ao_code: String,
}

/// What the page structurer returns for one header-bearing page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredPage {
    #[serde(default)]
    pub marks: Vec<Mark>,
    #[serde(default)]
    pub explanation: Option<String>,
    /// Legacy header flag emitted by older structurer scripts. Ignored: the
    /// classifier's `has_header` is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
}

/// One contiguous run of note lines, pending attribution to a mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChunk {
    pub text: String,
    /// Label from the most recent label-only line before the chunk opened.
    pub inferred_label: Option<String>,
}

/// Identity of an exam paper. Every field is optional because it is
/// inferred from OCR text or supplied by an uploader.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_paper_id: Option<i64>,
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub paper_code: Option<String>,
    #[serde(default)]
    pub paper_name: Option<String>,
    #[serde(default)]
    pub exam_session: Option<String>,
}

impl PaperMetadata {
    /// True when nothing at all could be inferred.
    pub fn is_empty(&self) -> bool {
        self.board.is_none()
            && self.qualification.is_none()
            && self.subject.is_none()
            && self.paper_code.is_none()
            && self.paper_name.is_none()
            && self.exam_session.is_none()
    }
}

/// Metadata attached to a parsed mark scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExamMetadata {
    #[serde(default)]
    pub page1_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper: Option<PaperMetadata>,
}

/// Result body of a mark-scheme parse; also the debug artifact on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkSchemeDocument {
    pub marks: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_metadata: Option<ExamMetadata>,
}

/// One question, sub-question or structural heading of a question paper.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "string_or_number")]
    pub question_number: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_marks")]
    pub marks: Option<u32>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub question_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub latex_blocks: Vec<String>,
    #[serde(default)]
    pub parent_label: Option<String>,
}

/// Result body of a question-paper parse.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionPaperDocument {
    pub exam_metadata: PaperMetadata,
    pub questions: Vec<Question>,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    pub structured_pages: usize,
    pub note_pages: usize,
    pub skipped_pages: usize,
    pub reused_pages: usize,
    pub structurer_calls: usize,
    pub recognizer_calls: usize,
    pub marks: usize,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

// ── Lenient deserialisers ────────────────────────────────────────────────
//
// Structurer and reader replies come from a language model; `null` for a
// string field and numbers where strings are expected are routine.

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// `3`, `"3"`, `"(3)"` → `Some(3)`; anything else → `None`.
fn lenient_marks<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim_matches(|c: char| c == '(' || c == ')' || c == ' ').parse().ok(),
        _ => None,
    })
}
