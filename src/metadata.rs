//! Exam-paper identity from first-page text.
//!
//! Cover pages are OCR'd, so the heuristics look for a handful of stable
//! tokens rather than parsing layout. Only the first 40 non-empty lines are
//! examined; a cover page never needs more.

use crate::model::PaperMetadata;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_PAPER_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b9MA0\s*/?\s*(\d{2})\b").unwrap());
static RE_PAPER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bPaper\s+(\d+)\b").unwrap());
static RE_SESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(January|June|October|November)\s+(\d{4})\b").unwrap());

const SCAN_LINES: usize = 40;

/// Infer whatever paper identity the text reveals.
pub fn infer_paper_metadata(text: &str) -> PaperMetadata {
    let head: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(SCAN_LINES)
        .collect();
    let joined = head.join("\n");

    let mut meta = PaperMetadata::default();

    if joined.contains("Edexcel") || joined.contains("Pearson") {
        meta.board = Some("Edexcel".into());
    }
    if joined.contains("GCE") || joined.contains("A Level") {
        meta.qualification = Some("A Level".into());
    }
    if joined.contains("Mathematics") {
        meta.subject = Some("Mathematics".into());
    }
    if let Some(caps) = RE_PAPER_CODE.captures(&joined) {
        meta.paper_code = Some(format!("9MA0/{}", &caps[1]));
    }
    if joined.contains("Pure Mathematics") {
        let number = RE_PAPER_NUMBER
            .captures(&joined)
            .map(|c| c[1].to_string())
            .or_else(|| meta.paper_code.as_deref().map(|c| c[5..].trim_start_matches('0').to_string()));
        meta.paper_name = Some(match number {
            Some(n) if !n.is_empty() => format!("Pure Mathematics Paper {n}"),
            _ => "Pure Mathematics".to_string(),
        });
    }
    if let Some(caps) = RE_SESSION.captures(&joined) {
        meta.exam_session = Some(format!("{} {}", &caps[1], &caps[2]));
    }

    meta
}
