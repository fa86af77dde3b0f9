//! Post-processing: turn raw structurer / reader replies into records.
//!
//! Language-model replies are JSON most of the time, wrapped in artefacts the
//! prompt forbids often enough to matter:
//!
//! - ` ```json ... ``` ` fences around the payload
//! - Windows-style `\r\n` line endings
//! - zero-width spaces and a BOM in front of the opening brace
//! - LaTeX backslashes that are not valid JSON escapes (`\frac`, `\sqrt`)
//!
//! [`clean_reply`] removes the first three unconditionally. The escape repair
//! is only attempted after a parse failure, because it cannot tell `\n` in
//! prose from `\n` the JSON escape.

use crate::error::IngestError;
use crate::model::{Question, StructuredPage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply the unconditional cleanup rules.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip outer code fences
pub fn clean_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    strip_code_fences(&s)
}

/// Parse a page-structurer reply.
///
/// Accepts `{marks?, explanation?, header?}` or a bare array taken as
/// `marks`. Anything else is fatal for the run.
pub fn parse_structured_page(raw: &str, target: &str) -> Result<StructuredPage, IngestError> {
    let cleaned = clean_reply(raw);
    let malformed = |detail: String| IngestError::MalformedOutput {
        tool: "page structurer",
        target: target.to_string(),
        detail,
    };

    if cleaned.is_empty() {
        return Err(malformed("empty reply".into()));
    }

    let value: Value = serde_json::from_str(&cleaned).map_err(|e| malformed(e.to_string()))?;
    match value {
        Value::Array(_) => {
            let marks = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
            Ok(StructuredPage {
                marks,
                ..Default::default()
            })
        }
        Value::Object(_) => serde_json::from_value(value).map_err(|e| malformed(e.to_string())),
        other => Err(malformed(format!("expected object or array, got {}", json_kind(&other)))),
    }
}

/// Parse a question-reader reply into questions.
///
/// Returns `Err(reason)` for a reply the caller should skip: empty, not an
/// array, or unparseable even after escape repair. LaTeX backslashes doubled
/// for JSON are restored to single ones in `question_text`.
pub fn parse_question_page(raw: &str) -> Result<Vec<Question>, String> {
    let cleaned = clean_reply(raw);
    if cleaned.is_empty() {
        return Err("empty reply".into());
    }
    if !cleaned.starts_with('[') {
        return Err("reply is not a JSON array".into());
    }

    let mut questions: Vec<Question> = match serde_json::from_str(&cleaned) {
        Ok(q) => q,
        Err(first) => {
            let repaired = repair_backslashes(&cleaned);
            serde_json::from_str(&repaired)
                .map_err(|e| format!("{first}; after escape repair: {e}"))?
        }
    };

    for q in &mut questions {
        if q.question_text.contains("\\\\") {
            q.question_text = q.question_text.replace("\\\\", "\\");
        }
    }
    Ok(questions)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
            )
        })
        .collect()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Escape repair ───────────────────────────────────────────────────────────

/// Double every backslash that does not start a valid JSON escape.
fn repair_backslashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next @ ('\\' | '/' | '"' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────
