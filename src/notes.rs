//! Note-to-mark reconciliation.
//!
//! Pages of worked-solution prose that follow a mark-scheme table rarely
//! restate full structured records. The structurer only emits clean records
//! for table pages, so the OCR text of the prose pages is collected into a
//! note buffer and, when the next batch of marks arrives, attributed to the
//! *previous* batch:
//!
//! ```text
//! buffer ──▶ lines ──▶ chunks ──▶ key match ──▶ mark.explanation
//!                         │                          ▲
//!                         └── unmatched ─────────────┘ (last mark, marked
//!                                                       "[Note continuation]")
//! ```
//!
//! How a line is recognised as the start of a scoring point, and how a match
//! key is derived, is a [`NoteFormat`] strategy. [`StandardNoteFormat`]
//! targets the tabular A-level mark schemes this crate was built for.

use crate::model::{Mark, NoteChunk};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Marker line prepended to chunks attributed by the fallback rule.
pub const CONTINUATION_MARKER: &str = "[Note continuation]";

/// Label and mark code found at the start of a note line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHead {
    /// Explicit label prefix, e.g. `(a)` or `(b)(ii)`.
    pub label: Option<String>,
    /// Mark code as written, e.g. `M1`, `A1*`, `B1ft`.
    pub mark_code: String,
}

/// Line classification and key derivation for one exam board's formatting.
pub trait NoteFormat: Send + Sync {
    /// If the whole line is a bare label (`(b)`), return it.
    fn label_line(&self, line: &str) -> Option<String>;

    /// If the line opens a new scoring point, return its head.
    fn chunk_head(&self, line: &str) -> Option<ChunkHead>;

    /// Key under which a mark and a chunk are considered the same point.
    fn match_key(&self, label: &str, mark_code: &str) -> String;
}

/// Default format: parenthesised labels, `M`/`dM`/`A`/`B` codes, ASCII or
/// full-width colon.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNoteFormat;

static RE_MARK_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?P<label>(?:\([a-z0-9]{1,5}\)\s*){1,2})?\s*(?P<code>dm\d?|m\d?|a\d\*?(?:ft)?|b\d(?:ft)?)\s*[:：]",
    )
    .unwrap()
});

static RE_LABEL_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:\([a-z0-9]{1,5}\)\s*){1,2}$").unwrap());

impl NoteFormat for StandardNoteFormat {
    fn label_line(&self, line: &str) -> Option<String> {
        RE_LABEL_ONLY
            .is_match(line)
            .then(|| line.split_whitespace().collect::<String>())
    }

    fn chunk_head(&self, line: &str) -> Option<ChunkHead> {
        let caps = RE_MARK_START.captures(line)?;
        Some(ChunkHead {
            label: caps
                .name("label")
                .map(|m| m.as_str().split_whitespace().collect::<String>()),
            mark_code: caps["code"].to_string(),
        })
    }

    fn match_key(&self, label: &str, mark_code: &str) -> String {
        format!("{label}{mark_code}")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '(' && *c != ')')
            .flat_map(char::to_lowercase)
            .collect()
    }
}

/// Group buffer lines into chunks, one per scoring point.
///
/// Label-only lines set the label inferred for following chunks and are not
/// chunk text. The first remaining line always opens a chunk.
pub fn chunk_notes(buffer: &str, format: &dyn NoteFormat) -> Vec<NoteChunk> {
    let mut chunks: Vec<NoteChunk> = Vec::new();
    let mut current_label: Option<String> = None;

    for line in buffer.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(label) = format.label_line(line) {
            current_label = Some(label);
            continue;
        }
        match chunks.last_mut() {
            Some(open) if format.chunk_head(line).is_none() => {
                open.text.push(' ');
                open.text.push_str(line);
            }
            _ => chunks.push(NoteChunk {
                text: line.to_string(),
                inferred_label: current_label.clone(),
            }),
        }
    }

    chunks
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub chunks: usize,
    pub matched: usize,
    /// Chunks appended to the last mark by the fallback rule.
    pub continued: usize,
}

/// Attribute the note buffer to `marks` (the previous batch).
///
/// Every chunk goes to at most one mark; a mark may receive several chunks.
/// Chunks that match nothing are appended to the last mark behind
/// [`CONTINUATION_MARKER`]. `marks` must not be empty.
pub fn reconcile_notes(buffer: &str, marks: &mut [Mark], format: &dyn NoteFormat) -> ReconcileReport {
    let chunks = chunk_notes(buffer, format);
    let mut used = vec![false; chunks.len()];
    let mut report = ReconcileReport {
        chunks: chunks.len(),
        ..Default::default()
    };

    let chunk_keys: Vec<Option<String>> = chunks
        .iter()
        .map(|chunk| {
            let head = format.chunk_head(&chunk.text)?;
            let label = head
                .label
                .as_deref()
                .or(chunk.inferred_label.as_deref())
                .unwrap_or("");
            Some(format.match_key(label, &head.mark_code))
        })
        .collect();

    for mark in marks.iter_mut() {
        let mark_key = format.match_key(&mark.label, &mark.mark_code);
        for (i, chunk) in chunks.iter().enumerate() {
            if used[i] || chunk_keys[i].as_deref() != Some(mark_key.as_str()) {
                continue;
            }
            append_line(&mut mark.explanation, &chunk.text);
            used[i] = true;
            report.matched += 1;
            debug!(
                label = %mark.label,
                code = %mark.mark_code,
                "explanation matched"
            );
        }
    }

    let extra: Vec<&str> = chunks
        .iter()
        .zip(&used)
        .filter(|(_, used)| !**used)
        .map(|(chunk, _)| chunk.text.as_str())
        .collect();

    if !extra.is_empty() {
        if let Some(last) = marks.last_mut() {
            report.continued = extra.len();
            append_line(
                &mut last.explanation,
                &format!("{CONTINUATION_MARKER}\n{}", extra.join("\n")),
            );
        }
    }

    report
}

/// Append `text`, newline-separated when `target` already has content.
pub(crate) fn append_line(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(label: &str, code: &str) -> Mark {
        Mark {
            question_number: "1".into(),
            label: label.into(),
            mark_code: code.into(),
            ..Default::default()
        }
    }

    #[test]
    fn chunks_group_continuation_lines() {
        let chunks = chunk_notes(
            "(a) M1: reasoning X\n  more reasoning  \n\n(b) A1: reasoning Y",
            &StandardNoteFormat,
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "(a) M1: reasoning X more reasoning");
        assert_eq!(chunks[1].text, "(b) A1: reasoning Y");
    }

    #[test]
    fn first_line_opens_a_chunk_even_without_a_code() {
        let chunks = chunk_notes("General marking guidance\nsee below", &StandardNoteFormat);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "General marking guidance see below");
    }

    #[test]
    fn chunk_heads_accept_every_code_form() {
        let f = StandardNoteFormat;
        for line in ["M1: x", "dM1: x", "dM: x", "A1*: x", "B1ft: x", "A1ft: x", "(a)(ii) M1： x", "m1 : x"] {
            assert!(f.chunk_head(line).is_some(), "{line}");
        }
        for line in ["Note that M1 is", "X1: y", "(a) reasoning"] {
            assert!(f.chunk_head(line).is_none(), "{line}");
        }
        let head = f.chunk_head("(a)(ii) dM1: x").unwrap();
        assert_eq!(head.label.as_deref(), Some("(a)(ii)"));
        assert_eq!(head.mark_code, "dM1");
    }

    #[test]
    fn match_key_normalises_case_space_and_parens() {
        let f = StandardNoteFormat;
        assert_eq!(f.match_key("(a) (i)", "M1"), "aim1");
        assert_eq!(f.match_key("(A)", "dM1"), f.match_key("(a)", "dm1"));
    }

    #[test]
    fn matches_notes_to_marks_by_label_and_code() {
        let mut marks = vec![mark("(a)", "M1"), mark("(b)", "A1")];
        let report = reconcile_notes(
            "(a) M1: reasoning X\nmore reasoning\n(b) A1: reasoning Y",
            &mut marks,
            &StandardNoteFormat,
        );
        assert_eq!(marks[0].explanation, "(a) M1: reasoning X more reasoning");
        assert_eq!(marks[1].explanation, "(b) A1: reasoning Y");
        assert_eq!(report.matched, 2);
        assert_eq!(report.continued, 0);
    }

    #[test]
    fn label_only_lines_supply_the_label() {
        let mut marks = vec![mark("(a)", "M1"), mark("(b)", "M1")];
        reconcile_notes("(b)\nM1: uses the chain rule", &mut marks, &StandardNoteFormat);
        assert_eq!(marks[0].explanation, "");
        assert_eq!(marks[1].explanation, "M1: uses the chain rule");
    }

    #[test]
    fn one_mark_can_take_several_chunks() {
        let mut marks = vec![mark("(a)", "M1")];
        reconcile_notes("(a) M1: first\n(a) M1: second", &mut marks, &StandardNoteFormat);
        assert_eq!(marks[0].explanation, "(a) M1: first\n(a) M1: second");
    }

    #[test]
    fn unmatched_chunks_continue_the_last_mark() {
        let mut marks = vec![mark("(a)", "M1"), mark("(b)", "A1")];
        marks[1].explanation = "existing".into();
        let report = reconcile_notes(
            "Preamble text\n(c) B1: stray\n(a) M1: found",
            &mut marks,
            &StandardNoteFormat,
        );
        assert_eq!(marks[0].explanation, "(a) M1: found");
        assert_eq!(
            marks[1].explanation,
            "existing\n[Note continuation]\nPreamble text\n(c) B1: stray"
        );
        assert_eq!(report.continued, 2);
    }

    #[test]
    fn empty_buffer_changes_nothing() {
        let mut marks = vec![mark("(a)", "M1")];
        let report = reconcile_notes("  \n\n", &mut marks, &StandardNoteFormat);
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(marks[0].explanation, "");
    }
}
