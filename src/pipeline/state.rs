//! The mark-scheme run as an explicit fold over pages.
//!
//! ```text
//!            ┌──────────── plan(status, hash) ────────────┐
//!            ▼                                             │
//!   Skip │ Reuse │ RecognizeNotes │ Structure        RunState
//!            │  driver performs the external call          ▲
//!            └──────────── apply(hash, event) ────────────┘
//! ```
//!
//! [`RunState::plan`] decides what a page needs without doing I/O;
//! [`RunState::apply`] folds the result back. The driver in
//! [`crate::markscheme`] is the only code between the two, so every decision
//! rule here is testable without tools.

use crate::marks::classify_mark_code;
use crate::model::{Mark, PageStatus, RunStats, StructuredPage};
use crate::notes::{append_line, reconcile_notes, NoteFormat};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Why a page produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The classifier emitted no entry for the page.
    NoStatus,
    /// A non-header page before the first header-bearing page (cover,
    /// instructions, general marking guidance).
    BeforeFirstHeader,
}

/// What the driver must do for a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Skip(SkipReason),
    /// The same image bytes were already processed; fold the cached result.
    Reuse(Option<StructuredPage>),
    /// OCR the page into the note buffer.
    RecognizeNotes,
    /// Send the page to the structurer.
    Structure,
}

/// Result of performing a [`PageAction`].
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Skipped(SkipReason),
    Reused(Option<StructuredPage>),
    Notes(String),
    Structured(StructuredPage),
}

/// What a page contributed, reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Skipped(SkipReason),
    Reused,
    Notes,
    Structured { marks: usize },
    /// Question-paper page read successfully.
    Questions { count: usize },
    /// Question-paper page whose reply could not be used.
    Rejected,
}

/// Accumulated state of one mark-scheme run.
pub struct RunState {
    seen_first_header: bool,
    cache: HashMap<String, Option<StructuredPage>>,
    marks: Vec<Mark>,
    last_batch: Option<Range<usize>>,
    note_buffer: String,
    leftover_notes: String,
    stats: RunStats,
    note_format: Arc<dyn NoteFormat>,
}

/// Final value of the fold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldResult {
    pub marks: Vec<Mark>,
    /// Note text that was never attributed to a mark.
    pub leftover_notes: Option<String>,
    pub stats: RunStats,
}

impl RunState {
    pub fn new(note_format: Arc<dyn NoteFormat>) -> Self {
        Self {
            seen_first_header: false,
            cache: HashMap::new(),
            marks: Vec::new(),
            last_batch: None,
            note_buffer: String::new(),
            leftover_notes: String::new(),
            stats: RunStats::default(),
            note_format,
        }
    }

    /// Decide what the page needs.
    ///
    /// Marks the first header as seen as soon as a header page is planned,
    /// so a structurer failure cannot leave the flag behind.
    pub fn plan(&mut self, status: Option<&PageStatus>, hash: &str) -> PageAction {
        let Some(status) = status else {
            return PageAction::Skip(SkipReason::NoStatus);
        };
        if let Some(cached) = self.cache.get(hash) {
            return PageAction::Reuse(cached.clone());
        }
        if !status.has_header {
            return if self.seen_first_header {
                PageAction::RecognizeNotes
            } else {
                PageAction::Skip(SkipReason::BeforeFirstHeader)
            };
        }
        self.seen_first_header = true;
        PageAction::Structure
    }

    /// Fold the page's result into the run.
    pub fn apply(&mut self, hash: &str, event: PageEvent) -> PageOutcome {
        match event {
            PageEvent::Skipped(reason) => {
                if reason != SkipReason::NoStatus {
                    self.cache.insert(hash.to_string(), None);
                }
                self.stats.skipped_pages += 1;
                PageOutcome::Skipped(reason)
            }
            PageEvent::Notes(text) => {
                self.cache.insert(hash.to_string(), None);
                self.stats.recognizer_calls += 1;
                self.stats.note_pages += 1;
                let text = text.trim();
                if !text.is_empty() {
                    append_line(&mut self.note_buffer, text);
                }
                PageOutcome::Notes
            }
            PageEvent::Structured(page) => {
                self.cache.insert(hash.to_string(), Some(page.clone()));
                self.stats.structurer_calls += 1;
                self.stats.structured_pages += 1;
                let marks = self.integrate(page);
                PageOutcome::Structured { marks }
            }
            PageEvent::Reused(cached) => {
                self.stats.reused_pages += 1;
                if let Some(page) = cached {
                    self.integrate(page);
                }
                PageOutcome::Reused
            }
        }
    }

    /// Marks emitted so far.
    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    /// Pending note text not yet attributed.
    pub fn note_buffer(&self) -> &str {
        &self.note_buffer
    }

    /// Close the run.
    ///
    /// With `flush_trailing` the remaining buffer goes to the last batch;
    /// otherwise it is returned as leftover notes.
    pub fn finish(mut self, flush_trailing: bool) -> FoldResult {
        if flush_trailing {
            self.flush_notes();
        } else {
            let buffer = std::mem::take(&mut self.note_buffer);
            if !buffer.trim().is_empty() {
                append_line(&mut self.leftover_notes, &buffer);
            }
        }
        self.stats.marks = self.marks.len();

        FoldResult {
            marks: self.marks,
            leftover_notes: (!self.leftover_notes.is_empty()).then_some(self.leftover_notes),
            stats: self.stats,
        }
    }

    fn integrate(&mut self, page: StructuredPage) -> usize {
        if page.marks.is_empty() {
            if let Some(explanation) = page.explanation.as_deref().map(str::trim) {
                if !explanation.is_empty() {
                    append_line(&mut self.note_buffer, explanation);
                }
            }
            return 0;
        }

        self.flush_notes();

        let start = self.marks.len();
        for mut mark in page.marks {
            mark.mark_type = classify_mark_code(&mark.mark_code);
            self.marks.push(mark);
        }
        self.last_batch = Some(start..self.marks.len());
        self.marks.len() - start
    }

    fn flush_notes(&mut self) {
        let buffer = std::mem::take(&mut self.note_buffer);
        if buffer.trim().is_empty() {
            return;
        }
        match self.last_batch.clone() {
            Some(range) => {
                let report = reconcile_notes(&buffer, &mut self.marks[range], self.note_format.as_ref());
                debug!(
                    chunks = report.chunks,
                    matched = report.matched,
                    continued = report.continued,
                    "notes flushed"
                );
            }
            None => {
                debug!("no previous batch; keeping notes as leftover");
                append_line(&mut self.leftover_notes, &buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarkType;
    use crate::notes::{StandardNoteFormat, CONTINUATION_MARKER};

    fn state() -> RunState {
        RunState::new(Arc::new(StandardNoteFormat))
    }

    fn status(page: u32, has_header: bool) -> PageStatus {
        PageStatus {
            page,
            has_table: has_header,
            has_header,
        }
    }

    fn mark(label: &str, code: &str) -> Mark {
        Mark {
            question_number: "1".into(),
            label: label.into(),
            mark_code: code.into(),
            ..Default::default()
        }
    }

    fn page(marks: Vec<Mark>) -> StructuredPage {
        StructuredPage {
            marks,
            ..Default::default()
        }
    }

    #[test]
    fn missing_status_skips_without_caching() {
        let mut s = state();
        assert_eq!(s.plan(None, "h"), PageAction::Skip(SkipReason::NoStatus));
        s.apply("h", PageEvent::Skipped(SkipReason::NoStatus));
        // Same bytes with a status entry are not short-circuited.
        assert_eq!(s.plan(Some(&status(2, true)), "h"), PageAction::Structure);
    }

    #[test]
    fn non_header_before_first_header_is_skipped() {
        let mut s = state();
        assert_eq!(
            s.plan(Some(&status(1, false)), "a"),
            PageAction::Skip(SkipReason::BeforeFirstHeader)
        );
        assert_eq!(s.plan(Some(&status(2, true)), "b"), PageAction::Structure);
        assert_eq!(s.plan(Some(&status(3, false)), "c"), PageAction::RecognizeNotes);
    }

    #[test]
    fn table_without_header_is_not_structured() {
        let mut s = state();
        let st = PageStatus {
            page: 1,
            has_table: true,
            has_header: false,
        };
        assert_eq!(s.plan(Some(&st), "a"), PageAction::Skip(SkipReason::BeforeFirstHeader));

        s.plan(Some(&status(2, true)), "b");
        s.apply("b", PageEvent::Structured(page(vec![mark("(a)", "M1")])));
        let st = PageStatus {
            page: 3,
            has_table: true,
            has_header: false,
        };
        assert_eq!(s.plan(Some(&st), "c"), PageAction::RecognizeNotes);
    }

    #[test]
    fn repeated_hash_reuses_its_own_result() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "x");
        s.apply("x", PageEvent::Structured(page(vec![mark("(a)", "M1")])));
        s.plan(Some(&status(2, false)), "y");
        s.apply("y", PageEvent::Notes("note".into()));

        assert_eq!(s.plan(Some(&status(3, false)), "y"), PageAction::Reuse(None));
        match s.plan(Some(&status(4, true)), "x") {
            PageAction::Reuse(Some(p)) => assert_eq!(p.marks[0].mark_code, "M1"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn marks_get_derived_types() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "x");
        let outcome = s.apply(
            "x",
            PageEvent::Structured(page(vec![mark("(a)", "dM1"), mark("(a)", "X9")])),
        );
        assert_eq!(outcome, PageOutcome::Structured { marks: 2 });
        assert_eq!(s.marks()[0].mark_type, Some(MarkType::DependentMethod));
        assert_eq!(s.marks()[1].mark_type, None);
    }

    #[test]
    fn notes_are_newline_joined_and_flushed_into_previous_batch() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "p1");
        s.apply("p1", PageEvent::Structured(page(vec![mark("(a)", "M1"), mark("(b)", "A1")])));
        s.plan(Some(&status(2, false)), "p2");
        s.apply("p2", PageEvent::Notes("(a) M1: reasoning X".into()));
        s.plan(Some(&status(3, false)), "p3");
        s.apply("p3", PageEvent::Notes("  (b) A1: reasoning Y\n".into()));
        assert_eq!(s.note_buffer(), "(a) M1: reasoning X\n(b) A1: reasoning Y");

        s.plan(Some(&status(4, true)), "p4");
        s.apply("p4", PageEvent::Structured(page(vec![mark("", "B1")])));

        let result = s.finish(false);
        assert_eq!(result.marks[0].explanation, "(a) M1: reasoning X");
        assert_eq!(result.marks[1].explanation, "(b) A1: reasoning Y");
        assert_eq!(result.marks[2].explanation, "");
        assert_eq!(result.leftover_notes, None);
    }

    #[test]
    fn explanation_only_page_feeds_the_buffer() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "p1");
        s.apply("p1", PageEvent::Structured(page(vec![mark("(a)", "M1")])));
        s.plan(Some(&status(2, true)), "p2");
        s.apply(
            "p2",
            PageEvent::Structured(StructuredPage {
                explanation: Some("Stray remark".into()),
                ..Default::default()
            }),
        );
        s.plan(Some(&status(3, true)), "p3");
        s.apply(
            "p3",
            PageEvent::Structured(StructuredPage {
                explanation: Some("   ".into()),
                ..Default::default()
            }),
        );
        assert_eq!(s.note_buffer(), "Stray remark");

        let result = s.finish(true);
        assert_eq!(
            result.marks[0].explanation,
            format!("{CONTINUATION_MARKER}\nStray remark")
        );
    }

    #[test]
    fn notes_without_previous_batch_become_leftover() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "p1");
        s.apply(
            "p1",
            PageEvent::Structured(StructuredPage {
                explanation: Some("General guidance".into()),
                ..Default::default()
            }),
        );
        s.plan(Some(&status(2, true)), "p2");
        s.apply("p2", PageEvent::Structured(page(vec![mark("(a)", "M1")])));

        let result = s.finish(false);
        assert_eq!(result.marks[0].explanation, "");
        assert_eq!(result.leftover_notes.as_deref(), Some("General guidance"));
    }

    #[test]
    fn trailing_notes_are_leftover_unless_flushed() {
        let build = || {
            let mut s = state();
            s.plan(Some(&status(1, true)), "p1");
            s.apply("p1", PageEvent::Structured(page(vec![mark("(a)", "M1")])));
            s.plan(Some(&status(2, false)), "p2");
            s.apply("p2", PageEvent::Notes("(a) M1: final note".into()));
            s
        };

        let kept = build().finish(false);
        assert_eq!(kept.marks[0].explanation, "");
        assert_eq!(kept.leftover_notes.as_deref(), Some("(a) M1: final note"));

        let flushed = build().finish(true);
        assert_eq!(flushed.marks[0].explanation, "(a) M1: final note");
        assert_eq!(flushed.leftover_notes, None);
    }

    #[test]
    fn reused_structured_page_emits_marks_again() {
        let mut s = state();
        s.plan(Some(&status(1, true)), "same");
        s.apply("same", PageEvent::Structured(page(vec![mark("(a)", "M1")])));
        let action = s.plan(Some(&status(2, true)), "same");
        let PageAction::Reuse(cached) = action else {
            panic!("expected reuse");
        };
        assert_eq!(s.apply("same", PageEvent::Reused(cached)), PageOutcome::Reused);

        let result = s.finish(false);
        assert_eq!(result.marks.len(), 2);
        assert_eq!(result.stats.structurer_calls, 1);
        assert_eq!(result.stats.reused_pages, 1);
        assert_eq!(result.stats.marks, 2);
    }
}
