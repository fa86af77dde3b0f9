//! Pipeline tests with in-process fake tools.
//!
//! Page "images" are small text files; each fake tool looks the file's
//! content up in a table, so identical content means identical image hash.

use async_trait::async_trait;
use paperbank::tools::{PageClassifier, PageRenderer, PageStructurer, QuestionReader, TextRecognizer};
use paperbank::{
    parse_mark_scheme_file, parse_question_paper_file, IngestConfig, IngestError, IngestProgressCallback,
    Level, Mark, MarkType, PageOutcome, PageStatus, PageStatusReport, StructuredPage, Toolkit,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────

struct FakeClassifier(PageStatusReport);

#[async_trait]
impl PageClassifier for FakeClassifier {
    async fn classify(&self, _pdf: &Path) -> Result<PageStatusReport, IngestError> {
        Ok(self.0.clone())
    }
}

struct FakeRenderer(Vec<String>);

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, _pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let mut paths = Vec::new();
        for (i, content) in self.0.iter().enumerate() {
            let path = out_dir.join(format!("page_{}.png", i + 1));
            std::fs::write(&path, content).map_err(|e| IngestError::Internal(e.to_string()))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

fn content(image: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(image).map_err(|e| IngestError::Internal(e.to_string()))
}

#[derive(Default)]
struct FakeRecognizer {
    text: HashMap<String, String>,
    calls: AtomicUsize,
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, image: &Path) -> Result<String, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.get(&content(image)?).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeStructurer {
    pages: HashMap<String, StructuredPage>,
    calls: AtomicUsize,
}

#[async_trait]
impl PageStructurer for FakeStructurer {
    async fn structure(&self, image: &Path) -> Result<StructuredPage, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = content(image)?;
        self.pages.get(&key).cloned().ok_or_else(|| IngestError::ToolFailed {
            tool: "page structurer",
            target: key,
            code: Some(1),
            stderr: "unknown page".into(),
        })
    }
}

#[derive(Default)]
struct FakeReader(HashMap<String, String>);

#[async_trait]
impl QuestionReader for FakeReader {
    async fn read_questions(&self, image: &Path) -> Result<String, IngestError> {
        Ok(self.0.get(&content(image)?).cloned().unwrap_or_default())
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Fixture {
    pages: Vec<String>,
    statuses: Vec<PageStatus>,
    recognizer: FakeRecognizer,
    structurer: FakeStructurer,
    reader: FakeReader,
}

impl Fixture {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            statuses: Vec::new(),
            recognizer: FakeRecognizer::default(),
            structurer: FakeStructurer::default(),
            reader: FakeReader::default(),
        }
    }

    /// Page without status entry.
    fn unclassified(mut self, id: &str) -> Self {
        self.pages.push(id.into());
        self
    }

    fn note_page(mut self, id: &str, text: &str) -> Self {
        self.push_status(false);
        self.pages.push(id.into());
        self.recognizer.text.insert(id.into(), text.into());
        self
    }

    fn header_page(mut self, id: &str, page: StructuredPage) -> Self {
        self.push_status(true);
        self.pages.push(id.into());
        self.structurer.pages.insert(id.into(), page);
        self
    }

    fn question_page(mut self, id: &str, reply: &str) -> Self {
        self.pages.push(id.into());
        self.reader.0.insert(id.into(), reply.into());
        self
    }

    fn push_status(&mut self, has_header: bool) {
        self.statuses.push(PageStatus {
            page: self.pages.len() as u32 + 1,
            has_table: has_header,
            has_header,
        });
    }

    fn build(self) -> (Toolkit, Arc<FakeRecognizer>, Arc<FakeStructurer>) {
        let recognizer = Arc::new(self.recognizer);
        let structurer = Arc::new(self.structurer);
        let toolkit = Toolkit {
            classifier: Some(Arc::new(FakeClassifier(PageStatusReport { pages: self.statuses }))),
            renderer: Arc::new(FakeRenderer(self.pages)),
            recognizer: recognizer.clone(),
            structurer: structurer.clone(),
            question_reader: Arc::new(self.reader),
        };
        (toolkit, recognizer, structurer)
    }
}

fn mark(number: &str, level: Level, label: &str, code: &str) -> Mark {
    Mark {
        question_number: number.into(),
        level,
        label: label.into(),
        mark_code: code.into(),
        ..Default::default()
    }
}

fn marks(list: Vec<Mark>) -> StructuredPage {
    StructuredPage {
        marks: list,
        ..Default::default()
    }
}

fn config(dir: &Path) -> IngestConfig {
    IngestConfig::builder()
        .work_dir(dir.join("work"))
        .build()
        .unwrap()
}

const COVER: &str = "Mark Scheme (Results)\nPearson Edexcel GCE\nA Level Mathematics\n\
                     Pure Mathematics Paper 1 (9MA0/01)\nJune 2018";

// ── Mark schemes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn notes_are_attributed_to_the_previous_batch() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("json").join("output_ms.json");
    let config = IngestConfig::builder()
        .work_dir(dir.path().join("work"))
        .artifact_path(&artifact)
        .build()
        .unwrap();

    let (toolkit, recognizer, structurer) = Fixture::new()
        .note_page("cover", COVER)
        .header_page(
            "table-1",
            marks(vec![
                mark("2", Level::Sub, "(a)", "M1"),
                mark("2", Level::Sub, "(b)", "A1"),
            ]),
        )
        .note_page("notes-1", "(a) M1: differentiates correctly\n(b) A1: correct answer only")
        .header_page("table-2", marks(vec![mark("3", Level::Main, "", "B1")]))
        .note_page("notes-2", "Award for any equivalent form")
        .build();

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config, &toolkit)
        .await
        .unwrap();
    let got = &run.document.marks;

    assert_eq!(got.len(), 3);
    assert_eq!(got[0].explanation, "(a) M1: differentiates correctly");
    assert_eq!(got[1].explanation, "(b) A1: correct answer only");
    assert_eq!(got[2].explanation, "");
    assert_eq!(got[0].mark_type, Some(MarkType::Method));
    assert_eq!(got[1].mark_type, Some(MarkType::Accuracy));
    assert_eq!(got[2].mark_type, Some(MarkType::Independent));
    assert_eq!(run.leftover_notes.as_deref(), Some("Award for any equivalent form"));

    // Page 1 once for metadata, two note pages.
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(structurer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(run.stats.skipped_pages, 1);
    assert_eq!(run.stats.note_pages, 2);

    let meta = run.document.exam_metadata.as_ref().unwrap();
    assert!(meta.page1_text.contains("Pearson Edexcel"));
    assert_eq!(meta.paper.as_ref().unwrap().paper_code.as_deref(), Some("9MA0/01"));

    let written: serde_json::Value = serde_json::from_slice(&std::fs::read(&artifact).unwrap()).unwrap();
    assert_eq!(written["marks"].as_array().unwrap().len(), 3);
    assert_eq!(written["marks"][2]["explanation"], "");
}

#[tokio::test]
async fn trailing_notes_flush_into_last_mark_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = IngestConfig::builder()
        .work_dir(dir.path().join("work"))
        .flush_trailing_notes(true)
        .extract_page1_text(false)
        .build()
        .unwrap();

    let (toolkit, _, _) = Fixture::new()
        .header_page(
            "table",
            marks(vec![
                mark("4", Level::Sub, "(a)", "M1"),
                mark("4", Level::Sub, "(a)", "A1"),
            ]),
        )
        .note_page("notes", "Allow follow through from their answer")
        .build();

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config, &toolkit)
        .await
        .unwrap();
    let got = &run.document.marks;

    assert_eq!(got[0].explanation, "");
    assert_eq!(
        got[1].explanation,
        "[Note continuation]\nAllow follow through from their answer"
    );
    assert!(run.leftover_notes.is_none());
    assert!(run.document.exam_metadata.is_none());
}

#[tokio::test]
async fn duplicate_images_call_the_structurer_once() {
    let dir = tempfile::tempdir().unwrap();
    let page = marks(vec![mark("1", Level::Main, "", "B1"), mark("1", Level::Main, "", "B1")]);
    let (toolkit, _, structurer) = Fixture::new()
        .header_page("table", page.clone())
        .header_page("table", page)
        .build();

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap();

    assert_eq!(structurer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.stats.reused_pages, 1);
    assert_eq!(run.document.marks.len(), 4);
}

#[tokio::test]
async fn pages_before_first_header_or_without_status_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (toolkit, recognizer, structurer) = Fixture::new()
        .note_page("cover", COVER)
        .note_page("guidance", "General marking guidance")
        .unclassified("orphan")
        .header_page("table", marks(vec![mark("1", Level::Main, "", "M1")]))
        .build();

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap();

    assert_eq!(run.stats.skipped_pages, 3);
    assert_eq!(structurer.calls.load(Ordering::SeqCst), 1);
    // Only page 1, for metadata.
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.document.marks[0].explanation, "");
    assert!(run.leftover_notes.is_none());
}

#[tokio::test]
async fn explanation_only_pages_feed_the_note_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let (toolkit, _, _) = Fixture::new()
        .header_page(
            "intro",
            StructuredPage {
                explanation: Some("Marks are awarded for method and accuracy".into()),
                ..Default::default()
            },
        )
        .header_page("table-1", marks(vec![mark("5", Level::Sub, "(a)", "M1")]))
        .header_page(
            "continued",
            StructuredPage {
                explanation: Some("M1: for attempting the product rule".into()),
                ..Default::default()
            },
        )
        .header_page("table-2", marks(vec![mark("6", Level::Main, "", "B1")]))
        .build();

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap();

    // Nothing to attach the first explanation to.
    assert_eq!(
        run.leftover_notes.as_deref(),
        Some("Marks are awarded for method and accuracy")
    );
    // Unlabelled chunk key "m1" differs from "(a)M1"; falls back to the last mark.
    assert_eq!(
        run.document.marks[0].explanation,
        "[Note continuation]\nM1: for attempting the product rule"
    );
}

#[tokio::test]
async fn structurer_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (mut toolkit, _, _) = Fixture::new()
        .header_page("table", marks(vec![mark("1", Level::Main, "", "M1")]))
        .build();
    toolkit.structurer = Arc::new(FakeStructurer::default());

    let err = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ToolFailed { tool: "page structurer", .. }));
}

#[tokio::test]
async fn missing_classifier_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (mut toolkit, _, _) = Fixture::new().build();
    toolkit.classifier = None;

    let err = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ToolNotConfigured { .. }));
}

struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl IngestProgressCallback for RecordingCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.events.lock().unwrap().push(format!("start {total_pages}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, outcome: &PageOutcome) {
        self.events.lock().unwrap().push(format!("{page_num} {outcome:?}"));
    }

    fn on_run_complete(&self, _total_pages: usize, marks: usize) {
        self.events.lock().unwrap().push(format!("done {marks}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let dir = tempfile::tempdir().unwrap();
    let callback = Arc::new(RecordingCallback {
        events: Mutex::new(Vec::new()),
    });
    let config = IngestConfig::builder()
        .work_dir(dir.path().join("work"))
        .progress_callback(callback.clone())
        .build()
        .unwrap();

    let (toolkit, _, _) = Fixture::new()
        .note_page("cover", COVER)
        .header_page("table", marks(vec![mark("1", Level::Main, "", "M1")]))
        .note_page("notes", "M1: any valid method")
        .build();

    parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config, &toolkit)
        .await
        .unwrap();

    let events = callback.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 3".to_string(),
            "1 Skipped(BeforeFirstHeader)".to_string(),
            "2 Structured { marks: 1 }".to_string(),
            "3 Notes".to_string(),
            "done 1".to_string(),
        ]
    );
}

// ── Question papers ──────────────────────────────────────────────────────

#[tokio::test]
async fn question_pages_are_read_and_normalised() {
    let dir = tempfile::tempdir().unwrap();
    let (mut toolkit, _, _) = Fixture::new()
        .question_page(
            "p1",
            r#"```json
[{"question_number": "1", "level": "main", "label": "", "marks": "(4)", "question_text": "Find x"},
 {"question_number": "2", "level": "sub", "label": "(a)", "marks": 2, "question_text": "Show that"}]
```"#,
        )
        .question_page("p2", "I could not read this page.")
        .question_page(
            "p3",
            r#"[{"question_number": "2", "level": "subsub", "label": "(i)", "question_text": "Hence \sqrt{2}"},
               {"question_number": "2", "level": "sub", "label": "(b)", "question_text": "Continued"}]"#,
        )
        .build();
    toolkit.recognizer = Arc::new(FakeRecognizer {
        text: HashMap::from([("p1".to_string(), COVER.to_string())]),
        calls: AtomicUsize::new(0),
    });

    let doc = parse_question_paper_file(&dir.path().join("qp.pdf"), &config(dir.path()), &toolkit)
        .await
        .unwrap();

    assert_eq!(doc.exam_metadata.paper_code.as_deref(), Some("9MA0/01"));
    assert_eq!(doc.questions.len(), 3);
    assert_eq!(doc.questions[0].marks, Some(4));
    assert_eq!(doc.questions[2].parent_label.as_deref(), Some("(a)"));
    assert_eq!(doc.questions[2].question_text, r"Hence \sqrt{2}");
}
