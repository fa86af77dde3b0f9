//! The command adapters driven through a whole mark-scheme run.
//!
//! Page "images" contain the text each tool should print, so `cat` stands in
//! for both the recognizer and the structurer.
#![cfg(unix)]

use paperbank::{parse_mark_scheme_file, CommandSpec, IngestConfig, IngestError, Toolkit};
use std::path::Path;

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

/// A renderer script that copies prepared pages into `{output}`.
fn renderer(pages_dir: &Path) -> CommandSpec {
    CommandSpec::new(
        "sh",
        [
            "-c".to_string(),
            format!("cp {}/*.png \"$1\"", pages_dir.display()),
            "render".to_string(),
            "{output}".to_string(),
        ],
    )
}

#[tokio::test]
async fn command_tools_produce_reconciled_marks() {
    let dir = tempfile::tempdir().unwrap();
    let pages = dir.path().join("pages");
    std::fs::create_dir_all(&pages).unwrap();

    write(&pages.join("page_1.png"), "Pearson Edexcel GCE Mathematics 9MA0/02 June 2019");
    write(
        &pages.join("page_2.png"),
        r#"```json
{"marks": [{"question_number": 1, "label": "(a)", "level": "sub", "mark_code": "M1", "mark_content": "differentiates"},
           {"question_number": 1, "label": "(a)", "level": "sub", "mark_code": "A1", "mark_content": "x = 2"}]}
```"#,
    );
    write(&pages.join("page_3.png"), "(a)\nM1: attempts to differentiate\nA1: cao");
    write(&pages.join("page_10.png"), r#"[{"question_number": "2", "label": "", "level": "main", "mark_code": "B1"}]"#);

    let status = dir.path().join("status.json");
    write(
        &status,
        r#"[{"page": 1, "has_table": false, "has_header": false},
            {"page": 2, "has_table": true, "has_header": true},
            {"page": 3, "has_table": false, "has_header": false},
            {"page": 4, "has_table": true, "has_header": true}]"#,
    );

    let config = IngestConfig::builder()
        .page_status_file(&status)
        .renderer_command(renderer(&pages))
        .recognizer_command(CommandSpec::new("cat", ["{input}"]))
        .structurer_command(CommandSpec::new("cat", ["{input}"]))
        .work_dir(dir.path().join("work"))
        .build()
        .unwrap();
    let toolkit = Toolkit::from_config(&config);

    let run = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config, &toolkit)
        .await
        .unwrap();
    let marks = &run.document.marks;

    assert_eq!(marks.len(), 3);
    assert_eq!(marks[0].question_number, "1");
    assert_eq!(marks[0].explanation, "M1: attempts to differentiate");
    assert_eq!(marks[1].explanation, "A1: cao");
    assert_eq!(marks[2].mark_code, "B1");

    let paper = run.document.exam_metadata.unwrap().paper.unwrap();
    assert_eq!(paper.paper_code.as_deref(), Some("9MA0/02"));
    assert_eq!(paper.exam_session.as_deref(), Some("June 2019"));
}

#[tokio::test]
async fn failing_recognizer_aborts_with_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let pages = dir.path().join("pages");
    std::fs::create_dir_all(&pages).unwrap();
    write(&pages.join("page_1.png"), "cover");

    let status = dir.path().join("status.json");
    write(&status, r#"{"pages": [{"page": 1, "has_table": false, "has_header": false}]}"#);

    let config = IngestConfig::builder()
        .page_status_file(&status)
        .renderer_command(renderer(&pages))
        .recognizer_command(CommandSpec::new("sh", ["-c", "echo unreadable >&2; exit 3", "ocr"]))
        .work_dir(dir.path().join("work"))
        .build()
        .unwrap();
    let toolkit = Toolkit::from_config(&config);

    let err = parse_mark_scheme_file(&dir.path().join("ms.pdf"), &config, &toolkit)
        .await
        .unwrap_err();
    match err {
        IngestError::ToolFailed { tool, code, stderr, .. } => {
            assert_eq!(tool, "text recognizer");
            assert_eq!(code, Some(3));
            assert!(stderr.contains("unreadable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
