//! Mark-scheme runs: classify, render, fold pages, write the artifact.
//!
//! ```text
//! PDF ──▶ classifier ──▶ PageStatusReport ─┐
//!  │                                       ▼
//!  └──▶ renderer ──▶ page_N.png ──▶ drive_pages (RunState fold) ──▶ MarkSchemeRun
//!                                          │
//!                                          ├─ structurer (header pages)
//!                                          └─ recognizer (note pages, page 1)
//! ```
//!
//! Pages are processed one at a time, in order; each external call is awaited
//! before the next page is looked at.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::metadata::infer_paper_metadata;
use crate::model::{ExamMetadata, MarkSchemeDocument, PageStatusReport, RunStats};
use crate::pipeline::encode::{digest, read_page};
use crate::pipeline::input::{new_temp_dir, resolve_input};
use crate::pipeline::state::{PageAction, PageEvent, RunState};
use crate::tools::Toolkit;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Everything a mark-scheme run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkSchemeRun {
    pub document: MarkSchemeDocument,
    /// Note text never attributed to a mark.
    pub leftover_notes: Option<String>,
    pub stats: RunStats,
}

/// Parse a mark-scheme PDF given as a local path or URL.
pub async fn parse_mark_scheme(
    input: &str,
    config: &IngestConfig,
    toolkit: &Toolkit,
) -> Result<MarkSchemeRun, IngestError> {
    let resolved = resolve_input(input, config.download_timeout_secs).await?;
    parse_mark_scheme_file(resolved.path(), config, toolkit).await
}

/// Parse a local mark-scheme PDF.
///
/// Rendered pages live in a scratch directory removed when the run ends.
/// When `artifact_path` is configured the document is written there
/// atomically.
pub async fn parse_mark_scheme_file(
    pdf: &Path,
    config: &IngestConfig,
    toolkit: &Toolkit,
) -> Result<MarkSchemeRun, IngestError> {
    let total_start = Instant::now();

    let classifier = toolkit.require_classifier()?;
    let report = classifier.classify(pdf).await?;
    debug!("Classifier reported {} pages", report.pages.len());

    let scratch = new_temp_dir(config.work_dir.as_deref())?;
    let render_start = Instant::now();
    let images = toolkit.renderer.render(pdf, scratch.path()).await?;
    let render_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", images.len(), render_ms);

    let mut run = drive_pages(&images, &report, config, toolkit).await?;
    run.stats.render_duration_ms = render_ms;
    run.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    if let Some(path) = &config.artifact_path {
        write_artifact(path, &run.document).await?;
        debug!("Artifact written to {}", path.display());
    }

    info!(
        "Mark scheme parsed: {} marks from {} pages ({} structured, {} notes, {} skipped, {} reused)",
        run.stats.marks,
        run.stats.total_pages,
        run.stats.structured_pages,
        run.stats.note_pages,
        run.stats.skipped_pages,
        run.stats.reused_pages
    );
    Ok(run)
}

/// Fold ordered page images into marks.
///
/// `images[i]` is page `i + 1`. Any tool failure aborts the run.
pub async fn drive_pages(
    images: &[PathBuf],
    report: &PageStatusReport,
    config: &IngestConfig,
    toolkit: &Toolkit,
) -> Result<MarkSchemeRun, IngestError> {
    let total = images.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total);
    }

    let mut page1_calls = 0;
    let exam_metadata = match images.first() {
        Some(first) if config.extract_page1_text && report.get(1).is_some() => {
            let text = toolkit.recognizer.recognize(first).await?;
            page1_calls += 1;
            let paper = infer_paper_metadata(&text);
            Some(ExamMetadata {
                page1_text: text,
                paper: (!paper.is_empty()).then_some(paper),
            })
        }
        _ => None,
    };

    let mut state = RunState::new(config.note_format.clone());

    for (idx, image) in images.iter().enumerate() {
        let page_num = idx + 1;
        if let Some(cb) = &config.progress_callback {
            cb.on_page_start(page_num, total);
        }

        let bytes = read_page(image).await?;
        let hash = digest(&bytes);
        let status = u32::try_from(page_num).ok().and_then(|p| report.get(p));

        let action = state.plan(status, &hash);
        debug!(page = page_num, hash = %&hash[..12], ?action, "planned");

        let event = match action {
            PageAction::Skip(reason) => PageEvent::Skipped(reason),
            PageAction::Reuse(cached) => PageEvent::Reused(cached),
            PageAction::RecognizeNotes => PageEvent::Notes(toolkit.recognizer.recognize(image).await?),
            PageAction::Structure => PageEvent::Structured(toolkit.structurer.structure(image).await?),
        };

        let outcome = state.apply(&hash, event);
        if let Some(cb) = &config.progress_callback {
            cb.on_page_complete(page_num, total, &outcome);
        }
    }

    let folded = state.finish(config.flush_trailing_notes);
    let mut stats = folded.stats;
    stats.total_pages = total;
    stats.recognizer_calls += page1_calls;

    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(total, stats.marks);
    }

    Ok(MarkSchemeRun {
        document: MarkSchemeDocument {
            marks: folded.marks,
            exam_metadata,
        },
        leftover_notes: folded.leftover_notes,
        stats,
    })
}

/// Write `document` as pretty JSON via a uniquely named temp file in the
/// same directory, then persist it over `path`.
pub async fn write_artifact(path: &Path, document: &MarkSchemeDocument) -> Result<(), IngestError> {
    let json = serde_json::to_vec_pretty(document)
        .map_err(|e| IngestError::Internal(format!("Failed to serialise artifact: {}", e)))?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let write_err = |source: std::io::Error| IngestError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(write_err)?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| IngestError::Internal(format!("artifact task failed: {e}")))?
}
