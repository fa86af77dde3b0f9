//! Question-paper runs: render, read each page, normalise.
//!
//! Unlike mark schemes there is no cross-page state while reading; every
//! page's questions are appended and the whole list is normalised once at
//! the end. A page the reader cannot answer with a JSON array is skipped
//! with a warning rather than failing the paper.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::metadata::infer_paper_metadata;
use crate::model::{Level, PaperMetadata, Question, QuestionPaperDocument};
use crate::pipeline::input::{new_temp_dir, resolve_input};
use crate::pipeline::postprocess::parse_question_page;
use crate::pipeline::state::PageOutcome;
use crate::tools::Toolkit;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Parse a question-paper PDF given as a local path or URL.
pub async fn parse_question_paper(
    input: &str,
    config: &IngestConfig,
    toolkit: &Toolkit,
) -> Result<QuestionPaperDocument, IngestError> {
    let resolved = resolve_input(input, config.download_timeout_secs).await?;
    parse_question_paper_file(resolved.path(), config, toolkit).await
}

/// Parse a local question-paper PDF.
pub async fn parse_question_paper_file(
    pdf: &Path,
    config: &IngestConfig,
    toolkit: &Toolkit,
) -> Result<QuestionPaperDocument, IngestError> {
    let scratch = new_temp_dir(config.work_dir.as_deref())?;
    let images = toolkit.renderer.render(pdf, scratch.path()).await?;
    let total = images.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_run_start(total);
    }

    let exam_metadata = match images.first() {
        Some(first) if config.extract_page1_text => {
            infer_paper_metadata(&toolkit.recognizer.recognize(first).await?)
        }
        _ => PaperMetadata::default(),
    };

    let mut questions = Vec::new();
    for (idx, image) in images.iter().enumerate() {
        let page_num = idx + 1;
        if let Some(cb) = &config.progress_callback {
            cb.on_page_start(page_num, total);
        }

        let raw = toolkit.question_reader.read_questions(image).await?;
        let outcome = match parse_question_page(&raw) {
            Ok(page_questions) => {
                let count = page_questions.len();
                questions.extend(page_questions);
                PageOutcome::Questions { count }
            }
            Err(reason) => {
                warn!(page = page_num, %reason, "skipping question page");
                PageOutcome::Rejected
            }
        };

        if let Some(cb) = &config.progress_callback {
            cb.on_page_complete(page_num, total, &outcome);
        }
    }

    let questions = normalize_questions(questions);
    if let Some(cb) = &config.progress_callback {
        cb.on_run_complete(total, questions.len());
    }
    info!("Extracted {} questions from {} pages", questions.len(), total);

    Ok(QuestionPaperDocument {
        exam_metadata,
        questions,
    })
}

static RE_REPEATED_LATEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\\\[.*?\\\])\s+\\[a-zA-Z]+\{.*?\}").unwrap());

/// Clean the reader's questions for import.
///
/// 1. Drop "continued" placeholders.
/// 2. Split `10a` with an empty label into number `10`, label `a`.
/// 3. Give `subsub` questions without a parent the label of the most recent
///    `sub` question with the same number.
/// 4. Drop raw LaTeX repeated right after a `\[...\]` block.
///
/// Gaps in main question numbers and empty or truncated texts are logged.
pub fn normalize_questions(questions: Vec<Question>) -> Vec<Question> {
    let mut questions: Vec<Question> = questions
        .into_iter()
        .filter(|q| !q.question_text.trim().eq_ignore_ascii_case("continued"))
        .collect();

    for q in &mut questions {
        if q.label.is_empty() && !q.question_number.chars().all(|c| c.is_ascii_digit()) {
            let digits: String = q.question_number.chars().filter(char::is_ascii_digit).collect();
            let letters: String = q.question_number.chars().filter(|c| c.is_alphabetic()).collect();
            if !digits.is_empty() && !letters.is_empty() {
                q.question_number = digits;
                q.label = letters;
            }
        }
    }

    let mut last_sub: HashMap<String, String> = HashMap::new();
    for q in &mut questions {
        match q.level {
            Level::Sub => {
                last_sub.insert(q.question_number.clone(), q.label.clone());
            }
            Level::Subsub if q.parent_label.as_deref().map_or(true, str::is_empty) => {
                q.parent_label = last_sub.get(&q.question_number).cloned();
            }
            _ => {}
        }
    }

    warn_missing_mains(&questions);

    for q in &mut questions {
        if matches!(q.level, Level::Main | Level::Sub) {
            let text = q.question_text.trim();
            if text.is_empty() || text.to_lowercase().starts_with("continued") || text.ends_with("...") {
                warn!(
                    question = %q.question_number,
                    label = %q.label,
                    "question text may be truncated or empty"
                );
            }
        }
        if RE_REPEATED_LATEX.is_match(&q.question_text) {
            q.question_text = RE_REPEATED_LATEX
                .replace_all(&q.question_text, "${1}")
                .into_owned();
        }
    }

    questions
}

fn warn_missing_mains(questions: &[Question]) {
    let seen: BTreeSet<u32> = questions
        .iter()
        .filter(|q| q.level == Level::Main)
        .filter_map(|q| q.question_number.parse().ok())
        .collect();
    let Some(&highest) = seen.iter().next_back() else {
        return;
    };
    let missing: Vec<u32> = (1..highest).filter(|n| !seen.contains(n)).collect();
    if !missing.is_empty() {
        warn!(?missing, "main question numbers missing");
    }
}
