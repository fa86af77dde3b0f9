//! SQLite persistence for papers, questions and mark schemes.
//!
//! Three tables mirror the import flow: a paper row identified by its natural
//! key, the paper's questions, and mark-scheme rows optionally linked to the
//! question they score. Duplicate questions and marks are skipped and
//! counted, never treated as errors.
//!
//! [`PaperStore`] wraps one blocking `rusqlite::Connection`. Async callers
//! share it behind a mutex and call it from `spawn_blocking`.

use crate::error::StoreError;
use crate::marks::{classify_mark_code, split_label};
use crate::model::{Level, Mark, MarkType, PaperMetadata, Question, QuestionPaperDocument};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS exam_papers (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      board TEXT,
      qualification TEXT,
      subject TEXT,
      paper_code TEXT,
      paper_name TEXT,
      exam_session TEXT,
      created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    );

    CREATE TABLE IF NOT EXISTS question_bank (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      exam_paper_id INTEGER NOT NULL,
      question_number TEXT,
      label TEXT NOT NULL DEFAULT '',
      level TEXT NOT NULL DEFAULT '',
      marks INTEGER,
      question_text TEXT,
      latex_blocks TEXT,
      parent_label TEXT,
      FOREIGN KEY(exam_paper_id) REFERENCES exam_papers(id)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS question_bank_natural_key
      ON question_bank (exam_paper_id, question_number, label, level, IFNULL(parent_label, ''));

    CREATE TABLE IF NOT EXISTS mark_scheme (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      exam_paper_id INTEGER NOT NULL,
      question_bank_id INTEGER,
      question_number TEXT,
      label TEXT,
      parent_label TEXT,
      level TEXT,
      mark_code TEXT,
      mark_type TEXT,
      mark_content TEXT,
      ao_code TEXT,
      explanation TEXT,
      created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
      FOREIGN KEY(exam_paper_id) REFERENCES exam_papers(id),
      FOREIGN KEY(question_bank_id) REFERENCES question_bank(id)
    );

    CREATE INDEX IF NOT EXISTS mark_scheme_paper ON mark_scheme (exam_paper_id);
";

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub exam_paper_id: i64,
    pub inserted: usize,
    pub skipped: usize,
}

/// Row of the paper listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperSummary {
    pub id: i64,
    pub paper_code: Option<String>,
    pub paper_name: Option<String>,
    pub exam_session: Option<String>,
}

pub struct PaperStore {
    conn: Connection,
}

impl PaperStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Id of the paper with this `(board, paper_code, exam_session)`,
    /// inserting it when absent.
    pub fn find_or_create_paper(&self, meta: &PaperMetadata) -> Result<i64, StoreError> {
        find_or_create_paper(&self.conn, meta)
    }

    /// Insert questions for a paper.
    ///
    /// A `subsub` question without a parent gets the label of the most recent
    /// `sub` question seen. Natural-key conflicts are skipped.
    pub fn import_questions(
        &mut self,
        meta: &PaperMetadata,
        questions: &[Question],
    ) -> Result<ImportReport, StoreError> {
        let tx = self.conn.transaction()?;
        let exam_paper_id = find_or_create_paper(&tx, meta)?;
        let mut report = ImportReport {
            exam_paper_id,
            ..Default::default()
        };

        let mut current_sub: Option<String> = None;
        for q in questions {
            let parent_label = match q.level {
                Level::Sub => {
                    current_sub = Some(q.label.clone());
                    None
                }
                Level::Subsub => q
                    .parent_label
                    .clone()
                    .filter(|p| !p.is_empty())
                    .or_else(|| current_sub.clone()),
                Level::Main => None,
            };

            let latex_blocks = serde_json::to_string(&q.latex_blocks)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

            let result = tx.execute(
                "INSERT INTO question_bank
                   (exam_paper_id, question_number, label, level, marks, question_text, latex_blocks, parent_label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    exam_paper_id,
                    non_empty(&q.question_number),
                    q.label,
                    q.level.as_str(),
                    q.marks,
                    non_empty(&q.question_text),
                    latex_blocks,
                    parent_label,
                ],
            );

            match result {
                Ok(_) => report.inserted += 1,
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    warn!(
                        question = %q.question_number,
                        label = %q.label,
                        level = q.level.as_str(),
                        "duplicate question skipped"
                    );
                    report.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit()?;
        info!(
            exam_paper_id,
            inserted = report.inserted,
            skipped = report.skipped,
            "questions imported"
        );
        Ok(report)
    }

    /// Insert every mark for a paper, linking it to the question with the
    /// same `(question_number, label)` when one exists.
    pub fn import_marks(&mut self, meta: &PaperMetadata, marks: &[Mark]) -> Result<ImportReport, StoreError> {
        let tx = self.conn.transaction()?;
        let exam_paper_id = find_or_create_paper(&tx, meta)?;
        let mut inserted = 0;

        for m in marks {
            let question_bank_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM question_bank
                     WHERE exam_paper_id = ?1 AND question_number = ?2 AND label = ?3
                     LIMIT 1",
                    params![exam_paper_id, m.question_number, m.label],
                    |row| row.get(0),
                )
                .optional()?;

            let mark_type = m.mark_type.or_else(|| classify_mark_code(&m.mark_code));
            insert_mark(&tx, exam_paper_id, question_bank_id, m, &m.label, m.parent_label.as_deref(), mark_type)?;
            inserted += 1;
        }

        tx.commit()?;
        info!(exam_paper_id, inserted, "marks imported");
        Ok(ImportReport {
            exam_paper_id,
            inserted,
            skipped: 0,
        })
    }

    /// Attach parsed marks to the questions of an existing paper.
    ///
    /// The paper must already exist under `(paper_code, paper_name)`. Marks
    /// without a matching question, with an unsplittable label, or already
    /// present for `(paper, question, mark_code)` are skipped. All-or-nothing.
    pub fn attach_mark_scheme(
        &mut self,
        meta: &PaperMetadata,
        marks: &[Mark],
    ) -> Result<ImportReport, StoreError> {
        let (Some(paper_code), Some(paper_name)) = (meta.paper_code.as_deref(), meta.paper_name.as_deref())
        else {
            return Err(StoreError::InvalidRecord(
                "Missing paper_code or paper_name".into(),
            ));
        };

        let tx = self.conn.transaction()?;
        let exam_paper_id: i64 = tx
            .query_row(
                "SELECT id FROM exam_papers WHERE paper_code = ?1 AND paper_name = ?2 LIMIT 1",
                params![paper_code, paper_name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::PaperNotFound(format!("{paper_code} / {paper_name}")))?;

        let mut report = ImportReport {
            exam_paper_id,
            ..Default::default()
        };

        for m in marks {
            if m.question_number.is_empty() || m.label.is_empty() || m.mark_code.is_empty() {
                report.skipped += 1;
                continue;
            }

            let parsed = match split_label(&m.label, m.level) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(question = %m.question_number, "{e}; mark skipped");
                    report.skipped += 1;
                    continue;
                }
            };

            let question_bank_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM question_bank
                     WHERE exam_paper_id = ?1 AND question_number = ?2 AND label = ?3
                       AND parent_label IS ?4 AND level = ?5
                     LIMIT 1",
                    params![
                        exam_paper_id,
                        m.question_number,
                        parsed.label,
                        parsed.parent_label,
                        m.level.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(question_bank_id) = question_bank_id else {
                warn!(
                    question = %m.question_number,
                    label = %m.label,
                    level = m.level.as_str(),
                    "no matching question; mark skipped"
                );
                report.skipped += 1;
                continue;
            };

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM mark_scheme
                     WHERE exam_paper_id = ?1 AND question_bank_id = ?2 AND mark_code = ?3",
                    params![exam_paper_id, question_bank_id, m.mark_code],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                warn!(question_bank_id, mark_code = %m.mark_code, "duplicate mark skipped");
                report.skipped += 1;
                continue;
            }

            insert_mark(
                &tx,
                exam_paper_id,
                Some(question_bank_id),
                m,
                &parsed.label,
                parsed.parent_label.as_deref(),
                classify_mark_code(&m.mark_code),
            )?;
            report.inserted += 1;
        }

        tx.commit()?;
        info!(
            exam_paper_id,
            inserted = report.inserted,
            skipped = report.skipped,
            "mark scheme attached"
        );
        Ok(report)
    }

    /// All papers, newest first.
    pub fn list_papers(&self) -> Result<Vec<PaperSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, paper_code, paper_name, exam_session FROM exam_papers
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PaperSummary {
                id: row.get(0)?,
                paper_code: row.get(1)?,
                paper_name: row.get(2)?,
                exam_session: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// A paper's metadata and its questions in insertion order.
    pub fn load_question_paper(&self, exam_paper_id: i64) -> Result<QuestionPaperDocument, StoreError> {
        let exam_metadata = self
            .conn
            .query_row(
                "SELECT id, board, qualification, subject, paper_code, paper_name, exam_session
                 FROM exam_papers WHERE id = ?1",
                params![exam_paper_id],
                |row| {
                    Ok(PaperMetadata {
                        exam_paper_id: Some(row.get(0)?),
                        board: row.get(1)?,
                        qualification: row.get(2)?,
                        subject: row.get(3)?,
                        paper_code: row.get(4)?,
                        paper_name: row.get(5)?,
                        exam_session: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::PaperNotFound(exam_paper_id.to_string()))?;

        let mut stmt = self.conn.prepare(
            "SELECT question_number, label, level, marks, question_text, latex_blocks, parent_label
             FROM question_bank WHERE exam_paper_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![exam_paper_id], |row| {
            let level: String = row.get(2)?;
            let latex: Option<String> = row.get(5)?;
            Ok(Question {
                question_number: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                label: row.get(1)?,
                level: Level::parse(&level).unwrap_or_default(),
                marks: row.get(3)?,
                question_text: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                latex_blocks: latex
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                parent_label: row.get(6)?,
            })
        })?;
        let questions = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(exam_paper_id, questions = questions.len(), "question paper loaded");

        Ok(QuestionPaperDocument {
            exam_metadata,
            questions,
        })
    }

    /// Stored marks of a paper ordered by question number, label and code.
    pub fn mark_scheme(&self, exam_paper_id: i64) -> Result<Vec<Mark>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT question_number, label, parent_label, level, mark_code, mark_type,
                    mark_content, explanation, ao_code
             FROM mark_scheme WHERE exam_paper_id = ?1
             ORDER BY question_number, label, mark_code",
        )?;
        let rows = stmt.query_map(params![exam_paper_id], |row| {
            let text = |idx: usize| -> rusqlite::Result<String> {
                Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
            };
            Ok(Mark {
                question_number: text(0)?,
                label: text(1)?,
                parent_label: row.get(2)?,
                level: Level::parse(&text(3)?).unwrap_or_default(),
                mark_code: text(4)?,
                mark_type: MarkType::parse(&text(5)?),
                mark_content: text(6)?,
                explanation: text(7)?,
                ao_code: text(8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn find_or_create_paper(conn: &Connection, meta: &PaperMetadata) -> Result<i64, StoreError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM exam_papers
             WHERE board IS ?1 AND paper_code IS ?2 AND exam_session IS ?3
             LIMIT 1",
            params![meta.board, meta.paper_code, meta.exam_session],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO exam_papers (board, qualification, subject, paper_code, paper_name, exam_session)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            meta.board,
            meta.qualification,
            meta.subject,
            meta.paper_code,
            meta.paper_name,
            meta.exam_session
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(exam_paper_id = id, paper_code = ?meta.paper_code, "exam paper created");
    Ok(id)
}

fn insert_mark(
    conn: &Connection,
    exam_paper_id: i64,
    question_bank_id: Option<i64>,
    m: &Mark,
    label: &str,
    parent_label: Option<&str>,
    mark_type: Option<MarkType>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO mark_scheme
           (exam_paper_id, question_bank_id, question_number, label, parent_label, level,
            mark_code, mark_type, mark_content, ao_code, explanation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            exam_paper_id,
            question_bank_id,
            m.question_number,
            label,
            parent_label,
            m.level.as_str(),
            non_empty(&m.mark_code),
            mark_type.map(|t| t.as_str()),
            non_empty(&m.mark_content),
            non_empty(&m.ao_code),
            m.explanation,
        ],
    )?;
    Ok(())
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}
