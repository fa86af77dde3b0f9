//! HTTP request handlers.
//!
//! Every failure is a JSON `{error}` body. Pipeline failures add a `detail`
//! field carrying the underlying error; errors caused by the request itself
//! (bad body, bad id, non-PDF upload) are 400 and happen before any tool runs.

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Multipart, Query, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::types::{
    AttachMarksRequest, AttachMarksResponse, ErrorBody, HealthResponse, ImportMarksRequest,
    ImportMarksResponse, ImportQuestionsRequest, ImportQuestionsResponse, MarkSchemeResponse,
};
use super::AppState;
use crate::config::IngestConfig;
use crate::error::{IngestError, StoreError};
use crate::markscheme::parse_mark_scheme_file;
use crate::model::{MarkSchemeDocument, QuestionPaperDocument};
use crate::pipeline::input::{stage_upload, ResolvedInput};
use crate::questions::parse_question_paper_file;
use crate::store::{PaperStore, PaperSummary};

/// Failure of a request, rendered as a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Pipeline(IngestError),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        if e.is_input_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Pipeline(e)
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PaperNotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::InvalidRecord(_) => ApiError::BadRequest(e.to_string()),
            StoreError::Sqlite(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Pipeline(e) => {
                error!("pipeline failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to parse pages.".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Internal(msg) => {
                error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };
        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback for POST-only routes.
pub async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(ErrorBody {
            error: format!("Method {method} Not Allowed"),
            detail: None,
        }),
    )
        .into_response()
}

/// Parse an uploaded mark scheme (multipart field `pdf`).
pub async fn upload_parse_ms(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MarkSchemeDocument>, ApiError> {
    let upload = stage_pdf_field(multipart, &state.config).await?;
    info!("Parsing uploaded mark scheme {}", upload.path().display());
    let run = parse_mark_scheme_file(upload.path(), &state.config, &state.toolkit).await?;
    if let Some(notes) = &run.leftover_notes {
        warn!(chars = notes.len(), "note text left unattributed");
    }
    Ok(Json(run.document))
}

/// Parse an uploaded question paper (multipart field `pdf`).
pub async fn upload_parse_qp(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<QuestionPaperDocument>, ApiError> {
    let upload = stage_pdf_field(multipart, &state.config).await?;
    info!("Parsing uploaded question paper {}", upload.path().display());
    let doc = parse_question_paper_file(upload.path(), &state.config, &state.toolkit).await?;
    Ok(Json(doc))
}

/// Store a mark scheme for a paper, creating the paper when needed.
pub async fn import_ms(
    State(state): State<AppState>,
    body: Result<Json<ImportMarksRequest>, JsonRejection>,
) -> Result<Json<ImportMarksResponse>, ApiError> {
    let Json(request) = body?;
    let meta = request.exam_metadata.into_paper();
    let report = with_store(&state, move |store| store.import_marks(&meta, &request.marks)).await?;
    Ok(Json(ImportMarksResponse {
        exam_paper_id: report.exam_paper_id,
        inserted: report.inserted,
    }))
}

/// Store a question paper's questions, creating the paper when needed.
pub async fn import_qp(
    State(state): State<AppState>,
    body: Result<Json<ImportQuestionsRequest>, JsonRejection>,
) -> Result<Json<ImportQuestionsResponse>, ApiError> {
    let Json(request) = body?;
    let meta = request.exam_metadata.into_paper();
    let report = with_store(&state, move |store| store.import_questions(&meta, &request.questions)).await?;
    Ok(Json(ImportQuestionsResponse {
        exam_paper_id: report.exam_paper_id,
        inserted: report.inserted,
        skipped: report.skipped,
    }))
}

/// Attach marks to the questions of an existing paper.
pub async fn upload_mark_scheme(
    State(state): State<AppState>,
    body: Result<Json<AttachMarksRequest>, JsonRejection>,
) -> Result<Json<AttachMarksResponse>, ApiError> {
    let Json(request) = body?;
    let meta = request
        .exam_metadata
        .map(|m| m.into_paper())
        .unwrap_or_default();
    let report = with_store(&state, move |store| store.attach_mark_scheme(&meta, &request.marks)).await?;
    Ok(Json(AttachMarksResponse {
        success: true,
        inserted: report.inserted,
        skipped: report.skipped,
        exam_paper_id: report.exam_paper_id,
    }))
}

pub async fn list_papers(State(state): State<AppState>) -> Result<Json<Vec<PaperSummary>>, ApiError> {
    Ok(Json(with_store(&state, |store| store.list_papers()).await?))
}

pub async fn load_qp(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<QuestionPaperDocument>, ApiError> {
    let id = paper_id_param(&params)?;
    Ok(Json(with_store(&state, move |store| store.load_question_paper(id)).await?))
}

pub async fn get_mark_scheme(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<MarkSchemeResponse>, ApiError> {
    let id = paper_id_param(&params)?;
    let marks = with_store(&state, move |store| store.mark_scheme(id)).await?;
    Ok(Json(MarkSchemeResponse { marks }))
}

fn paper_id_param(params: &HashMap<String, String>) -> Result<i64, ApiError> {
    params
        .get("exam_paper_id")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing or invalid exam_paper_id".into()))
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut PaperStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = store
            .lock()
            .map_err(|_| ApiError::Internal("store lock poisoned".into()))?;
        op(&mut *guard).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
}

/// Stage the `pdf` multipart field as a temporary file.
async fn stage_pdf_field(
    multipart: Result<Multipart, MultipartRejection>,
    config: &IngestConfig,
) -> Result<ResolvedInput, ApiError> {
    let upload_err = |detail: String| ApiError::BadRequest(format!("Failed to upload file: {detail}"));
    let mut multipart = multipart.map_err(|e| upload_err(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(|e| upload_err(e.body_text()))? {
        if field.name() != Some("pdf") {
            continue;
        }
        let filename = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|e| upload_err(e.body_text()))?;
        return Ok(stage_upload(&bytes, filename.as_deref(), config.work_dir.as_deref()).await?);
    }

    Err(upload_err("missing 'pdf' field".into()))
}
