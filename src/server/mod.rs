//! HTTP API over the ingest pipeline and the paper store.
//!
//! All POST routes answer other methods with 405 and `Allow: POST`.

mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::IngestConfig;
use crate::store::PaperStore;
use crate::tools::Toolkit;

pub use handlers::*;
pub use types::*;

/// Upload size cap for PDF routes.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Server state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IngestConfig>,
    pub toolkit: Toolkit,
    pub store: Arc<Mutex<PaperStore>>,
}

impl AppState {
    /// State with the default adapters for `config`.
    pub fn new(config: IngestConfig, store: PaperStore) -> Self {
        let toolkit = Toolkit::from_config(&config);
        Self::with_toolkit(config, toolkit, store)
    }

    pub fn with_toolkit(config: IngestConfig, toolkit: Toolkit, store: PaperStore) -> Self {
        Self {
            config: Arc::new(config),
            toolkit,
            store: Arc::new(Mutex::new(store)),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Pipeline runs
        .route(
            "/api/upload-parse-ms",
            post(upload_parse_ms).fallback(method_not_allowed),
        )
        .route(
            "/api/upload-parse-qp",
            post(upload_parse_qp).fallback(method_not_allowed),
        )
        // Imports
        .route("/api/import-ms", post(import_ms).fallback(method_not_allowed))
        .route("/api/import-qp", post(import_qp).fallback(method_not_allowed))
        .route(
            "/api/upload-mark-scheme",
            post(upload_mark_scheme).fallback(method_not_allowed),
        )
        // Queries
        .route("/api/papers", get(list_papers))
        .route("/api/load-qp", get(load_qp))
        .route("/api/get-mark-scheme", get(get_mark_scheme))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn start_server(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Starting API server on {}", listener.local_addr()?);
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}
