//! Progress-callback trait for per-page run events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive events
//! as the pipeline walks the document. The CLI forwards them to an
//! `indicatif` progress bar; the HTTP server runs without one.
//!
//! Pages are processed strictly in order, so events for one run never
//! interleave. The trait is still `Send + Sync` because a config (and its
//! callback) is shared by concurrent HTTP requests.
//!
//! # Example
//!
//! ```rust
//! use paperbank::{IngestConfig, IngestProgressCallback, PageOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     structured: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _page: usize, _total: usize, outcome: &PageOutcome) {
//!         if matches!(outcome, PageOutcome::Structured { .. }) {
//!             self.structured.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { structured: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::state::PageOutcome;
use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after rendering, before the first page is examined.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is classified against the run state.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after the page's outcome has been folded into the run.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, outcome: &PageOutcome) {
        let _ = (page_num, total_pages, outcome);
    }

    /// Called once when every page has been folded.
    ///
    /// # Arguments
    /// * `total_pages`: pages in the document
    /// * `marks`      : marks emitted by the run
    fn on_run_complete(&self, total_pages: usize, marks: usize) {
        let _ = (total_pages, marks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
