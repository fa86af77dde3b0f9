//! Pipeline stages shared by mark-scheme and question-paper runs.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (URL/path/  (pdfium)  (sha256,   (VLM)   (JSON reply
//!  upload)               base64)            cleanup)
//!                          │
//!                          └──▶ state (per-page fold, mark schemes only)
//! ```
//!
//! 1. [`input`] : canonicalise the path, URL or upload to a local PDF
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: digest page bytes for the image cache and base64-wrap
//!    them for the multimodal API request body
//! 4. [`llm`]   : drive the VLM call with retry, backoff and timeout
//! 5. [`postprocess`]: turn replies into [`crate::model`] records
//! 6. [`state`] : the explicit page fold of a mark-scheme run

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod state;
