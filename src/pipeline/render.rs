//! Page rasterisation: render every page of a PDF to `page_<n>.png`.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! HTTP server's worker threads never stall during rendering.
//!
//! External renderers (e.g. `pdftoppm`) name their files differently, so the
//! pipeline never assumes names: it lists the output directory with
//! [`list_page_images`], which orders by the first integer in each name.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::tools::PageRenderer;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-process renderer backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let this = self.clone();
        let pdf = pdf.to_path_buf();
        let out_dir = out_dir.to_path_buf();

        tokio::task::spawn_blocking(move || this.render_blocking(&pdf, &out_dir))
            .await
            .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRenderer {
    fn bind(&self) -> Result<Pdfium, IngestError> {
        let explicit = self
            .lib_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| IngestError::PdfiumBindingFailed(e.to_string()))?;

        Ok(Pdfium::new(bindings))
    }

    fn render_blocking(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    IngestError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    IngestError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                IngestError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut written = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page_num = idx + 1;
            let page = pages
                .get(idx as u16)
                .map_err(|e| IngestError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                IngestError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let path = out_dir.join(format!("page_{}.png", page_num));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| IngestError::RasterisationFailed {
                    page: page_num,
                    detail: e.to_string(),
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            written.push(path);
        }

        Ok(written)
    }
}

static RE_FIRST_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// List page images in `dir`, ordered by the first integer in each file name.
///
/// Names without an integer sort last, by name.
pub fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::ImageReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<(Option<u64>, String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IngestError::ImageReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let number = RE_FIRST_INT
            .find(&name)
            .and_then(|m| m.as_str().parse::<u64>().ok());
        images.push((number, name, path));
    }

    images.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });

    Ok(images.into_iter().map(|(_, _, path)| path).collect())
}
