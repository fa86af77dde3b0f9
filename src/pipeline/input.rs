//! Input resolution: normalise a path, URL or uploaded byte buffer to a
//! local PDF file.
//!
//! pdfium and every external tool need a file-system path. Downloads and
//! uploads land in a `TempDir` held by [`ResolvedInput`], so they are removed
//! when the run finishes, on success or failure. The `%PDF` magic bytes are
//! checked before any tool sees the file.

use crate::error::IngestError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input, either a local path or a file in a temp directory.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was downloaded or uploaded. The `TempDir` is kept alive until
    /// processing completes.
    Temporary { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, IngestError> {
    if input.trim().is_empty() {
        return Err(IngestError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write uploaded bytes to a fresh temp directory under `work_dir`.
pub async fn stage_upload(
    bytes: &[u8],
    filename: Option<&str>,
    work_dir: Option<&Path>,
) -> Result<ResolvedInput, IngestError> {
    let name = filename
        .and_then(|n| Path::new(n).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.pdf".to_string());
    let staged = stage_bytes(bytes, &name, new_temp_dir(work_dir)?).await?;
    debug!("Staged upload: {} ({} bytes)", staged.path().display(), bytes.len());
    Ok(staged)
}

/// Check `bytes` and write them as `name` inside `temp_dir`.
async fn stage_bytes(bytes: &[u8], name: &str, temp_dir: TempDir) -> Result<ResolvedInput, IngestError> {
    let path = temp_dir.path().join(name);
    check_magic(bytes, &path)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| IngestError::Internal(format!("Failed to write temp file: {}", e)))?;
    Ok(ResolvedInput::Temporary {
        path,
        _temp_dir: temp_dir,
    })
}

/// Create a scratch directory, under `work_dir` when given.
pub fn new_temp_dir(work_dir: Option<&Path>) -> Result<TempDir, IngestError> {
    let result = match work_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| IngestError::Internal(format!("Failed to create work dir: {}", e)))?;
            TempDir::new_in(dir)
        }
        None => TempDir::new(),
    };
    result.map_err(|e| IngestError::Internal(e.to_string()))
}

/// Reject anything not starting with `%PDF`.
fn check_magic(bytes: &[u8], path: &Path) -> Result<(), IngestError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(IngestError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, IngestError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(IngestError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(IngestError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(IngestError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, IngestError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| IngestError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let fetch = async {
        let response = client.get(url).send().await?.error_for_status()?;
        response.bytes().await
    };
    let bytes = fetch.await.map_err(|e| {
        if e.is_timeout() {
            IngestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let staged = stage_bytes(&bytes, &filename_from_url(url), new_temp_dir(None)?).await?;
    info!("Downloaded {} bytes to: {}", bytes.len(), staged.path().display());
    Ok(staged)
}

/// Last URL path segment when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(filename_from_url("https://x.org/ms/9MA0_01.pdf"), "9MA0_01.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn upload_must_be_a_pdf() {
        let err = stage_upload(b"PK\x03\x04zip", Some("paper.pdf"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn upload_is_staged_under_work_dir() {
        let work = tempfile::tempdir().unwrap();
        let staged = stage_upload(b"%PDF-1.7\n", Some("../../etc/ms.pdf"), Some(work.path()))
            .await
            .unwrap();
        assert!(staged.path().starts_with(work.path()));
        assert!(staged.path().ends_with("ms.pdf"));
        assert!(staged.path().exists());
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/no/such/ms.pdf", 5).await.err().unwrap();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"GIF89a").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.err().unwrap();
        assert!(matches!(err, IngestError::NotAPdf { .. }));
    }
}
