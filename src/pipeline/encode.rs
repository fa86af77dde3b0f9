//! Page bytes: content digest and VLM encoding.
//!
//! The digest keys the per-run image cache, so two byte-identical renders
//! (repeated cover or blank pages) cost one structurer call. The encoding
//! wraps the same bytes as a base64 `ImageData` for the multimodal request.

use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Read a rendered page image.
pub async fn read_page(path: &Path) -> Result<Vec<u8>, IngestError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| IngestError::ImageReadFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// SHA-256 of the image bytes as lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Wrap image bytes for the VLM API.
///
/// The MIME type is sniffed from the bytes; anything unrecognised is sent as
/// PNG, which is what every renderer here writes. `detail: "high"` keeps
/// small mark-scheme table text legible to the model.
pub fn encode_bytes(bytes: &[u8]) -> ImageData {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        _ => "image/png",
    };
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());

    ImageData::new(b64, mime).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encode_png_page() {
        let data = encode_bytes(&png_bytes());
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, png_bytes());
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = digest(b"page");
        assert_eq!(a.len(), 64);
        assert_eq!(a, digest(b"page"));
        assert_ne!(a, digest(b"other page"));
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
