//! Image encoding: `DynamicImage` → base64 PNG [`DocumentPart`].
//!
//! Rendered pages travel inline in the generate request, so each page is
//! PNG-encoded (lossless; digits in small table cells stay legible) and
//! base64-wrapped.

use crate::gemini::DocumentPart;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as an inline PNG part.
pub fn encode_page(img: &DynamicImage) -> Result<DocumentPart, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data = STANDARD.encode(&buf);
    debug!("Encoded page {}x{} → {} bytes base64", img.width(), img.height(), data.len());

    Ok(DocumentPart::InlineImage {
        data,
        mime_type: "image/png".to_string(),
    })
}

/// Wrap an image file's bytes as-is; the provider accepts PNG, JPEG and WebP.
pub fn encode_image_bytes(bytes: &[u8], mime_type: &str) -> DocumentPart {
    DocumentPart::InlineImage {
        data: STANDARD.encode(bytes),
        mime_type: mime_type.to_string(),
    }
}
