//! Page rasterisation for page-image mode.
//!
//! pdfium is bound at runtime, from `PDFIUM_LIB_PATH` when set and the
//! system library otherwise. All pdfium calls run inside `spawn_blocking`:
//! the library is synchronous and CPU-bound.
//!
//! `max_rendered_pixels` caps the longest edge of each page regardless of
//! its physical size, which keeps memory bounded on oversized pages.

use crate::error::Fin2XlsxError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_VAR: &str = "PDFIUM_LIB_PATH";

/// Render every page of a PDF, in order.
pub async fn render_pages(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, Fin2XlsxError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pixels))
        .await
        .map_err(|e| Fin2XlsxError::Internal(format!("Render task panicked: {e}")))?
}

fn bind_pdfium() -> Result<Pdfium, Fin2XlsxError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_VAR) {
        Some(p) => {
            let lib = PathBuf::from(p);
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Fin2XlsxError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(pdf_path: &Path, max_pixels: u32) -> Result<Vec<DynamicImage>, Fin2XlsxError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| Fin2XlsxError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Fin2XlsxError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push(image);
    }
    Ok(images)
}
