//! Error types for the fin2xlsx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Fin2XlsxError`]: **Fatal**: the conversion cannot proceed at all
//!   (missing credential, unreadable input, LLM call failed, response was
//!   not JSON). Returned as `Err(Fin2XlsxError)` from
//!   [`crate::convert::Converter::convert`] after the failure has been
//!   written to the operation log.
//!
//! * [`SheetError`]: **Non-fatal**: a single worksheet could not be
//!   written (malformed records, bad name) but the other statements are
//!   fine. Collected in [`crate::output::ConversionOutput::sheet_errors`]
//!   so a partial workbook is still produced.
//!
//! Skipped blocks in multi-page parsing are reported as
//! [`BlockWarning`], which is informational only.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fin2xlsx library.
#[derive(Debug, Error)]
pub enum Fin2XlsxError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The LLM credential is not present in the environment.
    #[error("{var} is not set.\nExport an API key before starting: export {var}=...")]
    MissingCredential { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Upload name or path cannot be used as a file name.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The file type is neither a PDF nor a supported image.
    #[error("Unsupported document type '{mime_type}' for '{path}'\nSupported: PDF, PNG, JPEG, WebP.")]
    UnsupportedFormat { path: PathBuf, mime_type: String },

    /// The file has a `.pdf` extension but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The request never produced an HTTP response (DNS, TLS, timeout…).
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The LLM API answered with a non-success status.
    #[error("LLM API error (status {status}): {message}")]
    LlmApiError { status: u16, message: String },

    /// The LLM API rejected the credential (401/403).
    #[error("Authentication error from the LLM service: {detail}")]
    AuthError { detail: String },

    /// The model answered but the text was empty.
    #[error("No response for {statement}.")]
    EmptyResponse { statement: String },

    /// The provider reported that it could not ingest the uploaded file.
    #[error("Remote processing failed for uploaded file '{name}'")]
    RemoteProcessingFailed { name: String },

    /// The uploaded file was still processing after every poll attempt.
    #[error("Uploaded file '{name}' still processing after {attempts} status checks")]
    RemoteProcessingTimeout { name: String, attempts: u32 },

    /// The caller cancelled the run while it was waiting on the provider.
    #[error("Conversion cancelled while waiting for '{name}'")]
    Cancelled { name: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The LLM text was not a JSON object.
    #[error("Could not parse {context} as JSON: {detail}")]
    Parse { context: String, detail: String },

    // ── Page rendering errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Page-image mode needs PDFium at runtime. Either:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium, or\n\
  • Install libpdfium into a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    /// PDF could not be opened for rendering.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a file under the uploads/output directories.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing usable came back: no statement produced a sheet.
    #[error("No financial statements could be written: {detail}")]
    NoStatements { detail: String },

    /// The assembled workbook could not be saved.
    #[error("Failed to save workbook '{path}': {detail}")]
    WorkbookSaveFailed { path: PathBuf, detail: String },

    /// Appending to the operation log failed. Never escapes the orchestrator.
    #[error("Failed to append to log '{path}': {source}")]
    LogWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Fin2XlsxError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs can carry credentials or upload session ids.
        Fin2XlsxError::Transport(e.without_url().to_string())
    }
}

/// A non-fatal error for a single worksheet.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SheetError {
    /// A record in the statement list is not a JSON object.
    #[error("Sheet '{sheet}': record {index} is not an object")]
    MalformedRecord { sheet: String, index: usize },

    /// Two statement names collapsed to the same sheet title.
    #[error("Sheet '{sheet}': name already used by another statement")]
    DuplicateName { sheet: String },

    /// rust_xlsxwriter rejected the sheet name or a cell.
    #[error("Sheet '{sheet}': {detail}")]
    WriteFailed { sheet: String, detail: String },
}

impl SheetError {
    /// Title of the sheet this error belongs to.
    pub fn sheet(&self) -> &str {
        match self {
            SheetError::MalformedRecord { sheet, .. }
            | SheetError::DuplicateName { sheet }
            | SheetError::WriteFailed { sheet, .. } => sheet,
        }
    }
}

/// A JSON block that was skipped during multi-block parsing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockWarning {
    /// 1-indexed position of the block in the combined text.
    pub block: usize,
    pub reason: String,
}

impl std::fmt::Display for BlockWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block {} skipped: {}", self.block, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_variable() {
        let e = Fin2XlsxError::MissingCredential {
            var: "GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn empty_response_display() {
        let e = Fin2XlsxError::EmptyResponse {
            statement: "Balance Sheet".into(),
        };
        assert_eq!(e.to_string(), "No response for Balance Sheet.");
    }

    #[test]
    fn poll_timeout_display() {
        let e = Fin2XlsxError::RemoteProcessingTimeout {
            name: "files/abc".into(),
            attempts: 30,
        };
        let msg = e.to_string();
        assert!(msg.contains("files/abc"), "got: {msg}");
        assert!(msg.contains("30"), "got: {msg}");
    }

    #[test]
    fn sheet_error_reports_its_sheet() {
        let e = SheetError::MalformedRecord {
            sheet: "Balance Sheet".into(),
            index: 2,
        };
        assert_eq!(e.sheet(), "Balance Sheet");
        assert!(e.to_string().contains("record 2"));
    }

    #[test]
    fn block_warning_display() {
        let w = BlockWarning {
            block: 2,
            reason: "expected value".into(),
        };
        assert_eq!(w.to_string(), "block 2 skipped: expected value");
    }
}
