//! # fin2xlsx
//!
//! Convert financial-report PDFs and images into Excel workbooks using a
//! hosted LLM (Google Gemini).
//!
//! The report is uploaded to the provider and the model is asked, one
//! statement at a time, for the income statement, balance sheet and cash
//! flow statement as JSON. The JSON is parsed and written as one worksheet
//! per statement. A sidecar marker caches the workbook against the source
//! size, and every processed run is appended to a tab-separated log.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document (PDF / PNG / JPEG / WebP)
//!  │
//!  ├─ 1. Store     save upload, derive output/<stem>.xlsx, consult cache marker
//!  ├─ 2. Extract   upload + poll, one generate call per statement
//!  │               (page-image mode: render pages, one call per page)
//!  ├─ 3. Parse     strip fences, decode JSON, merge statements
//!  ├─ 4. Build     one sheet per statement, failures isolated per sheet
//!  └─ 5. Log       append name/size/status/output/size/timestamp
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fin2xlsx::{ConvertOptions, Converter, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY; fails fast when it is missing.
//!     let converter = Converter::from_env(PipelineConfig::default())?;
//!     let output = converter
//!         .convert("uploads/acme_2024.pdf", &ConvertOptions::default())
//!         .await?;
//!     println!("{} (cached: {})", output.output_path.display(), output.cache_hit);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `fin2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | Adds `--serve`: an axum upload page and JSON API |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fin2xlsx = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod gemini;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod statement;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CacheIdentity, ExtractionMode, PipelineConfig, PipelineConfigBuilder, PollPolicy, DEFAULT_MODEL,
};
pub use convert::{convert_sync, ConvertOptions, Converter};
pub use error::{BlockWarning, Fin2XlsxError, SheetError};
pub use gemini::{DocumentPart, FileState, GeminiClient, LlmService, RemoteFile};
pub use output::{ConversionOutput, ConversionStats};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, PipelineState, ProgressCallback};
pub use statement::{
    normalize_unit, CellValue, ExtractionResult, RowRecord, SchemaReport, StatementKind,
    StatementTable,
};
pub use tokio_util::sync::CancellationToken;
