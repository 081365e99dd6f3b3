//! Pipeline stages for document-to-workbook conversion.
//!
//! Each submodule implements one step; [`crate::convert`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ whole document: upload ─▶ poll ─▶ 3 × generate ─┐
//! store ──▶ ─┤                                                   ├─▶ parse ─▶ workbook ─▶ journal
//!            └─ page images:   render ─▶ encode ─▶ N × generate ─┘
//! ```
//!
//! 1. [`store`]: uploads directory, output naming, cache markers
//! 2. [`extract`]: prompts, bounded remote-ingestion polling, generate calls
//! 3. [`render`]: rasterise PDF pages via pdfium in `spawn_blocking`
//! 4. [`encode`]: PNG + base64 inline parts for page-image mode
//! 5. [`parse`]: fence stripping, strict and multi-block JSON decoding
//! 6. [`workbook`]: one sheet per statement, per-sheet failure isolation
//! 7. [`journal`]: append-only tab-separated operation log

pub mod encode;
pub mod extract;
pub mod journal;
pub mod parse;
pub mod render;
pub mod store;
pub mod workbook;
