//! Result types returned by a conversion.

use crate::error::{BlockWarning, SheetError};
use crate::statement::SchemaReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a successful [`crate::convert::Converter::convert`] call produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Path of the workbook, freshly written or served from the cache.
    pub output_path: PathBuf,

    /// True when the workbook was reused without calling the LLM.
    pub cache_hit: bool,

    /// Titles of the sheets that were written, in workbook order.
    /// Empty on a cache hit (the cached workbook is not re-read).
    pub sheets: Vec<String>,

    /// Statements that could not be written as a sheet.
    pub sheet_errors: Vec<SheetError>,

    /// Blocks skipped by the multi-block parser (page-image mode only).
    pub warnings: Vec<BlockWarning>,

    /// Missing statements and unlabeled rows. Default (clean) on a cache hit.
    pub schema_report: SchemaReport,

    pub stats: ConversionStats,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Source document size in bytes.
    pub source_size: u64,
    /// Size of the workbook on disk after the run.
    pub output_size: u64,
    /// Number of generate-content calls made.
    pub llm_calls: usize,
    /// Pages rendered in page-image mode; 0 in whole-document mode.
    pub pages: usize,
    /// Records across all statements before sheet assembly.
    pub total_records: usize,
    pub extract_duration_ms: u64,
    pub build_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ConversionOutput {
    /// An output for a cache hit: path and sizes only.
    pub(crate) fn cached(output_path: PathBuf, source_size: u64, output_size: u64, elapsed_ms: u64) -> Self {
        Self {
            output_path,
            cache_hit: true,
            sheets: Vec::new(),
            sheet_errors: Vec::new(),
            warnings: Vec::new(),
            schema_report: SchemaReport::default(),
            stats: ConversionStats {
                source_size,
                output_size,
                total_duration_ms: elapsed_ms,
                ..Default::default()
            },
        }
    }

    /// File name component of the workbook path, for download links.
    pub fn file_name(&self) -> Option<&str> {
        self.output_path.file_name().and_then(|n| n.to_str())
    }
}
