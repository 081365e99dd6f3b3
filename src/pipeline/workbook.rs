//! Workbook assembly: one worksheet per statement.
//!
//! Each sheet is built as a standalone [`Worksheet`] and only pushed into
//! the [`Workbook`] once every cell has been written, so a statement with a
//! malformed record or an unusable name leaves no half-written sheet behind.
//! The other statements are unaffected.

use crate::error::{Fin2XlsxError, SheetError};
use crate::statement::{
    normalize_unit, CellValue, ExtractionResult, StatementTable, FIELD_KEY, METRIC_KEY,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Excel's limit on worksheet name length.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

const LABEL_COLUMN_WIDTH: f64 = 48.0;

static RE_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").unwrap());

/// What ended up in the workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookReport {
    /// Sheet names in workbook order.
    pub sheets: Vec<String>,
    pub sheet_errors: Vec<SheetError>,
}

/// Replace the characters Excel forbids in sheet names and cap the length.
pub fn sheet_name(statement: &str) -> String {
    statement
        .chars()
        .map(|c| match c {
            '/' | '\\' | '[' | ']' | ':' | '*' | '?' => '_',
            other => other,
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect()
}

/// Read a numeric-looking string as a number.
///
/// Accepts thousands separators and accounting negatives: `"1,234.5"`,
/// `"(250)"`, `"-3"`. Anything else is `None`.
pub fn numeric_cell(text: &str) -> Option<f64> {
    let t = text.trim();
    let (negative, body) = match t.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, t),
    };
    if !RE_NUMERIC.is_match(body) {
        return None;
    }
    let value: f64 = body.replace(',', "").parse().ok()?;
    Some(if negative { -value.abs() } else { value })
}

/// Write every non-empty statement of `result` to `output_path`.
///
/// Sheet-level failures are collected in the report. It is an error when
/// no sheet at all could be written (nothing is saved then) or when the
/// file cannot be saved.
pub fn build(result: &ExtractionResult, output_path: &Path) -> Result<WorkbookReport, Fin2XlsxError> {
    let mut workbook = Workbook::new();
    let mut report = WorkbookReport::default();
    let mut used_names: HashSet<String> = HashSet::new();
    let unit = result.unit().map(normalize_unit);

    for table in result.statements() {
        if table.records.is_empty() {
            debug!("Skipping empty statement '{}'", table.name);
            continue;
        }
        let name = sheet_name(&table.name);
        if !used_names.insert(name.to_lowercase()) {
            let err = SheetError::DuplicateName { sheet: name };
            warn!("{}", err);
            report.sheet_errors.push(err);
            continue;
        }
        match build_sheet(table, &name, unit.as_deref()) {
            Ok(sheet) => {
                workbook.push_worksheet(sheet);
                report.sheets.push(name);
            }
            Err(err) => {
                warn!("Could not write sheet: {}", err);
                report.sheet_errors.push(err);
            }
        }
    }

    if report.sheets.is_empty() {
        let detail = match report.sheet_errors.len() {
            0 => "the responses contained no statement rows".to_string(),
            n => format!("all {n} statement sheets failed"),
        };
        return Err(Fin2XlsxError::NoStatements { detail });
    }

    save(&mut workbook, output_path)?;
    info!(
        "Workbook saved to {} ({} sheets, {} failed)",
        output_path.display(),
        report.sheets.len(),
        report.sheet_errors.len()
    );
    Ok(report)
}

fn build_sheet(
    table: &StatementTable,
    name: &str,
    unit: Option<&str>,
) -> Result<Worksheet, SheetError> {
    let rows = table.rows()?;
    let write_err = |e: XlsxError| SheetError::WriteFailed {
        sheet: name.to_string(),
        detail: e.to_string(),
    };

    let mut columns: Vec<&str> = Vec::new();
    for row in &rows {
        for (key, _) in row.fields() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut sheet = Worksheet::new();
    sheet.set_name(name).map_err(write_err)?;

    let header = Format::new().set_bold();
    for (col, key) in columns.iter().enumerate() {
        let title = match unit {
            Some(u) if *key != METRIC_KEY => format!("{key} ({u})"),
            _ => key.to_string(),
        };
        sheet
            .write_string_with_format(0, col as u16, title, &header)
            .map_err(write_err)?;
        if is_label(key) {
            sheet
                .set_column_width(col as u16, LABEL_COLUMN_WIDTH)
                .map_err(write_err)?;
        }
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, key) in columns.iter().enumerate() {
            let c = col as u16;
            let Some(value) = row.get(key) else { continue };
            match value {
                CellValue::Empty => {}
                CellValue::Number(n) if is_label(key) => {
                    sheet.write_string(r, c, n.to_string()).map_err(write_err)?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(r, c, *n).map_err(write_err)?;
                }
                CellValue::Bool(b) => {
                    sheet.write_boolean(r, c, *b).map_err(write_err)?;
                }
                CellValue::Text(s) => match numeric_cell(s).filter(|_| !is_label(key)) {
                    Some(n) => {
                        sheet.write_number(r, c, n).map_err(write_err)?;
                    }
                    None => {
                        sheet.write_string(r, c, s).map_err(write_err)?;
                    }
                },
            }
        }
    }

    debug!("Sheet '{}': {} rows x {} columns", name, rows.len(), columns.len());
    Ok(sheet)
}

fn is_label(key: &str) -> bool {
    key == METRIC_KEY || key == FIELD_KEY
}

/// Serialise to memory, then move into place so a failed save never leaves
/// a truncated workbook at `output_path`.
fn save(workbook: &mut Workbook, output_path: &Path) -> Result<(), Fin2XlsxError> {
    let save_err = |detail: String| Fin2XlsxError::WorkbookSaveFailed {
        path: output_path.to_path_buf(),
        detail,
    };

    let bytes = workbook.save_to_buffer().map_err(|e| save_err(e.to_string()))?;

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Fin2XlsxError::OutputWriteFailed {
        path: dir.clone(),
        source: e,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| save_err(e.to_string()))?;
    tmp.write_all(&bytes).map_err(|e| save_err(e.to_string()))?;
    tmp.persist(output_path)
        .map_err(|e| save_err(e.error.to_string()))?;
    Ok(())
}
