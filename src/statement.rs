//! Statement model: kinds, the merged extraction result, typed rows.
//!
//! The LLM returns loosely-typed JSON: a mapping of statement name to a
//! list of row objects whose keys are whatever the model decided to emit
//! (`"Metric"` plus one key per fiscal year, or `"Field"`/`"Value"`
//! pairs). [`ExtractionResult`] keeps those records raw and in encounter
//! order; [`StatementTable::rows`] turns them into ordered key/value
//! [`RowRecord`]s when a sheet is written, so a malformed statement fails
//! only its own sheet. [`ExtractionResult::validate`] reports missing
//! statements and unlabeled rows without blocking the workbook.

use crate::error::SheetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key of the label column in the statement schema.
pub const METRIC_KEY: &str = "Metric";
/// Alternative label column used by key/value shaped rows.
pub const FIELD_KEY: &str = "Field";
/// Top-level key carrying the unit of measure.
pub const UNIT_KEY: &str = "unit";

/// One of the three financial tables extracted from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::IncomeStatement,
        StatementKind::BalanceSheet,
        StatementKind::CashFlow,
    ];

    /// The JSON key (and sheet title) the prompts ask the model to use.
    pub fn title(self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::CashFlow => "Cash Flow Statement",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Records of one statement, raw and in encounter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTable {
    pub name: String,
    pub records: Vec<Value>,
}

impl StatementTable {
    /// Typed view of the records. Fails on the first record that is not an
    /// object.
    pub fn rows(&self) -> Result<Vec<RowRecord>, SheetError> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, value)| {
                RowRecord::from_value(value).ok_or_else(|| SheetError::MalformedRecord {
                    sheet: self.name.clone(),
                    index,
                })
            })
            .collect()
    }
}

/// Merged statements extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    statements: Vec<StatementTable>,
    unit: Option<String>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[StatementTable] {
        &self.statements
    }

    pub fn statement(&self, name: &str) -> Option<&StatementTable> {
        self.statements.iter().find(|t| t.name == name)
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Set the unit unless one is already known (first unit wins).
    pub fn offer_unit(&mut self, unit: &str) {
        if self.unit.is_none() && !unit.trim().is_empty() {
            self.unit = Some(unit.to_string());
        }
    }

    /// Append records to a statement, creating it on first sight.
    pub fn extend_statement(&mut self, name: &str, records: impl IntoIterator<Item = Value>) {
        match self.statements.iter_mut().find(|t| t.name == name) {
            Some(table) => table.records.extend(records),
            None => self.statements.push(StatementTable {
                name: name.to_string(),
                records: records.into_iter().collect(),
            }),
        }
    }

    /// Merge a decoded JSON object: every list-valued key is a statement,
    /// a string `"unit"` is the unit, anything else is ignored.
    pub fn absorb_object(&mut self, object: &serde_json::Map<String, Value>) {
        for (key, value) in object {
            match value {
                Value::Array(items) => self.extend_statement(key, items.iter().cloned()),
                Value::String(s) if key == UNIT_KEY => self.offer_unit(s),
                _ => tracing::debug!("Ignoring non-statement key '{}'", key),
            }
        }
    }

    /// Merge another result into this one, statement by statement.
    pub fn merge(&mut self, other: ExtractionResult) {
        if let Some(unit) = other.unit.as_deref() {
            self.offer_unit(unit);
        }
        for table in other.statements {
            self.extend_statement(&table.name, table.records);
        }
    }

    pub fn total_records(&self) -> usize {
        self.statements.iter().map(|t| t.records.len()).sum()
    }

    /// Check the result against the statements that were asked for.
    pub fn validate(&self, expected: &[StatementKind]) -> SchemaReport {
        let missing_statements = expected
            .iter()
            .filter(|kind| {
                self.statement(kind.title())
                    .map_or(true, |t| t.records.is_empty())
            })
            .map(|kind| kind.title().to_string())
            .collect();

        let mut unlabeled_rows = Vec::new();
        for table in &self.statements {
            let rows: Vec<usize> = table
                .records
                .iter()
                .enumerate()
                .filter(|(_, record)| {
                    record.as_object().map_or(true, |o| {
                        !o.contains_key(METRIC_KEY) && !o.contains_key(FIELD_KEY)
                    })
                })
                .map(|(i, _)| i)
                .collect();
            if !rows.is_empty() {
                unlabeled_rows.push(UnlabeledRows {
                    statement: table.name.clone(),
                    rows,
                });
            }
        }

        SchemaReport {
            missing_statements,
            unlabeled_rows,
        }
    }
}

/// Outcome of [`ExtractionResult::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaReport {
    /// Titles of expected statements with no rows.
    pub missing_statements: Vec<String>,
    /// Rows lacking both a `"Metric"` and a `"Field"` key.
    pub unlabeled_rows: Vec<UnlabeledRows>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlabeledRows {
    pub statement: String,
    /// 0-indexed record positions.
    pub rows: Vec<usize>,
}

impl SchemaReport {
    pub fn is_clean(&self) -> bool {
        self.missing_statements.is_empty() && self.unlabeled_rows.is_empty()
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::String(s) if s.is_empty() => CellValue::Empty,
            Value::String(s) => CellValue::Text(s.clone()),
            nested => CellValue::Text(nested.to_string()),
        }
    }
}

/// One row as ordered `(field, value)` pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowRecord {
    fields: Vec<(String, CellValue)>,
}

impl RowRecord {
    /// `None` if `value` is not a JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            fields: object
                .iter()
                .map(|(k, v)| (k.clone(), CellValue::from_json(v)))
                .collect(),
        })
    }

    pub fn fields(&self) -> &[(String, CellValue)] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Collapse a unit-of-measure description to a short header suffix.
///
/// `"USD in Millions"` → `"millions"`, `"thousands of dollars"` →
/// `"thousands"`; anything else is returned lowercased.
pub fn normalize_unit(unit: &str) -> String {
    let lower = unit.to_lowercase();
    if lower.contains("million") {
        "millions".to_string()
    } else if lower.contains("thousand") {
        "thousands".to_string()
    } else if lower.contains("billion") {
        "billions".to_string()
    } else {
        lower
    }
}
