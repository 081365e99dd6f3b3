//! Response parsing: fence stripping, strict decoding and tolerant
//! multi-block decoding.
//!
//! Models wrap JSON in ```` ```json ```` fences often enough that every path
//! strips them first. Whole-document responses are decoded strictly, since
//! one response carries one statement and a bad one fails the run. Page-image
//! mode concatenates one response per page, and there a bad block is skipped
//! with a [`BlockWarning`] so the remaining pages still contribute.

use crate::error::{BlockWarning, Fin2XlsxError};
use crate::statement::{ExtractionResult, StatementKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, warn};

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:[A-Za-z][A-Za-z0-9_+\-]*)?\s*").unwrap());

static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").unwrap());

/// Remove a surrounding markdown code fence and trim.
///
/// Handles an optional language tag and repeated (nested) fences. A tag
/// starts with a letter, so content such as ```` ```2024 ```` is kept. Text
/// that does not start with a fence is only trimmed. Applying it twice
/// gives the same result as applying it once.
pub fn strip_markdown_fence(text: &str) -> String {
    let mut s = text.trim().to_string();
    while s.starts_with("```") {
        let body = RE_OPEN_FENCE.replace(&s, "").into_owned();
        s = RE_CLOSE_FENCE.replace(&body, "").trim().to_string();
    }
    s
}

/// Decode one response as a JSON object of statements.
///
/// # Errors
/// [`Fin2XlsxError::Parse`] when the text is not JSON or the top level is
/// not an object. The cleaned text is logged at `error` level first.
pub fn parse(text: &str) -> Result<ExtractionResult, Fin2XlsxError> {
    parse_with_context(text, "response")
}

/// Decode the response to a single-statement query.
///
/// Only the requested statement and the unit are kept; any other lists the
/// model volunteered are dropped.
pub fn parse_statement(kind: StatementKind, text: &str) -> Result<ExtractionResult, Fin2XlsxError> {
    let full = parse_with_context(text, &format!("{kind} response"))?;
    let mut result = ExtractionResult::new();
    if let Some(unit) = full.unit() {
        result.offer_unit(unit);
    }
    match full.statement(kind.title()) {
        Some(table) => result.extend_statement(kind.title(), table.records.iter().cloned()),
        None => warn!("{} response has no \"{}\" key", kind, kind.title()),
    }
    Ok(result)
}

fn parse_with_context(text: &str, context: &str) -> Result<ExtractionResult, Fin2XlsxError> {
    let cleaned = strip_markdown_fence(text);
    let detail = match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => {
            let mut result = ExtractionResult::new();
            result.absorb_object(&map);
            debug!(
                "Parsed {}: {} statements, {} records",
                context,
                result.statements().len(),
                result.total_records()
            );
            return Ok(result);
        }
        Ok(other) => format!("top level is {}, expected an object", json_kind(&other)),
        Err(e) => e.to_string(),
    };
    error!("Unparsable {}: {}\n{}", context, detail, cleaned);
    Err(Fin2XlsxError::Parse {
        context: context.to_string(),
        detail,
    })
}

/// Decode newline-separated JSON blocks, skipping the ones that fail.
///
/// Records of the same statement are concatenated in encounter order and
/// the first unit seen wins.
pub fn parse_blocks(text: &str) -> (ExtractionResult, Vec<BlockWarning>) {
    let mut result = ExtractionResult::new();
    let mut warnings = Vec::new();

    for (i, block) in split_blocks(text).iter().enumerate() {
        let number = i + 1;
        let cleaned = strip_markdown_fence(block);
        let reason = match serde_json::from_str::<Value>(&cleaned) {
            Ok(Value::Object(map)) => {
                result.absorb_object(&map);
                continue;
            }
            Ok(other) => format!("top level is {}, expected an object", json_kind(&other)),
            Err(e) => e.to_string(),
        };
        warn!("Skipping block {}: {}", number, reason);
        warnings.push(BlockWarning {
            block: number,
            reason,
        });
    }

    (result, warnings)
}

/// Split text into candidate JSON blocks.
///
/// A line at brace depth zero ends a block; a multi-line object stays whole
/// until its braces balance. A `{` in column 0 while an object is still
/// open starts a new block (the open one was truncated). Fence lines and
/// blank lines between blocks are separators.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            flush(&mut current, &mut blocks);
            depth = 0;
            continue;
        }
        if depth > 0 && line.starts_with('{') {
            flush(&mut current, &mut blocks);
            depth = 0;
        }
        if depth == 0 && trimmed.is_empty() {
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        depth = brace_depth_after(line, depth);

        if depth == 0 {
            flush(&mut current, &mut blocks);
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

fn flush(current: &mut String, blocks: &mut Vec<String>) {
    if current.trim().is_empty() {
        current.clear();
    } else {
        blocks.push(std::mem::take(current));
    }
}

/// Track `{`/`[` nesting across one line, ignoring brackets inside strings.
fn brace_depth_after(line: &str, mut depth: usize) -> usize {
    let mut in_string = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
