//! Integration tests for the conversion pipeline.
//!
//! A scripted in-memory [`LlmService`] stands in for Gemini, so these run
//! offline. Every test works in its own temporary directory and reads the
//! produced workbook back with calamine.

use async_trait::async_trait;
use calamine::{open_workbook, Data, Reader, Xlsx};
use fin2xlsx::{
    ConversionProgressCallback, ConvertOptions, Converter, DocumentPart, ExtractionMode,
    FileState, Fin2XlsxError, LlmService, PipelineConfig, PipelineState, RemoteFile, SheetError,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers generate calls from a queue, in order.
#[derive(Default)]
struct ScriptedService {
    replies: Mutex<VecDeque<Result<String, Fin2XlsxError>>>,
    uploads: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl ScriptedService {
    fn with_replies<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let svc = Self::default();
        svc.push(replies);
        Arc::new(svc)
    }

    fn push<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(|r| Ok(r.into())));
    }

    fn push_err(&self, err: Fin2XlsxError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn remote(state: FileState) -> RemoteFile {
        RemoteFile {
            name: "files/report".into(),
            uri: "https://example.invalid/v1beta/files/report".into(),
            mime_type: "application/pdf".into(),
            state,
        }
    }
}

#[async_trait]
impl LlmService for ScriptedService {
    async fn upload(&self, _: Vec<u8>, _: &str, _: &str) -> Result<RemoteFile, Fin2XlsxError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(Self::remote(FileState::Processing))
    }

    async fn get_file(&self, _: &str) -> Result<RemoteFile, Fin2XlsxError> {
        Ok(Self::remote(FileState::Active))
    }

    async fn generate(&self, _: &str, _: &str, _: &DocumentPart) -> Result<String, Fin2XlsxError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    fn config(&self, mode: ExtractionMode) -> PipelineConfig {
        PipelineConfig::builder()
            .uploads_dir(self.root.join("uploads"))
            .output_dir(self.root.join("output"))
            .log_path(self.root.join("convert_pdf_log.txt"))
            .mode(mode)
            .poll_interval_ms(1)
            .max_poll_attempts(5)
            .build()
            .unwrap()
    }

    fn converter(&self, mode: ExtractionMode, svc: &Arc<ScriptedService>) -> Converter {
        Converter::new(self.config(mode), svc.clone() as Arc<dyn LlmService>)
    }

    /// A file that passes the PDF magic check, `size` bytes long.
    fn write_pdf(&self, name: &str, size: usize) -> PathBuf {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(size, b' ');
        self.write(name, &bytes)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let dir = self.root.join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("convert_pdf_log.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn marker(output: &Path) -> String {
    let mut s = output.as_os_str().to_os_string();
    s.push(".size");
    std::fs::read_to_string(PathBuf::from(s)).unwrap()
}

fn read_sheet(path: &Path, name: &str) -> calamine::Range<Data> {
    let mut wb: Xlsx<_> = open_workbook(path).unwrap();
    wb.worksheet_range(name).unwrap()
}

fn sheet_names(path: &Path) -> Vec<String> {
    let wb: Xlsx<_> = open_workbook(path).unwrap();
    wb.sheet_names().to_vec()
}

const INCOME: &str = r#"```json
{"unit": "USD in Millions", "Income Statement": [
  {"Metric": "Revenue", "2024": 1200, "2023": "1,050"},
  {"Metric": "Net Income", "2024": "(35)", "2023": 80}
]}
```"#;

const BALANCE: &str =
    r#"{"Balance Sheet": [{"Metric": "Cash", "2024": 300}, {"Metric": "Inventory", "2024": 120}]}"#;

const CASH_FLOW: &str =
    r#"{"Cash Flow Statement": [{"Metric": "Operating Cash Flow", "2024": 410}]}"#;

// ── Whole-document mode ──────────────────────────────────────────────────────

#[tokio::test]
async fn three_statements_become_three_sheets_in_order() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme_2024.pdf", 120_000);

    let out = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    assert!(!out.cache_hit);
    assert_eq!(out.output_path, ws.root.join("output").join("acme_2024.xlsx"));
    assert_eq!(svc.calls(), 3);
    assert_eq!(svc.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(
        out.sheets,
        vec!["Income Statement", "Balance Sheet", "Cash Flow Statement"]
    );
    assert_eq!(
        sheet_names(&out.output_path),
        vec!["Income Statement", "Balance Sheet", "Cash Flow Statement"]
    );
    assert_eq!(marker(&out.output_path).lines().next(), Some("120000"));
    assert_eq!(out.stats.llm_calls, 3);
    assert_eq!(out.stats.total_records, 5);
    assert!(out.schema_report.is_clean());

    let log = ws.log_lines();
    assert_eq!(log.len(), 1);
    let fields: Vec<&str> = log[0].split('\t').collect();
    assert_eq!(&fields[..4], &["acme_2024.pdf", "120000", "succeed", "acme_2024.xlsx"]);
    assert!(fields[4].parse::<u64>().unwrap() > 0);
    assert_eq!(fields[5].len(), "2024-01-01 00:00:00".len());
}

#[tokio::test]
async fn cells_carry_units_and_numbers() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 2_000);

    let out = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    let range = read_sheet(&out.output_path, "Income Statement");
    assert_eq!(range.get_value((0, 0)), Some(&Data::String("Metric".into())));
    assert_eq!(
        range.get_value((0, 1)),
        Some(&Data::String("2024 (millions)".into()))
    );
    assert_eq!(range.get_value((1, 0)), Some(&Data::String("Revenue".into())));
    assert_eq!(range.get_value((1, 1)), Some(&Data::Float(1200.0)));
    assert_eq!(range.get_value((1, 2)), Some(&Data::Float(1050.0)));
    assert_eq!(range.get_value((2, 1)), Some(&Data::Float(-35.0)));
}

#[tokio::test]
async fn unchanged_size_is_served_from_cache() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 4_096);

    let first = assert_ok!(converter.convert(&input, &ConvertOptions::default()).await);
    let second = assert_ok!(converter.convert(&input, &ConvertOptions::default()).await);

    assert!(second.cache_hit);
    assert_eq!(second.output_path, first.output_path);
    assert_eq!(svc.calls(), 3, "cache hit must not call the model");
    assert_eq!(svc.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(ws.log_lines().len(), 1, "cache hits are not logged");
}

#[tokio::test]
async fn size_change_reextracts_and_rewrites_marker() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 4_096);

    let first = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();
    assert_eq!(marker(&first.output_path).lines().next(), Some("4096"));

    ws.write_pdf("acme.pdf", 5_000);
    svc.push([INCOME, BALANCE, CASH_FLOW]);
    let second = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    assert!(!second.cache_hit);
    assert_eq!(svc.calls(), 6);
    assert_eq!(marker(&second.output_path).lines().next(), Some("5000"));
    assert_eq!(ws.log_lines().len(), 2);
}

#[tokio::test]
async fn force_skips_a_valid_cache() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 4_096);

    converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();
    svc.push([INCOME, BALANCE, CASH_FLOW]);
    let again = converter
        .convert(&input, &ConvertOptions::forced())
        .await
        .unwrap();

    assert!(!again.cache_hit);
    assert_eq!(svc.calls(), 6);
}

#[tokio::test]
async fn empty_response_fails_the_run_and_is_logged() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, "  "]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 2_048);

    let err = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "No response for Balance Sheet.");
    assert_eq!(svc.calls(), 2, "no call after the failing statement");
    assert!(!ws.root.join("output").join("acme.xlsx").exists());

    let log = ws.log_lines();
    assert_eq!(log.len(), 1);
    let fields: Vec<&str> = log[0].split('\t').collect();
    assert_eq!(&fields[..5], &["acme.pdf", "2048", "failed", "", "0"]);
}

#[tokio::test]
async fn api_errors_are_logged_as_failed() {
    let ws = Workspace::new();
    let svc = Arc::new(ScriptedService::default());
    svc.push_err(Fin2XlsxError::LlmApiError {
        status: 500,
        message: "internal".into(),
    });
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 1_024);

    let err = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Fin2XlsxError::LlmApiError { status: 500, .. }));
    assert!(ws.log_lines()[0].contains("\tfailed\t"));
}

#[tokio::test]
async fn unparsable_response_is_a_parse_error() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, "I could not find a balance sheet.", CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("acme.pdf", 1_024);

    let err = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Fin2XlsxError::Parse { .. }));
    assert_eq!(ws.log_lines().len(), 1);
}

#[tokio::test]
async fn uploads_are_saved_then_converted() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.resize(3_000, b'0');

    let out = converter
        .convert_upload(&bytes, "C:\\Users\\me\\Q4 report.pdf", &ConvertOptions::default())
        .await
        .unwrap();

    assert!(ws.root.join("uploads").join("Q4 report.pdf").exists());
    assert_eq!(out.file_name(), Some("Q4 report.xlsx"));
}

#[tokio::test]
async fn input_errors_are_not_logged() {
    let ws = Workspace::new();
    let svc = Arc::new(ScriptedService::default());
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let notes = ws.write("notes.txt", b"hello");
    let fake = ws.write("fake.pdf", b"<html></html>");

    let err = assert_err!(converter.convert(&notes, &ConvertOptions::default()).await);
    assert!(matches!(err, Fin2XlsxError::UnsupportedFormat { .. }));

    let err = assert_err!(converter.convert(&fake, &ConvertOptions::default()).await);
    assert!(matches!(err, Fin2XlsxError::NotAPdf { .. }));

    assert_eq!(svc.calls(), 0);
    assert!(ws.log_lines().is_empty());
}

// ── Page-image mode (image input, sent inline) ───────────────────────────────

fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(512, 0);
    bytes
}

#[tokio::test]
async fn page_mode_keeps_valid_blocks() {
    let ws = Workspace::new();
    let reply = concat!(
        "{\"Balance Sheet\": [{\"Metric\": \"Cash\", \"2024\": 10}]}\n",
        "Here is the rest of the statement:\n",
        "{\"Balance Sheet\": [{\"Metric\": \"Inventory\", \"2024\": 4}], \"unit\": \"thousands of dollars\"}\n",
    );
    let svc = ScriptedService::with_replies([reply]);
    let converter = ws.converter(ExtractionMode::PageImages, &svc);
    let input = ws.write("scan.png", &png_bytes());

    let out = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    assert_eq!(svc.calls(), 1);
    assert_eq!(svc.uploads.load(Ordering::SeqCst), 0, "images are sent inline");
    assert_eq!(out.sheets, vec!["Balance Sheet"]);
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.warnings[0].block, 2);

    let range = read_sheet(&out.output_path, "Balance Sheet");
    assert_eq!(
        range.get_value((0, 1)),
        Some(&Data::String("2024 (thousands)".into()))
    );
    assert_eq!(range.get_value((1, 0)), Some(&Data::String("Cash".into())));
    assert_eq!(range.get_value((2, 0)), Some(&Data::String("Inventory".into())));
    assert_eq!(
        out.schema_report.missing_statements,
        vec!["Income Statement", "Cash Flow Statement"]
    );
}

#[tokio::test]
async fn long_statement_names_are_truncated() {
    let ws = Workspace::new();
    let long_name: String = "Profit/Loss and Other Comprehensive Income"
        .chars()
        .take(40)
        .collect();
    assert_eq!(long_name.chars().count(), 40);
    let reply = format!(r#"{{"{long_name}": [{{"Metric": "OCI", "2024": 5}}]}}"#);
    let svc = ScriptedService::with_replies([reply]);
    let converter = ws.converter(ExtractionMode::PageImages, &svc);
    let input = ws.write("scan.png", &png_bytes());

    let out = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    let expected: String = long_name.replace('/', "_").chars().take(31).collect();
    assert_eq!(expected, "Profit_Loss and Other Comprehen");
    assert_eq!(out.sheets, vec![expected.clone()]);
    assert_eq!(sheet_names(&out.output_path), vec![expected]);
}

#[tokio::test]
async fn malformed_statement_does_not_block_the_others() {
    let ws = Workspace::new();
    let reply = concat!(
        "{\"Income Statement\": [{\"Metric\": \"Revenue\", \"2024\": 100}],",
        " \"Balance Sheet\": [{\"Metric\": \"Cash\"}, 42],",
        " \"Cash Flow Statement\": [{\"Metric\": \"Capex\", \"2024\": -7}]}",
    );
    let svc = ScriptedService::with_replies([reply]);
    let converter = ws.converter(ExtractionMode::PageImages, &svc);
    let input = ws.write("scan.jpg", &png_bytes());

    let out = converter
        .convert(&input, &ConvertOptions::default())
        .await
        .unwrap();

    assert_eq!(out.sheets, vec!["Income Statement", "Cash Flow Statement"]);
    assert_eq!(
        out.sheet_errors,
        vec![SheetError::MalformedRecord {
            sheet: "Balance Sheet".into(),
            index: 1,
        }]
    );
    assert_eq!(
        sheet_names(&out.output_path),
        vec!["Income Statement", "Cash Flow Statement"]
    );
    assert!(ws.log_lines()[0].contains("\tsucceed\t"));
}

#[tokio::test]
async fn blank_pages_only_fail_the_run() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([""]);
    let converter = ws.converter(ExtractionMode::PageImages, &svc);
    let input = ws.write("blank.webp", &png_bytes());

    let err = assert_err!(converter.convert(&input, &ConvertOptions::default()).await);

    assert!(matches!(err, Fin2XlsxError::NoStatements { .. }));
    let output = ws.root.join("output").join("blank.xlsx");
    assert!(!output.exists());
    assert!(!PathBuf::from(format!("{}.size", output.display())).exists());
    assert!(ws.log_lines()[0].contains("\tfailed\t"));
}

#[tokio::test]
async fn responses_without_statement_keys_are_not_cached() {
    let ws = Workspace::new();
    let wrong_key = r#"{"IncomeStatement": [{"Metric": "Revenue", "2024": 1}]}"#;
    let svc = ScriptedService::with_replies([wrong_key, wrong_key, wrong_key]);
    let converter = ws.converter(ExtractionMode::WholeDocument, &svc);
    let input = ws.write_pdf("a.pdf", 1_024);

    let err = assert_err!(converter.convert(&input, &ConvertOptions::default()).await);
    assert!(matches!(err, Fin2XlsxError::NoStatements { .. }));

    svc.push([INCOME, BALANCE, CASH_FLOW]);
    let out = assert_ok!(converter.convert(&input, &ConvertOptions::default()).await);
    assert!(!out.cache_hit, "a failed run must not leave a cache marker");
    assert_eq!(svc.calls(), 6);

    let log = ws.log_lines();
    assert_eq!(log.len(), 2);
    assert!(log[0].contains("\tfailed\t"));
    assert!(log[1].contains("\tsucceed\t"));
}

// ── Operation log and progress ───────────────────────────────────────────────

/// Keeps every state it is shown, in order.
#[derive(Default)]
struct RecordingCallback {
    states: Mutex<Vec<PipelineState>>,
    completed: Mutex<Option<(bool, bool)>>,
}

impl ConversionProgressCallback for RecordingCallback {
    fn on_state(&self, state: &PipelineState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn on_conversion_complete(&self, success: bool, cache_hit: bool) {
        *self.completed.lock().unwrap() = Some((success, cache_hit));
    }
}

#[tokio::test]
async fn unwritable_log_does_not_fail_the_run() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, BALANCE, CASH_FLOW]);
    let config = PipelineConfig::builder()
        .uploads_dir(ws.root.join("uploads"))
        .output_dir(ws.root.join("output"))
        .log_path(ws.root.join("missing").join("dir").join("log.txt"))
        .poll_interval_ms(1)
        .build()
        .unwrap();
    let converter = Converter::new(config, svc.clone() as Arc<dyn LlmService>);
    let input = ws.write_pdf("acme.pdf", 4_096);

    let out = assert_ok!(converter.convert(&input, &ConvertOptions::default()).await);

    assert!(out.output_path.exists());
    assert_eq!(out.sheets.len(), 3);
    assert_eq!(marker(&out.output_path).lines().next(), Some("4096"));
    assert!(!ws.root.join("missing").exists());
}

#[tokio::test]
async fn failed_run_reports_failed_then_logged() {
    let ws = Workspace::new();
    let svc = ScriptedService::with_replies([INCOME, ""]);
    let recorder = Arc::new(RecordingCallback::default());
    let config = PipelineConfig::builder()
        .uploads_dir(ws.root.join("uploads"))
        .output_dir(ws.root.join("output"))
        .log_path(ws.root.join("convert_pdf_log.txt"))
        .poll_interval_ms(1)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let converter = Converter::new(config, svc.clone() as Arc<dyn LlmService>);
    let input = ws.write_pdf("acme.pdf", 2_048);

    assert_err!(converter.convert(&input, &ConvertOptions::default()).await);

    let states = recorder.states.lock().unwrap().clone();
    assert_eq!(states.first(), Some(&PipelineState::CacheCheck));
    let tail = &states[states.len() - 2..];
    assert!(
        matches!(tail[0], PipelineState::Failed { ref reason } if reason == "No response for Balance Sheet."),
        "{states:?}"
    );
    assert_eq!(tail[1], PipelineState::Logged);
    assert!(!states.contains(&PipelineState::Done));
    assert!(!states.contains(&PipelineState::Building));
    assert_eq!(*recorder.completed.lock().unwrap(), Some((false, false)));
}

// ── Construction ─────────────────────────────────────────────────────────────

#[test]
fn missing_credential_fails_at_startup() {
    std::env::remove_var("GEMINI_API_KEY");
    let err = Converter::from_env(PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, Fin2XlsxError::MissingCredential { .. }));
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}
