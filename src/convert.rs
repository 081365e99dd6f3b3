//! Conversion entry points: the pipeline orchestrator.
//!
//! A [`Converter`] owns the configuration, the LLM service, the document
//! store and the operation log. One call to [`Converter::convert`] walks
//! the state machine
//!
//! ```text
//! CacheCheck ─┬─▶ CacheHit ─────────────────────────────────────────▶ Done
//!             └─▶ CacheMiss ─▶ Extracting ─▶ Parsing ─▶ Building ─▶ Logged ─▶ Done
//!                                   └──────────┴──────────┴─▶ Failed ─▶ Logged ─▶ Err
//! ```
//!
//! Every run that reaches extraction appends exactly one log line, success
//! or failure. Cache hits are not logged.

use crate::config::{ExtractionMode, PipelineConfig};
use crate::error::Fin2XlsxError;
use crate::gemini::{DocumentPart, GeminiClient, LlmService};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::extract::StatementExtractor;
use crate::pipeline::journal::{LogEntry, OperationLog, RunStatus};
use crate::pipeline::store::{DocumentStore, UploadedDocument};
use crate::pipeline::{encode, parse, render, workbook};
use crate::progress::PipelineState;
use crate::statement::ExtractionResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Reprocess even when a valid cached workbook exists.
    pub force: bool,
    /// Cancels the remote-ingestion wait when fired.
    pub cancel: Option<CancellationToken>,
}

impl ConvertOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// Runs conversions against one configuration and one LLM service.
///
/// Cheap to share behind an `Arc`; concurrent calls serialise only on the
/// operation log.
pub struct Converter {
    config: PipelineConfig,
    service: Arc<dyn LlmService>,
    store: DocumentStore,
    log: OperationLog,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Everything the extraction half of a run produced.
struct Extraction {
    result: ExtractionResult,
    warnings: Vec<crate::error::BlockWarning>,
    llm_calls: usize,
    pages: usize,
}

impl Converter {
    pub fn new(config: PipelineConfig, service: Arc<dyn LlmService>) -> Self {
        let store = DocumentStore::new(
            config.uploads_dir.clone(),
            config.output_dir.clone(),
            config.cache_identity,
        );
        let log = OperationLog::new(config.log_path.clone());
        Self {
            config,
            service,
            store,
            log,
        }
    }

    /// Build a converter backed by a [`GeminiClient`] read from the environment.
    ///
    /// # Errors
    /// [`Fin2XlsxError::MissingCredential`] when `GEMINI_API_KEY` is not set.
    pub fn from_env(config: PipelineConfig) -> Result<Self, Fin2XlsxError> {
        let client = GeminiClient::from_env(Duration::from_secs(config.api_timeout_secs))?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn emit(&self, state: PipelineState) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_state(&state);
        }
    }

    /// Save uploaded bytes to the uploads directory, then convert them.
    pub async fn convert_upload(
        &self,
        bytes: &[u8],
        name: &str,
        options: &ConvertOptions,
    ) -> Result<ConversionOutput, Fin2XlsxError> {
        let path = self.store.save(bytes, name).await?;
        self.convert(&path, options).await
    }

    /// Convert the document at `path` into `output/<stem>.xlsx`.
    ///
    /// # Errors
    /// Input errors are returned before the cache check and are not logged.
    /// Any error after a cache miss is logged with status `failed` first.
    pub async fn convert(
        &self,
        path: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> Result<ConversionOutput, Fin2XlsxError> {
        let start = Instant::now();
        let document = UploadedDocument::open(path).await?;
        let output_path = self.store.resolve_output_path(&document.path);
        info!(
            "Starting conversion: {} ({} bytes, {})",
            document.path.display(),
            document.size,
            document.mime_type
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(&document.file_name());
        }

        if options.force {
            info!("Reprocessing requested; cache not consulted");
        } else {
            self.emit(PipelineState::CacheCheck);
            if self.store.check_cache(&document.path, &output_path).await {
                self.emit(PipelineState::CacheHit);
                info!("Cache hit: reusing {}", output_path.display());
                let output_size = file_size(&output_path).await;
                self.emit(PipelineState::Done);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_complete(true, true);
                }
                return Ok(ConversionOutput::cached(
                    output_path,
                    document.size,
                    output_size,
                    start.elapsed().as_millis() as u64,
                ));
            }
            self.emit(PipelineState::CacheMiss);
        }

        let outcome = self.run(&document, &output_path, options, start).await;

        let entry = match &outcome {
            Ok(out) => LogEntry {
                source_name: document.file_name(),
                source_size: document.size,
                status: RunStatus::Succeed,
                output_name: out.file_name().unwrap_or_default().to_string(),
                output_size: out.stats.output_size,
                timestamp: chrono::Local::now(),
            },
            Err(e) => {
                warn!("Conversion failed: {}", e);
                self.emit(PipelineState::Failed {
                    reason: e.to_string(),
                });
                LogEntry {
                    source_name: document.file_name(),
                    source_size: document.size,
                    status: RunStatus::Failed,
                    output_name: String::new(),
                    output_size: 0,
                    timestamp: chrono::Local::now(),
                }
            }
        };
        match self.log.append(&entry).await {
            Ok(()) => debug!("Logged {} as {}", entry.source_name, entry.status.as_str()),
            Err(e) => warn!("Failed to write log: {}", e),
        }
        self.emit(PipelineState::Logged);

        if outcome.is_ok() {
            self.emit(PipelineState::Done);
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(outcome.is_ok(), false);
        }
        outcome
    }

    /// Extract, parse, build and record the cache marker.
    async fn run(
        &self,
        document: &UploadedDocument,
        output_path: &Path,
        options: &ConvertOptions,
        start: Instant,
    ) -> Result<ConversionOutput, Fin2XlsxError> {
        let mut extractor = StatementExtractor::new(
            Arc::clone(&self.service),
            self.config.model.clone(),
            self.config.poll_policy(),
        )
        .with_progress(self.config.progress_callback.clone());
        if let Some(ref token) = options.cancel {
            extractor = extractor.with_cancellation(token.clone());
        }

        let extract_start = Instant::now();
        let extraction = match self.config.mode {
            ExtractionMode::WholeDocument => self.extract_document(&extractor, document).await?,
            ExtractionMode::PageImages => self.extract_pages(&extractor, document).await?,
        };
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

        let schema_report = extraction.result.validate(&self.config.statements);
        if !schema_report.is_clean() {
            warn!(
                "Schema check: missing {:?}, {} statements with unlabeled rows",
                schema_report.missing_statements,
                schema_report.unlabeled_rows.len()
            );
        }
        let total_records = extraction.result.total_records();

        self.emit(PipelineState::Building);
        let build_start = Instant::now();
        let result = extraction.result;
        let target = output_path.to_path_buf();
        let report = tokio::task::spawn_blocking(move || workbook::build(&result, &target))
            .await
            .map_err(|e| Fin2XlsxError::Internal(format!("Workbook task panicked: {e}")))??;
        let build_duration_ms = build_start.elapsed().as_millis() as u64;

        match self.store.identify(&document.path).await {
            Ok(record) => {
                if let Err(e) = self.store.record_cache(output_path, &record).await {
                    warn!("Cache marker not written: {}", e);
                }
            }
            Err(e) => warn!("Cache marker not written: {}", e),
        }

        let output_size = file_size(output_path).await;
        let stats = ConversionStats {
            source_size: document.size,
            output_size,
            llm_calls: extraction.llm_calls,
            pages: extraction.pages,
            total_records,
            extract_duration_ms,
            build_duration_ms,
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Conversion complete: {} sheets, {} records, {}ms total",
            report.sheets.len(),
            total_records,
            stats.total_duration_ms
        );

        Ok(ConversionOutput {
            output_path: output_path.to_path_buf(),
            cache_hit: false,
            sheets: report.sheets,
            sheet_errors: report.sheet_errors,
            warnings: extraction.warnings,
            schema_report,
            stats,
        })
    }

    /// Upload once, then ask for each configured statement in turn.
    async fn extract_document(
        &self,
        extractor: &StatementExtractor,
        document: &UploadedDocument,
    ) -> Result<Extraction, Fin2XlsxError> {
        let part = extractor.prepare(document).await?;

        let mut responses = Vec::with_capacity(self.config.statements.len());
        for &kind in &self.config.statements {
            responses.push((kind, extractor.extract(kind, &part).await?));
        }

        self.emit(PipelineState::Parsing);
        let mut result = ExtractionResult::new();
        for (kind, text) in &responses {
            result.merge(parse::parse_statement(*kind, text)?);
        }

        Ok(Extraction {
            result,
            warnings: Vec::new(),
            llm_calls: responses.len(),
            pages: 0,
        })
    }

    /// One call per page image; responses are joined and parsed as blocks.
    async fn extract_pages(
        &self,
        extractor: &StatementExtractor,
        document: &UploadedDocument,
    ) -> Result<Extraction, Fin2XlsxError> {
        let parts = self.page_parts(document).await?;
        let total = parts.len();
        info!("Extracting {} page(s)", total);

        let mut texts = Vec::with_capacity(total);
        for (i, part) in parts.iter().enumerate() {
            match extractor.extract_page(i + 1, total, part).await {
                Ok(text) => texts.push(text),
                Err(Fin2XlsxError::EmptyResponse { statement }) => {
                    warn!("No response for {}; skipping", statement);
                }
                Err(e) => return Err(e),
            }
        }

        self.emit(PipelineState::Parsing);
        let (result, warnings) = parse::parse_blocks(&texts.join("\n"));
        Ok(Extraction {
            result,
            warnings,
            llm_calls: total,
            pages: total,
        })
    }

    async fn page_parts(&self, document: &UploadedDocument) -> Result<Vec<DocumentPart>, Fin2XlsxError> {
        if !document.is_pdf() {
            let bytes = document.read().await?;
            return Ok(vec![encode::encode_image_bytes(&bytes, &document.mime_type)]);
        }
        let images = render::render_pages(&document.path, self.config.max_rendered_pixels).await?;
        images
            .iter()
            .enumerate()
            .map(|(i, img)| {
                encode::encode_page(img).map_err(|e| Fin2XlsxError::RasterisationFailed {
                    page: i + 1,
                    detail: format!("Image encoding failed: {e}"),
                })
            })
            .collect()
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Synchronous wrapper around [`Converter::convert`] using a Gemini client
/// from the environment.
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl Into<PathBuf>,
    config: PipelineConfig,
    options: &ConvertOptions,
) -> Result<ConversionOutput, Fin2XlsxError> {
    let converter = Converter::from_env(config)?;
    let path = path.into();
    tokio::runtime::Runtime::new()
        .map_err(|e| Fin2XlsxError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(converter.convert(&path, options))
}
