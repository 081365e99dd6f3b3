//! Configuration types for financial-report conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. One struct holds every knob so a run
//! can be logged, cloned into a server state, or diffed against another.

use crate::error::Fin2XlsxError;
use crate::progress::ProgressCallback;
use crate::statement::StatementKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for the upload → extract → workbook pipeline.
///
/// # Example
/// ```rust
/// use fin2xlsx::{ExtractionMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .output_dir("reports/xlsx")
///     .mode(ExtractionMode::PageImages)
///     .max_poll_attempts(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory receiving raw uploads. Default: `uploads`.
    pub uploads_dir: PathBuf,

    /// Directory receiving workbooks and cache markers. Default: `output`.
    pub output_dir: PathBuf,

    /// Tab-separated audit log. Default: `convert_pdf_log.txt`.
    pub log_path: PathBuf,

    /// LLM model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Whole uploaded document, or one call per rendered page.
    pub mode: ExtractionMode,

    /// Statements requested in whole-document mode, in query order.
    pub statements: Vec<StatementKind>,

    /// What identifies "the same document" for the cache.
    pub cache_identity: CacheIdentity,

    /// Delay between remote file status checks. Default: 2000 ms.
    pub poll_interval_ms: u64,

    /// Status checks before giving up on remote ingestion. Default: 60.
    ///
    /// With the default interval this bounds the wait to two minutes.
    pub max_poll_attempts: u32,

    /// Per-request HTTP timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Longest edge of rendered pages in page-image mode. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Optional progress events for UIs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            log_path: PathBuf::from("convert_pdf_log.txt"),
            model: DEFAULT_MODEL.to_string(),
            mode: ExtractionMode::default(),
            statements: StatementKind::ALL.to_vec(),
            cache_identity: CacheIdentity::default(),
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
            api_timeout_secs: 120,
            max_rendered_pixels: 2000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("uploads_dir", &self.uploads_dir)
            .field("output_dir", &self.output_dir)
            .field("log_path", &self.log_path)
            .field("model", &self.model)
            .field("mode", &self.mode)
            .field("statements", &self.statements)
            .field("cache_identity", &self.cache_identity)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Polling bounds derived from the interval and attempt settings.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.uploads_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn statements(mut self, kinds: Vec<StatementKind>) -> Self {
        self.config.statements = kinds;
        self
    }

    pub fn cache_identity(mut self, identity: CacheIdentity) -> Self {
        self.config.cache_identity = identity;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Fin2XlsxError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(Fin2XlsxError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_poll_attempts == 0 {
            return Err(Fin2XlsxError::InvalidConfig(
                "max_poll_attempts must be ≥ 1".into(),
            ));
        }
        if c.statements.is_empty() {
            return Err(Fin2XlsxError::InvalidConfig(
                "at least one statement kind is required".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Fin2XlsxError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the document reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Upload the file once, ask once per statement kind. (default)
    #[default]
    WholeDocument,
    /// Render each page to PNG and ask once per page for every statement on it.
    PageImages,
}

/// Identity used to decide whether a cached workbook is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheIdentity {
    /// Source byte size only. Two different files of equal size collide. (default)
    #[default]
    ByteSize,
    /// Byte size plus SHA-256 digest of the source bytes.
    ContentHash,
}

/// Bounds on waiting for remote file ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PipelineConfig::default().poll_policy()
    }
}
