//! Progress-callback trait for pipeline state transitions.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a conversion moves through its states. The CLI drives a
//! spinner from these; the HTTP surface only logs.
//!
//! # Example
//!
//! ```rust
//! use fin2xlsx::{ConversionProgressCallback, PipelineConfig, PipelineState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     transitions: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_state(&self, state: &PipelineState) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{state}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { transitions: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::statement::StatementKind;
use std::fmt;
use std::sync::Arc;

/// Where a conversion currently is.
///
/// `CacheCheck → {CacheHit → Done} | {CacheMiss → Uploading →
/// AwaitingRemote → Extracting… → Parsing → Building → Logged → Done}`;
/// any failure after the cache check goes through `Failed` then `Logged`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    CacheCheck,
    CacheHit,
    CacheMiss,
    Uploading,
    /// Status check `attempt` (1-indexed) on the uploaded file.
    AwaitingRemote { attempt: u32 },
    Extracting { statement: StatementKind },
    /// Page-image mode: page `page` (1-indexed) of `total`.
    ExtractingPage { page: usize, total: usize },
    Parsing,
    Building,
    Failed { reason: String },
    Logged,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::CacheCheck => f.write_str("checking cache"),
            PipelineState::CacheHit => f.write_str("cache hit"),
            PipelineState::CacheMiss => f.write_str("cache miss"),
            PipelineState::Uploading => f.write_str("uploading document"),
            PipelineState::AwaitingRemote { attempt } => {
                write!(f, "waiting for remote processing (check {attempt})")
            }
            PipelineState::Extracting { statement } => write!(f, "extracting {statement}"),
            PipelineState::ExtractingPage { page, total } => {
                write!(f, "extracting page {page}/{total}")
            }
            PipelineState::Parsing => f.write_str("parsing responses"),
            PipelineState::Building => f.write_str("building workbook"),
            PipelineState::Failed { reason } => write!(f, "failed: {reason}"),
            PipelineState::Logged => f.write_str("logged"),
            PipelineState::Done => f.write_str("done"),
        }
    }
}

/// Called by the pipeline as it runs.
///
/// Implementations must be `Send + Sync`; the HTTP surface shares one
/// config across request tasks. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once with the source file name before the cache check.
    fn on_conversion_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called on every state transition.
    fn on_state(&self, state: &PipelineState) {
        let _ = state;
    }

    /// Called once at the end with the outcome.
    ///
    /// # Arguments
    /// * `success`: whether a workbook is available
    /// * `cache_hit`: whether it was served from the cache
    fn on_conversion_complete(&self, success: bool, cache_hit: bool) {
        let _ = (success, cache_hit);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
