//! Append-only, tab-separated operation log.
//!
//! One line per pipeline run that got past the cache check:
//!
//! ```text
//! acme_2024.pdf	120000	succeed	acme_2024.xlsx	8213	2025-03-02 14:07:55
//! ```

use crate::error::Fin2XlsxError;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome column of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeed => "succeed",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub source_name: String,
    pub source_size: u64,
    pub status: RunStatus,
    /// Empty when no workbook was produced.
    pub output_name: String,
    pub output_size: u64,
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    /// The line as written, newline included.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            self.source_name,
            self.source_size,
            self.status.as_str(),
            self.output_name,
            self.output_size,
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Single-writer handle on the log file.
///
/// Concurrent runs in one process serialise on the mutex, and each line goes
/// out in one `write_all`, so lines never interleave.
#[derive(Debug)]
pub struct OperationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OperationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &LogEntry) -> Result<(), Fin2XlsxError> {
        let line = entry.to_line();
        let _guard = self.lock.lock().await;

        let fail = |source: std::io::Error| Fin2XlsxError::LogWriteFailed {
            path: self.path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(fail)?;
        file.write_all(line.as_bytes()).await.map_err(fail)?;
        file.flush().await.map_err(fail)?;

        debug!("Log updated: {}", self.path.display());
        Ok(())
    }
}
