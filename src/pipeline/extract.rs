//! Statement extraction against the hosted model.
//!
//! [`StatementExtractor::prepare`] uploads the document and waits for the
//! provider to finish ingesting it. The wait is a fixed-interval poll, capped
//! at [`PollPolicy::max_attempts`] status checks and abandoned as soon as the
//! [`CancellationToken`] fires. After that, [`StatementExtractor::extract`]
//! issues one generate call per statement kind. Page-image mode skips the
//! upload and calls [`StatementExtractor::extract_page`] once per page.
//!
//! Nothing here retries. A failed call is logged and returned, and the
//! orchestrator decides what it means for the run.

use crate::config::PollPolicy;
use crate::error::Fin2XlsxError;
use crate::gemini::{DocumentPart, FileState, LlmService, RemoteFile};
use crate::pipeline::store::UploadedDocument;
use crate::progress::{PipelineState, ProgressCallback};
use crate::prompts::{statement_prompt, PAGE_PROMPT};
use crate::statement::StatementKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct StatementExtractor {
    service: Arc<dyn LlmService>,
    model: String,
    poll: PollPolicy,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl StatementExtractor {
    pub fn new(service: Arc<dyn LlmService>, model: impl Into<String>, poll: PollPolicy) -> Self {
        Self {
            service,
            model: model.into(),
            poll,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    fn emit(&self, state: PipelineState) {
        if let Some(ref cb) = self.progress {
            cb.on_state(&state);
        }
    }

    /// Upload `document` and wait until the provider can use it.
    pub async fn prepare(&self, document: &UploadedDocument) -> Result<DocumentPart, Fin2XlsxError> {
        self.emit(PipelineState::Uploading);
        let bytes = document.read().await?;
        let uploaded = self
            .service
            .upload(bytes, &document.file_name(), &document.mime_type)
            .await
            .inspect_err(|e| error!("Upload of {} failed: {}", document.file_name(), e))?;
        let ready = self.wait_until_ready(uploaded).await?;
        Ok(DocumentPart::from_remote(&ready))
    }

    /// Poll `file` until it is no longer processing.
    ///
    /// # Errors
    /// * [`Fin2XlsxError::RemoteProcessingTimeout`] after `max_attempts` checks
    /// * [`Fin2XlsxError::Cancelled`] when the token fires
    /// * [`Fin2XlsxError::RemoteProcessingFailed`] when the provider gives up
    pub async fn wait_until_ready(&self, mut file: RemoteFile) -> Result<RemoteFile, Fin2XlsxError> {
        let mut attempts = 0u32;
        while file.state == FileState::Processing {
            if attempts >= self.poll.max_attempts {
                return Err(Fin2XlsxError::RemoteProcessingTimeout {
                    name: file.name,
                    attempts,
                });
            }
            attempts += 1;
            self.emit(PipelineState::AwaitingRemote { attempt: attempts });
            debug!("{} still processing, check {}", file.name, attempts);

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Cancelled while waiting for {}", file.name);
                    return Err(Fin2XlsxError::Cancelled { name: file.name });
                }
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
            file = self.service.get_file(&file.name).await?;
        }

        if file.state == FileState::Failed {
            return Err(Fin2XlsxError::RemoteProcessingFailed { name: file.name });
        }
        info!("{} ready after {} status checks", file.name, attempts);
        Ok(file)
    }

    /// Ask for one statement from a prepared document.
    pub async fn extract(
        &self,
        kind: StatementKind,
        part: &DocumentPart,
    ) -> Result<String, Fin2XlsxError> {
        self.emit(PipelineState::Extracting { statement: kind });
        let text = self
            .service
            .generate(&self.model, statement_prompt(kind), part)
            .await
            .inspect_err(|e| error!("API error ({}): {}", kind, e))?;
        if text.trim().is_empty() {
            return Err(Fin2XlsxError::EmptyResponse {
                statement: kind.title().to_string(),
            });
        }
        info!("{}: {} chars", kind, text.len());
        Ok(text)
    }

    /// Ask for every statement visible on one rendered page (1-indexed).
    pub async fn extract_page(
        &self,
        page_num: usize,
        total: usize,
        part: &DocumentPart,
    ) -> Result<String, Fin2XlsxError> {
        self.emit(PipelineState::ExtractingPage {
            page: page_num,
            total,
        });
        let text = self
            .service
            .generate(&self.model, PAGE_PROMPT, part)
            .await
            .inspect_err(|e| error!("API error (page {}): {}", page_num, e))?;
        if text.trim().is_empty() {
            return Err(Fin2XlsxError::EmptyResponse {
                statement: format!("page {page_num}"),
            });
        }
        debug!("Page {}: {} chars", page_num, text.len());
        Ok(text)
    }
}
