//! Hosted LLM access: the [`LlmService`] seam and its Gemini implementation.
//!
//! The pipeline never talks HTTP directly. It receives an
//! `Arc<dyn LlmService>` so tests can script responses and the binary can
//! build one [`GeminiClient`] at startup, failing fast when the credential
//! is missing.

use crate::error::Fin2XlsxError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Ingestion state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Unspecified,
}

impl FileState {
    fn from_api(state: Option<&str>) -> Self {
        match state {
            Some("PROCESSING") => FileState::Processing,
            Some("ACTIVE") => FileState::Active,
            Some("FAILED") => FileState::Failed,
            _ => FileState::Unspecified,
        }
    }
}

/// A file held by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Provider resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// The document half of a generate request.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentPart {
    /// A previously uploaded file.
    FileUri { uri: String, mime_type: String },
    /// Base64 image bytes sent inline.
    InlineImage { data: String, mime_type: String },
}

impl DocumentPart {
    pub fn from_remote(file: &RemoteFile) -> Self {
        DocumentPart::FileUri {
            uri: file.uri.clone(),
            mime_type: file.mime_type.clone(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            DocumentPart::FileUri { uri, mime_type } => json!({
                "file_data": { "mime_type": mime_type, "file_uri": uri }
            }),
            DocumentPart::InlineImage { data, mime_type } => json!({
                "inline_data": { "mime_type": mime_type, "data": data }
            }),
        }
    }
}

/// Operations the pipeline needs from a hosted model.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Upload document bytes; the returned file may still be processing.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, Fin2XlsxError>;

    /// Current status of an uploaded file.
    async fn get_file(&self, name: &str) -> Result<RemoteFile, Fin2XlsxError>;

    /// Send one prompt plus one document part; returns the response text.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        part: &DocumentPart,
    ) -> Result<String, Fin2XlsxError>;
}

/// Gemini REST client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    upload_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, Fin2XlsxError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Fin2XlsxError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            upload_url: GEMINI_UPLOAD_URL.to_string(),
        })
    }

    /// Build a client from `GEMINI_API_KEY`.
    ///
    /// # Errors
    /// [`Fin2XlsxError::MissingCredential`] when the variable is unset or blank.
    pub fn from_env(timeout: Duration) -> Result<Self, Fin2XlsxError> {
        let key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Fin2XlsxError::MissingCredential {
                var: API_KEY_VAR.to_string(),
            })?;
        Self::new(key, timeout)
    }

    /// Point both the REST and upload endpoints at another host (proxies, tests).
    /// `base` is the `v1beta` root; uploads go to `{base}/upload/files`.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        self.upload_url = format!("{base}/upload/files");
        self.base_url = base;
        self
    }
}

/// Turn a non-success response into the matching error.
async fn check_status(res: Response, what: &str) -> Result<Response, Fin2XlsxError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Fin2XlsxError::AuthError {
            detail: format!("{what}: {body}"),
        });
    }
    Err(Fin2XlsxError::LlmApiError {
        status: status.as_u16(),
        message: format!("{what}: {body}"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    state: Option<String>,
}

impl From<ApiFile> for RemoteFile {
    fn from(f: ApiFile) -> Self {
        RemoteFile {
            state: FileState::from_api(f.state.as_deref()),
            name: f.name,
            uri: f.uri,
            mime_type: f.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: ApiFile,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmService for GeminiClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, Fin2XlsxError> {
        let size = bytes.len();
        let metadata = json!({ "file": { "display_name": display_name } });

        let init = self
            .client
            .post(&self.upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&metadata)
            .send()
            .await?;
        let init = check_status(init, "upload start").await?;

        let upload_url = init
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Fin2XlsxError::LlmApiError {
                status: init.status().as_u16(),
                message: "upload start response has no x-goog-upload-url header".into(),
            })?
            .to_string();

        let res = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let res = check_status(res, "upload finalize").await?;

        let body: UploadResponse = res.json().await?;
        let file = RemoteFile::from(body.file);
        info!("Uploaded '{}' as {} ({} bytes)", display_name, file.name, size);
        Ok(file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, Fin2XlsxError> {
        let url = format!("{}/{}", self.base_url, name);
        let res = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let res = check_status(res, "file status").await?;
        let file: ApiFile = res.json().await?;
        Ok(file.into())
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        part: &DocumentPart,
    ) -> Result<String, Fin2XlsxError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [ { "text": prompt }, part.to_json() ]
            }]
        });

        let res = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let res = check_status(res, "generateContent").await?;
        let body: GenerateResponse = res.json().await?;
        let text = body.text();
        debug!("{} returned {} chars", model, text.len());
        Ok(text)
    }
}
