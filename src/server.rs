//! HTTP upload surface.
//!
//! A single-page upload form plus a small JSON API over one shared
//! [`Converter`]:
//!
//! | Route                        | Purpose                                  |
//! |------------------------------|------------------------------------------|
//! | `GET  /`                     | upload page                              |
//! | `POST /api/v1/convert`       | multipart `file` + optional `force`      |
//! | `GET  /api/v1/download/:file`| workbook from the output directory       |
//! | `GET  /health`               | liveness                                 |
//!
//! Failures come back as `{ "error": "<message>" }` with the pipeline's
//! message unchanged.

use crate::convert::{ConvertOptions, Converter};
use crate::error::Fin2XlsxError;
use crate::output::ConversionOutput;
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ConvertResponse {
    /// Relative URL of the workbook.
    download_url: String,
    #[serde(flatten)]
    output: ConversionOutput,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &Fin2XlsxError) -> StatusCode {
    match err {
        Fin2XlsxError::InvalidInput { .. }
        | Fin2XlsxError::NotAPdf { .. }
        | Fin2XlsxError::FileNotFound { .. } => StatusCode::BAD_REQUEST,
        Fin2XlsxError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Fin2XlsxError::NoStatements { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Fin2XlsxError::Transport(_)
        | Fin2XlsxError::LlmApiError { .. }
        | Fin2XlsxError::AuthError { .. }
        | Fin2XlsxError::EmptyResponse { .. }
        | Fin2XlsxError::RemoteProcessingFailed { .. }
        | Fin2XlsxError::Parse { .. } => StatusCode::BAD_GATEWAY,
        Fin2XlsxError::RemoteProcessingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the router. Exposed separately from [`serve`] for embedding.
pub fn router(converter: Arc<Converter>) -> Router {
    Router::new()
        .route("/", get(upload_page))
        .route("/api/v1/convert", post(handle_convert))
        .route("/api/v1/download/:file", get(handle_download))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(converter)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, converter: Arc<Converter>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Upload page listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(converter)).await
}

async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

async fn handle_convert(
    State(converter): State<Arc<Converter>>,
    mut multipart: Multipart,
) -> Response {
    let mut force = false;
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {e}");
                return error_response(StatusCode::BAD_REQUEST, e.body_text());
            }
        };
        match field.name().unwrap_or("") {
            "force" => {
                let value = field.text().await.unwrap_or_default();
                force = matches!(value.trim(), "1" | "true" | "on" | "yes");
            }
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((name, bytes.to_vec())),
                    Err(e) => {
                        warn!("Failed to read upload bytes: {e}");
                        return error_response(StatusCode::BAD_REQUEST, e.body_text());
                    }
                }
            }
            _ => {}
        }
    }

    let Some((name, bytes)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided.");
    };
    if name.is_empty() || bytes.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file selected.");
    }

    let options = ConvertOptions {
        force,
        cancel: None,
    };
    match converter.convert_upload(&bytes, &name, &options).await {
        Ok(output) => {
            let Some(file_name) = output.file_name().map(str::to_string) else {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Workbook path has no file name.",
                );
            };
            info!(
                "Converted upload {} -> {} (cached: {})",
                name, file_name, output.cache_hit
            );
            Json(ConvertResponse {
                download_url: format!("/api/v1/download/{file_name}"),
                output,
            })
            .into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

/// A bare `*.xlsx` file name: no separators, no parent references.
fn is_safe_workbook_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
        && name.to_ascii_lowercase().ends_with(".xlsx")
}

async fn handle_download(
    State(converter): State<Arc<Converter>>,
    UrlPath(file): UrlPath<String>,
) -> Response {
    if !is_safe_workbook_name(&file) {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid file name '{file}'."));
    }
    let path = converter.store().output_dir().join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, format!("No workbook named '{file}'."))
        }
        Err(e) => {
            warn!("Failed to read {}: {e}", path.display());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

const UPLOAD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>fin2xlsx</title>
  <style>
    * { box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', system-ui, sans-serif;
      background: #f8fafc; color: #0f172a; margin: 0;
      min-height: 100vh; display: flex; align-items: center; justify-content: center;
    }
    main { background: #fff; padding: 32px; border-radius: 12px; width: 420px;
           box-shadow: 0 4px 24px rgba(15, 23, 42, 0.08); }
    h1 { font-size: 22px; margin: 0 0 8px; }
    p { color: #64748b; font-size: 14px; margin: 0 0 24px; }
    label { display: block; font-size: 14px; margin: 12px 0; }
    button { width: 100%; padding: 12px; border: 0; border-radius: 8px;
             background: #0f766e; color: #fff; font-size: 15px; cursor: pointer; }
    button:disabled { background: #94a3b8; cursor: wait; }
    #status { margin-top: 16px; font-size: 14px; min-height: 20px; }
    .error { color: #b91c1c; }
    .spinner { display: inline-block; width: 14px; height: 14px; margin-right: 6px;
               border: 2px solid #cbd5e1; border-top-color: #0f766e; border-radius: 50%;
               animation: spin 0.8s linear infinite; vertical-align: -2px; }
    @keyframes spin { to { transform: rotate(360deg); } }
  </style>
</head>
<body>
<main>
  <h1>Financial report to Excel</h1>
  <p>Upload a PDF or an image of a financial report.</p>
  <form id="form">
    <input type="file" name="file" id="file"
           accept=".pdf,.png,.jpg,.jpeg,.webp,application/pdf,image/png,image/jpeg,image/webp" required>
    <label><input type="checkbox" name="force" id="force" value="true"> Reprocess anyway</label>
    <button type="submit" id="convert">Convert</button>
  </form>
  <div id="status"></div>
</main>
<script>
  const form = document.getElementById('form');
  const button = document.getElementById('convert');
  const status = document.getElementById('status');

  form.addEventListener('submit', async (event) => {
    event.preventDefault();
    const data = new FormData();
    data.append('file', document.getElementById('file').files[0]);
    if (document.getElementById('force').checked) data.append('force', 'true');

    button.disabled = true;
    status.className = '';
    status.innerHTML = '<span class="spinner"></span>Converting…';
    try {
      const res = await fetch('/api/v1/convert', { method: 'POST', body: data });
      const body = await res.json();
      if (!res.ok) throw new Error(body.error || res.statusText);
      const link = document.createElement('a');
      link.href = body.download_url;
      link.textContent = 'Download ' + body.download_url.split('/').pop();
      status.textContent = body.cache_hit ? 'Reused previous result. ' : 'Done. ';
      status.appendChild(link);
    } catch (err) {
      status.className = 'error';
      status.textContent = err.message;
    } finally {
      button.disabled = false;
    }
  });
</script>
</body>
</html>
"#;
