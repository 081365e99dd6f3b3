//! Document store: the uploads directory, output naming and cache markers.
//!
//! Layout on disk:
//!
//! ```text
//! uploads/<original file name>
//! output/<stem>.xlsx
//! output/<stem>.xlsx.size     ← cache marker
//! ```
//!
//! The marker's first line is the decimal byte size of the source document
//! at the last successful extraction. In content-hash mode a second line
//! `sha256:<base64 digest>` is added; size-mode readers ignore it.

use crate::config::CacheIdentity;
use crate::error::Fin2XlsxError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MARKER_SUFFIX: &str = ".size";
const DIGEST_PREFIX: &str = "sha256:";

/// A local document about to go through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedDocument {
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: String,
}

impl UploadedDocument {
    /// Stat `path`, guess its MIME type and reject what the model cannot read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Fin2XlsxError> {
        let path = path.as_ref().to_path_buf();

        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(Fin2XlsxError::FileNotFound { path }),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(Fin2XlsxError::PermissionDenied { path })
            }
            Err(_) => return Err(Fin2XlsxError::FileNotFound { path }),
        };

        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        match mime_type.as_str() {
            "application/pdf" => check_pdf_magic(&path).await?,
            "image/png" | "image/jpeg" | "image/webp" => {}
            _ => return Err(Fin2XlsxError::UnsupportedFormat { path, mime_type }),
        }

        debug!("Opened {} ({} bytes, {})", path.display(), meta.len(), mime_type);
        Ok(Self {
            path,
            size: meta.len(),
            mime_type,
        })
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }

    /// File name component, used as the display name and in the log.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub async fn read(&self) -> Result<Vec<u8>, Fin2XlsxError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| read_error(&self.path, e))
    }
}

fn read_error(path: &Path, e: std::io::Error) -> Fin2XlsxError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => Fin2XlsxError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Fin2XlsxError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

async fn check_pdf_magic(path: &Path) -> Result<(), Fin2XlsxError> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| read_error(path, e))?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file
            .read(&mut magic[filled..])
            .await
            .map_err(|e| read_error(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled < magic.len() || &magic != b"%PDF" {
        return Err(Fin2XlsxError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Identity of a source document as recorded in a cache marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub size: u64,
    /// `sha256:<base64>`, present in content-hash mode only.
    pub digest: Option<String>,
}

impl CacheRecord {
    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let size = lines.next()?.trim().parse().ok()?;
        let digest = lines
            .next()
            .map(str::trim)
            .filter(|l| l.starts_with(DIGEST_PREFIX))
            .map(str::to_string);
        Some(Self { size, digest })
    }

    fn render(&self) -> String {
        match &self.digest {
            Some(d) => format!("{}\n{}", self.size, d),
            None => self.size.to_string(),
        }
    }
}

/// `sha256:<base64>` of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{DIGEST_PREFIX}{}", STANDARD.encode(Sha256::digest(bytes)))
}

/// Path bookkeeping for uploads, outputs and cache markers.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    uploads_dir: PathBuf,
    output_dir: PathBuf,
    identity: CacheIdentity,
}

impl DocumentStore {
    pub fn new(
        uploads_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        identity: CacheIdentity,
    ) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            output_dir: output_dir.into(),
            identity,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist uploaded bytes as `uploads/<file name of name>`, replacing any
    /// file already there.
    pub async fn save(&self, bytes: &[u8], name: &str) -> Result<PathBuf, Fin2XlsxError> {
        let file_name = upload_file_name(name)?;
        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|e| Fin2XlsxError::OutputWriteFailed {
                path: self.uploads_dir.clone(),
                source: e,
            })?;

        let path = self.uploads_dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Fin2XlsxError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        info!("Saved upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// `output/<stem of input>.xlsx`.
    pub fn resolve_output_path(&self, input_path: &Path) -> PathBuf {
        let stem = input_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        let mut name = stem;
        name.push(".xlsx");
        self.output_dir.join(name)
    }

    /// `<output_path>.size`.
    pub fn marker_path(output_path: &Path) -> PathBuf {
        let mut s = output_path.as_os_str().to_os_string();
        s.push(MARKER_SUFFIX);
        PathBuf::from(s)
    }

    /// Identity of the document at `input_path` under the configured mode.
    pub async fn identify(&self, input_path: &Path) -> Result<CacheRecord, Fin2XlsxError> {
        match self.identity {
            CacheIdentity::ByteSize => {
                let meta = tokio::fs::metadata(input_path).await.map_err(|_| {
                    Fin2XlsxError::FileNotFound {
                        path: input_path.to_path_buf(),
                    }
                })?;
                Ok(CacheRecord {
                    size: meta.len(),
                    digest: None,
                })
            }
            CacheIdentity::ContentHash => {
                let bytes = tokio::fs::read(input_path).await.map_err(|_| {
                    Fin2XlsxError::FileNotFound {
                        path: input_path.to_path_buf(),
                    }
                })?;
                Ok(CacheRecord {
                    size: bytes.len() as u64,
                    digest: Some(content_digest(&bytes)),
                })
            }
        }
    }

    /// True only if the workbook and its marker both exist and the marker
    /// matches the current document. Every I/O or parse problem is a miss.
    pub async fn check_cache(&self, input_path: &Path, output_path: &Path) -> bool {
        if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
            return false;
        }
        let marker = Self::marker_path(output_path);
        let recorded = match tokio::fs::read_to_string(&marker).await {
            Ok(text) => match CacheRecord::parse(&text) {
                Some(r) => r,
                None => {
                    debug!("Unreadable cache marker {}", marker.display());
                    return false;
                }
            },
            Err(_) => return false,
        };
        let current = match self.identify(input_path).await {
            Ok(c) => c,
            Err(_) => return false,
        };

        match self.identity {
            CacheIdentity::ByteSize => recorded.size == current.size,
            CacheIdentity::ContentHash => {
                recorded.size == current.size
                    && recorded.digest.is_some()
                    && recorded.digest == current.digest
            }
        }
    }

    /// Overwrite the marker next to `output_path`.
    pub async fn record_cache(
        &self,
        output_path: &Path,
        record: &CacheRecord,
    ) -> Result<(), Fin2XlsxError> {
        let marker = Self::marker_path(output_path);
        tokio::fs::write(&marker, record.render())
            .await
            .map_err(|e| Fin2XlsxError::OutputWriteFailed {
                path: marker.clone(),
                source: e,
            })?;
        debug!("Recorded cache marker {} = {}", marker.display(), record.size);
        Ok(())
    }
}

/// Last path component of `name`, rejecting names that have none.
fn upload_file_name(name: &str) -> Result<&str, Fin2XlsxError> {
    // Browsers on Windows may send a full path with backslashes.
    let candidate = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(Fin2XlsxError::InvalidInput {
            input: name.to_string(),
            reason: "upload name has no file name component".into(),
        });
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, identity: CacheIdentity) -> DocumentStore {
        DocumentStore::new(dir.path().join("uploads"), dir.path().join("output"), identity)
    }

    #[test]
    fn output_path_uses_stem() {
        let s = DocumentStore::new("uploads", "output", CacheIdentity::ByteSize);
        assert_eq!(
            s.resolve_output_path(Path::new("uploads/acme_2024.pdf")),
            PathBuf::from("output/acme_2024.xlsx")
        );
        assert_eq!(
            DocumentStore::marker_path(Path::new("output/acme_2024.xlsx")),
            PathBuf::from("output/acme_2024.xlsx.size")
        );
    }

    #[test]
    fn upload_names_are_reduced_to_file_name() {
        assert_eq!(upload_file_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(upload_file_name("../../etc/report.pdf").unwrap(), "report.pdf");
        assert_eq!(upload_file_name("C:\\tmp\\q3.png").unwrap(), "q3.png");
        assert!(upload_file_name("dir/").is_err());
        assert!(upload_file_name("..").is_err());
    }

    #[test]
    fn marker_parse_ignores_unknown_second_line() {
        let r = CacheRecord::parse("120000\n").unwrap();
        assert_eq!(r.size, 120000);
        assert_eq!(r.digest, None);
        let r = CacheRecord::parse("5\nsha256:abc=").unwrap();
        assert_eq!(r.digest.as_deref(), Some("sha256:abc="));
        assert!(CacheRecord::parse("not a number").is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_upload() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, CacheIdentity::ByteSize);
        s.save(b"first", "a.pdf").await.unwrap();
        let path = s.save(b"second!", "a.pdf").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second!");
    }

    #[tokio::test]
    async fn cache_hit_requires_output_marker_and_equal_size() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, CacheIdentity::ByteSize);
        let input = s.save(&[0u8; 64], "q.pdf").await.unwrap();
        let output = s.resolve_output_path(&input);

        assert!(!s.check_cache(&input, &output).await);

        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"xlsx").unwrap();
        assert!(!s.check_cache(&input, &output).await, "no marker yet");

        let record = s.identify(&input).await.unwrap();
        s.record_cache(&output, &record).await.unwrap();
        assert!(s.check_cache(&input, &output).await);

        s.save(&[0u8; 65], "q.pdf").await.unwrap();
        assert!(!s.check_cache(&input, &output).await, "size changed");
    }

    #[tokio::test]
    async fn content_hash_detects_same_size_change() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, CacheIdentity::ContentHash);
        let input = s.save(b"aaaa", "h.pdf").await.unwrap();
        let output = s.resolve_output_path(&input);
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"xlsx").unwrap();
        let record = s.identify(&input).await.unwrap();
        s.record_cache(&output, &record).await.unwrap();
        assert!(s.check_cache(&input, &output).await);

        s.save(b"bbbb", "h.pdf").await.unwrap();
        assert!(!s.check_cache(&input, &output).await);

        // A size-only store still considers it cached.
        let by_size = store(&dir, CacheIdentity::ByteSize);
        assert!(by_size.check_cache(&input, &output).await);
    }

    #[tokio::test]
    async fn open_rejects_fake_pdf_and_unknown_types() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake.pdf");
        std::fs::write(&fake, b"PK\x03\x04zip").unwrap();
        assert!(matches!(
            UploadedDocument::open(&fake).await,
            Err(Fin2XlsxError::NotAPdf { .. })
        ));

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();
        assert!(matches!(
            UploadedDocument::open(&txt).await,
            Err(Fin2XlsxError::UnsupportedFormat { .. })
        ));

        assert!(matches!(
            UploadedDocument::open(dir.path().join("missing.pdf")).await,
            Err(Fin2XlsxError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn io_failures_are_not_reported_as_bad_magic() {
        let path = Path::new("locked.pdf");
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            read_error(path, denied),
            Fin2XlsxError::PermissionDenied { .. }
        ));
        let other = std::io::Error::new(std::io::ErrorKind::Other, "device gone");
        assert!(matches!(
            read_error(path, other),
            Fin2XlsxError::FileNotFound { .. }
        ));

        // A file shorter than the magic is still a content problem.
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("short.pdf");
        std::fs::write(&short, b"%PD").unwrap();
        assert!(matches!(
            check_pdf_magic(&short).await,
            Err(Fin2XlsxError::NotAPdf { .. })
        ));
        let exact = dir.path().join("exact.pdf");
        std::fs::write(&exact, b"%PDF").unwrap();
        assert!(check_pdf_magic(&exact).await.is_ok());
    }

    #[tokio::test]
    async fn open_accepts_pdf_and_png() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("r.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        let doc = UploadedDocument::open(&pdf).await.unwrap();
        assert!(doc.is_pdf());
        assert_eq!(doc.size, 9);
        assert_eq!(doc.file_name(), "r.pdf");

        let png = dir.path().join("p.png");
        std::fs::write(&png, b"\x89PNG").unwrap();
        let doc = UploadedDocument::open(&png).await.unwrap();
        assert_eq!(doc.mime_type, "image/png");
    }
}
