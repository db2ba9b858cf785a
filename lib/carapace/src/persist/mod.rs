//! Disk persistence for request/response snapshots.
//!
//! Artifacts land under `<root>/<host>/` with file stems derived from the
//! request's cache key, so persisting the same exchange twice overwrites the
//! same files:
//!
//! - `<digest>.http` - the outgoing request, in editor-replayable `.http` format
//! - `<digest>.res.json` - the full response (status, headers, body) for replay
//! - `<digest>.<ext>` - the raw response body, extension from `Content-Type`
//! - `<digest>.error.txt` - the failure text when the exchange errored
//!
//! All writes are best-effort from the store middleware's point of view: a
//! failure here is logged and the HTTP outcome is returned untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use derive_more::{Display, Error, From};

use crate::cache::{CacheKey, StoredResponse};
use crate::{Error as HttpError, Request, Response};

/// Error from a filesystem operation.
///
/// Logged and absorbed by the store middleware, never fatal to a request.
#[derive(Debug, Display, Error, From)]
pub enum PersistenceError {
    /// Underlying I/O failure.
    #[display("persistence I/O error: {_0}")]
    Io(std::io::Error),

    /// Snapshot serialization failure.
    #[display("persistence encoding error: {_0}")]
    Encoding(serde_json::Error),
}

/// Filesystem contract: write and read whole files, creating parent
/// directories as needed.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Write `contents` to `path`, creating parent directories.
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError>;

    /// Read the file at `path`.
    async fn read(&self, path: &Path) -> Result<Vec<u8>, PersistenceError>;
}

/// Local disk implementation of [`Filesystem`] using tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, PersistenceError> {
        Ok(tokio::fs::read(path).await?)
    }
}

/// File extension for a `Content-Type` header value.
///
/// Parameters after `;` are ignored; unknown types fall back to `bin`.
#[must_use]
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return "bin";
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/json" | "application/problem+json" => "json",
        "text/html" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/css" => "css",
        "application/xml" | "text/xml" => "xml",
        "application/javascript" | "text/javascript" => "js",
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Writes request/response artifacts under a root directory.
pub struct ArtifactWriter {
    filesystem: Box<dyn Filesystem>,
    root: PathBuf,
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ArtifactWriter {
    /// Create a writer targeting local disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_filesystem(root, Box::new(LocalFilesystem))
    }

    /// Create a writer with a custom filesystem.
    #[must_use]
    pub fn with_filesystem(root: impl Into<PathBuf>, filesystem: Box<dyn Filesystem>) -> Self {
        Self {
            filesystem,
            root: root.into(),
        }
    }

    fn artifact_path(&self, key: &CacheKey, suffix: &str) -> PathBuf {
        let host = if key.host().is_empty() {
            "unknown-host"
        } else {
            key.host()
        };
        self.root
            .join(host)
            .join(format!("{}.{suffix}", key.digest()))
    }

    /// Path of the request snapshot for a key.
    #[must_use]
    pub fn request_path(&self, key: &CacheKey) -> PathBuf {
        self.artifact_path(key, "http")
    }

    /// Path of the full response snapshot for a key.
    #[must_use]
    pub fn response_path(&self, key: &CacheKey) -> PathBuf {
        self.artifact_path(key, "res.json")
    }

    /// Persist the outgoing request in `.http` format.
    pub async fn save_request(
        &self,
        key: &CacheKey,
        request: &Request<Bytes>,
    ) -> Result<(), PersistenceError> {
        let snapshot = render_http_file(request);
        self.filesystem
            .write(&self.request_path(key), snapshot.as_bytes())
            .await
    }

    /// Persist the response: full snapshot plus the raw body with an
    /// extension inferred from `Content-Type`.
    pub async fn save_response(
        &self,
        key: &CacheKey,
        response: &Response<Bytes>,
    ) -> Result<(), PersistenceError> {
        let stored = StoredResponse::from_response(response);
        let bytes = stored.to_bytes()?;
        self.filesystem
            .write(&self.response_path(key), &bytes)
            .await?;

        let content_type = response
            .headers()
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str());
        self.filesystem
            .write(
                &self.artifact_path(key, extension_for(content_type)),
                response.body(),
            )
            .await
    }

    /// Persist the failure text when the exchange errored.
    pub async fn save_error(
        &self,
        key: &CacheKey,
        error: &HttpError,
    ) -> Result<(), PersistenceError> {
        self.filesystem
            .write(&self.artifact_path(key, "error.txt"), error.to_string().as_bytes())
            .await
    }

    /// Read back a persisted response snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is missing or malformed.
    pub async fn load_response(&self, key: &CacheKey) -> Result<Response<Bytes>, PersistenceError> {
        let bytes = self.filesystem.read(&self.response_path(key)).await?;
        Ok(StoredResponse::from_bytes(&bytes)?.into_response())
    }
}

/// Render a request as an editor-replayable `.http` file.
///
/// Headers are sorted so the same request always renders the same bytes.
fn render_http_file(request: &Request<Bytes>) -> String {
    let mut out = format!("{} {}\n", request.method(), request.url());

    let mut headers: Vec<(&String, &String)> = request.headers().iter().collect();
    headers.sort();
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\n"));
    }

    if let Some(body) = request.body() {
        out.push('\n');
        out.push_str(&String::from_utf8_lossy(body));
        out.push('\n');
    }

    out
}
