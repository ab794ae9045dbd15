//! Storage provider trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;

use filestore_common::{NormalizedPath, Result};

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the object (last path segment).
    pub name: String,
    /// Provider-relative path of the object.
    pub path: NormalizedPath,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// MIME type as reported or guessed by the backend.
    pub mime: Option<String>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// ETag or revision ID.
    pub etag: Option<String>,
}

/// Byte stream type for read/write operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn bytes_stream(data: Vec<u8>) -> ByteStream {
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// Capability interface every backend implements.
///
/// Paths are relative to the provider root; bucket roots are applied by the
/// caller. All operations are async and use streams for content.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Provider type tag (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Prepare the backend for use (e.g. create the root directory).
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Read a file as a byte stream.
    ///
    /// # Errors
    /// - `NotFound` if no file exists at `path`
    async fn read(&self, path: &NormalizedPath) -> Result<ByteStream>;

    /// Write a file from a byte stream, creating parent directories.
    ///
    /// The final path must never expose a partially written file. The stream
    /// is consumed once; a failed write is not retried.
    async fn write(&self, path: &NormalizedPath, stream: ByteStream) -> Result<Metadata>;

    /// Get metadata for a path.
    ///
    /// # Errors
    /// - `NotFound` if nothing exists at `path`
    async fn stat(&self, path: &NormalizedPath) -> Result<Metadata>;

    /// Check if a path exists.
    async fn exists(&self, path: &NormalizedPath) -> Result<bool>;

    /// List direct children of a directory.
    async fn list(&self, path: &NormalizedPath) -> Result<Vec<Metadata>>;

    /// Delete a file.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    async fn delete(&self, path: &NormalizedPath) -> Result<()>;

    /// Create a directory, including missing parents. Existing directories
    /// are not an error.
    async fn mkdir(&self, path: &NormalizedPath) -> Result<Metadata>;

    /// Remove a directory. Without `recursive` the directory must be empty.
    async fn rmdir(&self, path: &NormalizedPath, recursive: bool) -> Result<()>;

    /// Server-side copy of a file. `Ok(None)` when unsupported.
    async fn native_copy(
        &self,
        _from: &NormalizedPath,
        _to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        Ok(None)
    }

    /// Server-side move of a file. `Ok(None)` when unsupported.
    async fn native_move(
        &self,
        _from: &NormalizedPath,
        _to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        Ok(None)
    }

    /// Whether `native_copy`/`native_move` also work between two buckets of
    /// this provider.
    fn cross_bucket_native(&self) -> bool {
        false
    }

    /// Underlying filesystem path, for backends that have one.
    fn native_path(&self, _path: &NormalizedPath) -> Option<PathBuf> {
        None
    }

    /// Release backend resources. Stored content is left untouched.
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// Guess a MIME type from a file name's extension.
pub fn guess_mime(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    };
    Some(mime.to_string())
}
