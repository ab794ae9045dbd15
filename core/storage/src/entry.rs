//! File and directory entities.
//!
//! Entities reference their bucket through a [`Bucket`] handle, never the
//! provider directly. Moving an entity rewrites its path in place.

use std::path::PathBuf;
use tokio::sync::OnceCell;

use filestore_common::{NormalizedPath, Result, StorageUri};

use crate::bucket::{Bucket, FileList, ListOptions, ReturnOptions};
use crate::provider::{ByteStream, Metadata};
use crate::resolver::{resolve_relative, Location};
use crate::response::{Returned, StorageResponse};

/// A file inside a bucket.
#[derive(Debug, Clone)]
pub struct StorageFile {
    bucket: Bucket,
    path: NormalizedPath,
    metadata: OnceCell<Metadata>,
}

impl StorageFile {
    pub(crate) fn new(bucket: Bucket, path: NormalizedPath, metadata: Option<Metadata>) -> Self {
        Self {
            bucket,
            path,
            metadata: OnceCell::new_with(metadata),
        }
    }

    /// Owning bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Path relative to the bucket root.
    pub fn absolute_path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Base name.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// Resolved storage URI.
    pub fn uri(&self) -> StorageUri {
        self.bucket.uri(self.path.clone())
    }

    /// `provider://bucket/path`
    pub fn storage_uri(&self) -> String {
        self.uri().to_string()
    }

    /// Backend metadata, fetched on first access and cached.
    pub async fn metadata(&self) -> Result<&Metadata> {
        self.metadata
            .get_or_try_init(|| self.bucket.stat(&self.path))
            .await
    }

    /// Read the whole file.
    pub async fn contents(&self) -> StorageResponse<Vec<u8>> {
        self.bucket.read_file(self).await
    }

    /// Open the file as a byte stream.
    pub async fn stream(&self) -> StorageResponse<ByteStream> {
        self.bucket.read_stream(self).await
    }

    /// Public URL, when the provider has a public URL base.
    pub fn public_url(&self) -> Option<String> {
        self.bucket.public_url_of(&self.path)
    }

    /// Underlying filesystem path, for backends that have one.
    pub fn native_path(&self) -> Option<PathBuf> {
        self.bucket.get_native_path(self).result
    }

    /// Copy to `dest`, leaving this entity untouched.
    pub async fn copy_to<'a>(
        &self,
        dest: impl Into<Location<'a>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageFile>> {
        self.bucket.copy_file(self, dest, options).await
    }

    /// Move to `dest`. On success this entity points at the new location
    /// and the new storage URI is returned.
    pub async fn move_to<'a>(&mut self, dest: impl Into<Location<'a>>) -> StorageResponse<String> {
        let moved = self
            .bucket
            .move_file(&*self, dest, ReturnOptions::returning())
            .await
            .into_result()
            .map(|returned| match returned {
                Returned::Entity(file) => {
                    *self = file;
                    self.storage_uri()
                }
                Returned::Uri(uri) => uri,
            });
        moved.into()
    }

    /// Delete the file. Missing files are not an error.
    pub async fn delete(&self) -> StorageResponse<bool> {
        self.bucket.delete_file(self).await
    }
}

/// A directory inside a bucket.
#[derive(Debug, Clone)]
pub struct StorageDirectory {
    bucket: Bucket,
    path: NormalizedPath,
}

impl StorageDirectory {
    pub(crate) fn new(bucket: Bucket, path: NormalizedPath) -> Self {
        Self { bucket, path }
    }

    /// Owning bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Path relative to the bucket root.
    pub fn absolute_path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Base name; empty for the bucket root.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// Resolved storage URI.
    pub fn uri(&self) -> StorageUri {
        self.bucket.uri(self.path.clone())
    }

    /// `provider://bucket/path`
    pub fn storage_uri(&self) -> String {
        self.uri().to_string()
    }

    /// Create a directory at `dest`, joined to this directory's path when
    /// relative.
    pub async fn make_directory<'a>(
        &self,
        dest: impl Into<Location<'a>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageDirectory>> {
        let target = match resolve_relative(&dest.into(), &self.uri()) {
            Ok(uri) => uri,
            Err(e) => return StorageResponse::err(e),
        };
        self.bucket.make_directory(target, options).await
    }

    /// Create this directory and any missing parents.
    pub async fn save(&self) -> StorageResponse<bool> {
        self.bucket
            .make_directory(self, ReturnOptions::default())
            .await
            .map(|_| true)
    }

    /// Delete everything inside this directory.
    pub async fn empty(&self) -> StorageResponse<bool> {
        self.bucket.empty_directory(self).await
    }

    /// Delete this directory and its contents.
    pub async fn delete(&self) -> StorageResponse<bool> {
        self.bucket.delete_directory(self).await
    }

    /// List files below this directory.
    pub async fn list_files(&self, options: ListOptions) -> StorageResponse<FileList> {
        self.bucket.list_files(self, options).await
    }

    /// Copy the tree to `dest`.
    pub async fn copy_to<'a>(
        &self,
        dest: impl Into<Location<'a>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageDirectory>> {
        self.bucket.copy_directory(self, dest, options).await
    }

    /// Move the tree to `dest` and point this entity at it.
    pub async fn move_to<'a>(&mut self, dest: impl Into<Location<'a>>) -> StorageResponse<String> {
        let moved = self
            .bucket
            .move_directory(&*self, dest, ReturnOptions::returning())
            .await
            .into_result()
            .map(|returned| match returned {
                Returned::Entity(dir) => {
                    *self = dir;
                    self.storage_uri()
                }
                Returned::Uri(uri) => uri,
            });
        moved.into()
    }
}
