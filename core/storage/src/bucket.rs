//! Bucket: the unit of isolation and path resolution within a provider.
//!
//! Every public operation returns a [`StorageResponse`]. Paths given as
//! plain text resolve against the bucket; `provider://bucket/path` strings
//! and entity references may address any registered bucket.

use futures::stream::{self, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use filestore_common::{Error, NormalizedPath, Result, StorageUri};

use crate::content::Content;
use crate::entry::{StorageDirectory, StorageFile};
use crate::pattern::{Matchable, Pattern};
use crate::planner::{prune_empty, transfer_directory, transfer_file, walk, TransferMode};
use crate::provider::{collect_stream, ByteStream, Metadata, StorageProvider};
use crate::registry::{BucketState, Provider, ProviderRegistry};
use crate::resolver::{resolve, resolve_destination, Location};
use crate::response::{Returned, StorageResponse};

/// Per-entry operations a batch keeps in flight at once.
const BATCH_CONCURRENCY: usize = 16;

/// Characters escaped in public URL path segments.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Options for operations that can return the resolved entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnOptions {
    /// Return the entity instead of its storage URI.
    pub returning: bool,
}

impl ReturnOptions {
    /// Ask for the resolved entity.
    pub fn returning() -> Self {
        Self { returning: true }
    }
}

/// Options for [`Bucket::list_files`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Traverse the whole subtree instead of direct children only.
    pub recursive: bool,
    /// Glob filter applied to paths relative to the listed directory.
    pub pattern: Option<String>,
    /// Return [`StorageFile`] entities with metadata instead of URIs.
    pub returning: bool,
}

impl ListOptions {
    /// Recursive listing.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Default::default()
        }
    }

    /// Filter with a glob pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Return entities.
    pub fn with_returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

/// Result of [`Bucket::list_files`]. Order is not guaranteed.
#[derive(Debug, Clone, Default)]
pub struct FileList {
    /// One entry per listed file, URI or entity per the `returning` option.
    pub entries: Vec<Returned<StorageFile>>,
}

impl FileList {
    /// Number of listed files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Storage URIs of every entry.
    pub fn uris(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| match entry {
                Returned::Uri(uri) => uri.clone(),
                Returned::Entity(file) => file.storage_uri(),
            })
            .collect()
    }
}

/// A listed file with its path relative to the listing root.
#[derive(Debug, Clone)]
pub(crate) struct ListedFile {
    path: NormalizedPath,
    relative: NormalizedPath,
    metadata: Metadata,
}

impl Matchable for ListedFile {
    fn relative_path(&self) -> &NormalizedPath {
        &self.relative
    }
}

/// Live view of a registered bucket, resolved through the registry on
/// every call.
pub(crate) struct BucketContext {
    provider: Arc<Provider>,
    bucket: String,
    state: BucketState,
}

impl BucketContext {
    pub(crate) fn new(provider: Arc<Provider>, bucket: String, state: BucketState) -> Self {
        Self {
            provider,
            bucket,
            state,
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn StorageProvider> {
        self.provider.backend()
    }

    /// Bucket path to provider path.
    pub(crate) fn to_provider_path(&self, path: &NormalizedPath) -> NormalizedPath {
        self.state.root.concat(path)
    }

    /// Provider path back to bucket path.
    fn to_bucket_path(&self, path: &NormalizedPath) -> Result<NormalizedPath> {
        path.strip_prefix(&self.state.root).ok_or_else(|| {
            Error::backend(format!(
                "{} is outside bucket '{}'",
                path, self.bucket
            ))
        })
    }

    pub(crate) fn uri(&self, path: NormalizedPath) -> StorageUri {
        StorageUri::new(self.provider.name(), self.bucket.clone(), path)
    }

    pub(crate) fn require_read(&self) -> Result<()> {
        if self.state.mode.can_read() {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "Bucket '{}' is not readable",
                self.bucket
            )))
        }
    }

    pub(crate) fn require_write(&self) -> Result<()> {
        if self.state.mode.can_write() {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "Bucket '{}' is not writable",
                self.bucket
            )))
        }
    }

    fn public_url(&self, path: &NormalizedPath) -> Option<String> {
        let base = self.provider.config().public_url.as_deref()?;
        let mut url = base.trim_end_matches('/').to_string();
        for segment in self.to_provider_path(path).segments() {
            url.push('/');
            url.extend(utf8_percent_encode(segment, URL_SEGMENT));
        }
        Some(url)
    }

    fn native_path(&self, path: &NormalizedPath) -> Option<PathBuf> {
        self.backend().native_path(&self.to_provider_path(path))
    }
}

/// Handle to a bucket.
///
/// Holds only the provider and bucket names plus the registry; the bucket
/// itself is owned by its provider. Cheap to clone.
#[derive(Clone)]
pub struct Bucket {
    registry: ProviderRegistry,
    provider: String,
    name: String,
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .finish()
    }
}

impl Bucket {
    pub(crate) fn new(registry: ProviderRegistry, provider: String, name: String) -> Self {
        Self {
            registry,
            provider,
            name,
        }
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning provider.
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// The owning provider.
    pub fn provider(&self) -> Result<Arc<Provider>> {
        self.registry.get_provider(&self.provider)
    }

    /// The registry this bucket resolves through.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// URI of a path in this bucket.
    pub fn uri(&self, path: NormalizedPath) -> StorageUri {
        StorageUri::new(self.provider.clone(), self.name.clone(), path)
    }

    pub(crate) fn context(&self) -> Result<BucketContext> {
        self.registry.context(&self.provider, &self.name)
    }

    /// Resolve against this bucket and look up the target bucket.
    fn locate(&self, location: &Location<'_>) -> Result<(BucketContext, NormalizedPath)> {
        let uri = resolve(location, Some(self))?;
        let context = self.registry.context_for(&uri)?;
        Ok((context, uri.path))
    }

    fn handle(&self, context: &BucketContext) -> Bucket {
        Bucket::new(
            self.registry.clone(),
            context.provider.name().to_string(),
            context.bucket.clone(),
        )
    }

    fn returned_file(
        &self,
        context: &BucketContext,
        path: NormalizedPath,
        metadata: Option<Metadata>,
        returning: bool,
    ) -> Returned<StorageFile> {
        if returning {
            Returned::Entity(StorageFile::new(self.handle(context), path, metadata))
        } else {
            Returned::Uri(context.uri(path).to_string())
        }
    }

    fn returned_directory(
        &self,
        context: &BucketContext,
        path: NormalizedPath,
        returning: bool,
    ) -> Returned<StorageDirectory> {
        if returning {
            Returned::Entity(StorageDirectory::new(self.handle(context), path))
        } else {
            Returned::Uri(context.uri(path).to_string())
        }
    }

    pub(crate) async fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        let context = self.context()?;
        context.require_read()?;
        context.backend().stat(&context.to_provider_path(path)).await
    }

    pub(crate) fn public_url_of(&self, path: &NormalizedPath) -> Option<String> {
        self.context().ok()?.public_url(path)
    }

    /// Files below `dir`, with paths relative to it.
    async fn listed_files(
        context: &BucketContext,
        dir: &NormalizedPath,
        recursive: bool,
    ) -> Result<Vec<ListedFile>> {
        let entries = walk(context.backend(), &context.to_provider_path(dir), recursive).await?;
        let mut files = Vec::new();
        for metadata in entries.into_iter().filter(|m| !m.is_directory) {
            let path = context.to_bucket_path(&metadata.path)?;
            let relative = path.strip_prefix(dir).unwrap_or_else(|| path.clone());
            files.push(ListedFile {
                path,
                relative,
                metadata,
            });
        }
        Ok(files)
    }

    // ----- files -----

    /// Write a file from bytes, text or a byte stream.
    ///
    /// Returns the storage URI, or the [`StorageFile`] when
    /// `options.returning` is set.
    pub async fn put_file<'a>(
        &self,
        path: impl Into<Location<'a>>,
        content: impl Into<Content>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageFile>> {
        self.put_file_inner(path.into(), content.into(), options).await.into()
    }

    async fn put_file_inner(
        &self,
        location: Location<'_>,
        content: Content,
        options: ReturnOptions,
    ) -> Result<Returned<StorageFile>> {
        let (context, path) = self.locate(&location)?;
        context.require_write()?;
        if path.is_root() {
            return Err(Error::InvalidPath("Cannot write a file at the bucket root".to_string()));
        }

        debug!(uri = %context.uri(path.clone()), ?content, "Putting file");
        let metadata = context
            .backend()
            .write(&context.to_provider_path(&path), content.into_stream())
            .await?;
        Ok(self.returned_file(&context, path, Some(metadata), options.returning))
    }

    /// Get a file entity. Fails with `NotFound` for missing paths and
    /// directories.
    pub async fn get_file<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<StorageFile> {
        self.get_file_inner(path.into()).await.into()
    }

    async fn get_file_inner(&self, location: Location<'_>) -> Result<StorageFile> {
        let (context, path) = self.locate(&location)?;
        context.require_read()?;
        self.stat_file(&context, path).await
    }

    /// Stat a file in an already resolved bucket. Directories are `NotFound`.
    async fn stat_file(&self, context: &BucketContext, path: NormalizedPath) -> Result<StorageFile> {
        let metadata = context.backend().stat(&context.to_provider_path(&path)).await?;
        if metadata.is_directory {
            return Err(Error::NotFound(format!(
                "{} is a directory, not a file",
                context.uri(path)
            )));
        }
        Ok(StorageFile::new(self.handle(context), path, Some(metadata)))
    }

    /// Whether a file exists at `path`.
    pub async fn file_exists<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<bool> {
        self.find_file(path.into()).await.map(|found| found.is_some()).into()
    }

    /// Like [`Bucket::file_exists`], but fetches the entity with its
    /// metadata when the file exists.
    pub async fn file_exists_returning<'a>(
        &self,
        path: impl Into<Location<'a>>,
    ) -> StorageResponse<Option<StorageFile>> {
        self.find_file(path.into()).await.into()
    }

    /// Only a missing entry maps to `None`; an unregistered bucket or
    /// provider stays an error.
    async fn find_file(&self, location: Location<'_>) -> Result<Option<StorageFile>> {
        let (context, path) = self.locate(&location)?;
        context.require_read()?;
        match self.stat_file(&context, path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a whole file.
    pub async fn read_file<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<Vec<u8>> {
        let read = async {
            let stream = self.read_stream_inner(path.into()).await?;
            collect_stream(stream).await
        };
        read.await.into()
    }

    /// Open a file as a byte stream.
    pub async fn read_stream<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<ByteStream> {
        self.read_stream_inner(path.into()).await.into()
    }

    async fn read_stream_inner(&self, location: Location<'_>) -> Result<ByteStream> {
        let (context, path) = self.locate(&location)?;
        context.require_read()?;
        context.backend().read(&context.to_provider_path(&path)).await
    }

    /// List files below `path`.
    ///
    /// Only files are listed. With a pattern, entries are filtered by their
    /// path relative to `path`.
    pub async fn list_files<'a>(
        &self,
        path: impl Into<Location<'a>>,
        options: ListOptions,
    ) -> StorageResponse<FileList> {
        self.list_files_inner(path.into(), options).await.into()
    }

    async fn list_files_inner(&self, location: Location<'_>, options: ListOptions) -> Result<FileList> {
        let (context, dir) = self.locate(&location)?;
        context.require_read()?;
        let pattern = options.pattern.as_deref().map(Pattern::new).transpose()?;

        let mut files = Self::listed_files(&context, &dir, options.recursive).await?;
        if let Some(pattern) = &pattern {
            files = pattern.expand(files);
        }
        debug!(dir = %context.uri(dir.clone()), count = files.len(), "Listed files");

        let entries = files
            .into_iter()
            .map(|file| {
                self.returned_file(&context, file.path, Some(file.metadata), options.returning)
            })
            .collect();
        Ok(FileList { entries })
    }

    /// Copy a file. A destination ending in `/` (or naming a bucket root)
    /// keeps the source file name.
    pub async fn copy_file<'a, 'b>(
        &self,
        src: impl Into<Location<'a>>,
        dest: impl Into<Location<'b>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageFile>> {
        self.transfer_file_inner(src.into(), dest.into(), options, TransferMode::Copy)
            .await
            .into()
    }

    /// Move a file. The source is removed only after the destination has
    /// been written.
    pub async fn move_file<'a, 'b>(
        &self,
        src: impl Into<Location<'a>>,
        dest: impl Into<Location<'b>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageFile>> {
        self.transfer_file_inner(src.into(), dest.into(), options, TransferMode::Move)
            .await
            .into()
    }

    async fn transfer_file_inner(
        &self,
        src: Location<'_>,
        dest: Location<'_>,
        options: ReturnOptions,
        mode: TransferMode,
    ) -> Result<Returned<StorageFile>> {
        let src_uri = resolve(&src, Some(self))?;
        let dest_uri = resolve_destination(&dest, Some(self), src_uri.path.name())?;
        let src_context = self.registry.context_for(&src_uri)?;
        let dest_context = self.registry.context_for(&dest_uri)?;

        let metadata =
            transfer_file(&src_context, &src_uri.path, &dest_context, &dest_uri.path, mode).await?;
        Ok(self.returned_file(&dest_context, dest_uri.path, Some(metadata), options.returning))
    }

    /// Copy every file below `src_dir` matching `pattern` to the same
    /// relative path below `dest_dir`.
    ///
    /// Per-file failures are logged and left out of the result; the batch
    /// fails only when every matched file failed.
    pub async fn copy_files<'a, 'b>(
        &self,
        src_dir: impl Into<Location<'a>>,
        dest_dir: impl Into<Location<'b>>,
        pattern: &str,
    ) -> StorageResponse<Vec<String>> {
        self.transfer_files(src_dir.into(), dest_dir.into(), pattern, TransferMode::Copy)
            .await
            .into()
    }

    /// Move every file below `src_dir` matching `pattern`. Same partial
    /// success contract as [`Bucket::copy_files`].
    pub async fn move_files<'a, 'b>(
        &self,
        src_dir: impl Into<Location<'a>>,
        dest_dir: impl Into<Location<'b>>,
        pattern: &str,
    ) -> StorageResponse<Vec<String>> {
        self.transfer_files(src_dir.into(), dest_dir.into(), pattern, TransferMode::Move)
            .await
            .into()
    }

    async fn transfer_files(
        &self,
        src_dir: Location<'_>,
        dest_dir: Location<'_>,
        pattern: &str,
        mode: TransferMode,
    ) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)?;
        let (src, src_dir) = self.locate(&src_dir)?;
        let dest_uri = resolve(&dest_dir, Some(self))?;
        let dest = self.registry.context_for(&dest_uri)?;

        let matched = pattern.expand(Self::listed_files(&src, &src_dir, true).await?);
        debug!(pattern = pattern.as_str(), matched = matched.len(), ?mode, "Batch transfer");

        let (src, dest) = (&src, &dest);
        let outcomes: Vec<Result<String>> = stream::iter(matched.iter().map(|file| {
            let dest_path = dest_uri.path.concat(&file.relative);
            async move {
                transfer_file(src, &file.path, dest, &dest_path, mode)
                    .await
                    .map(|_| dest.uri(dest_path).to_string())
            }
        }))
        .buffered(BATCH_CONCURRENCY)
        .collect()
        .await;

        settle(outcomes, "transfer")
    }

    /// Delete a file. A missing file is not an error.
    pub async fn delete_file<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<bool> {
        self.delete_file_inner(path.into()).await.into()
    }

    async fn delete_file_inner(&self, location: Location<'_>) -> Result<bool> {
        let (context, path) = self.locate(&location)?;
        delete_in(&context, &path).await
    }

    /// Delete every file below `path` matching `pattern`. Returns the URIs
    /// of deleted files, with the partial success contract of
    /// [`Bucket::copy_files`].
    pub async fn delete_files<'a>(
        &self,
        path: impl Into<Location<'a>>,
        pattern: &str,
    ) -> StorageResponse<Vec<String>> {
        self.delete_files_inner(path.into(), pattern).await.into()
    }

    async fn delete_files_inner(&self, location: Location<'_>, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)?;
        let (context, dir) = self.locate(&location)?;
        context.require_write()?;

        let matched = pattern.expand(Self::listed_files(&context, &dir, true).await?);
        debug!(pattern = pattern.as_str(), matched = matched.len(), "Batch delete");

        let context = &context;
        let outcomes: Vec<Result<String>> = stream::iter(matched.into_iter().map(|file| async move {
            delete_in(context, &file.path)
                .await
                .map(|_| context.uri(file.path).to_string())
        }))
        .buffered(BATCH_CONCURRENCY)
        .collect()
        .await;

        settle(outcomes, "delete")
    }

    // ----- directories -----

    /// Create a directory and any missing parents.
    pub async fn make_directory<'a>(
        &self,
        path: impl Into<Location<'a>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageDirectory>> {
        self.make_directory_inner(path.into(), options).await.into()
    }

    async fn make_directory_inner(
        &self,
        location: Location<'_>,
        options: ReturnOptions,
    ) -> Result<Returned<StorageDirectory>> {
        let (context, path) = self.locate(&location)?;
        context.require_write()?;
        context.backend().mkdir(&context.to_provider_path(&path)).await?;
        debug!(uri = %context.uri(path.clone()), "Directory created");
        Ok(self.returned_directory(&context, path, options.returning))
    }

    /// Copy a directory tree. Destination directories are created as
    /// needed.
    pub async fn copy_directory<'a, 'b>(
        &self,
        src: impl Into<Location<'a>>,
        dest: impl Into<Location<'b>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageDirectory>> {
        self.transfer_directory_inner(src.into(), dest.into(), options, TransferMode::Copy)
            .await
            .into()
    }

    /// Move a directory tree, pruning the emptied source directories.
    pub async fn move_directory<'a, 'b>(
        &self,
        src: impl Into<Location<'a>>,
        dest: impl Into<Location<'b>>,
        options: ReturnOptions,
    ) -> StorageResponse<Returned<StorageDirectory>> {
        self.transfer_directory_inner(src.into(), dest.into(), options, TransferMode::Move)
            .await
            .into()
    }

    async fn transfer_directory_inner(
        &self,
        src: Location<'_>,
        dest: Location<'_>,
        options: ReturnOptions,
        mode: TransferMode,
    ) -> Result<Returned<StorageDirectory>> {
        let src_uri = resolve(&src, Some(self))?;
        let dest_uri = resolve_destination(&dest, Some(self), src_uri.path.name())?;
        let src_context = self.registry.context_for(&src_uri)?;
        let dest_context = self.registry.context_for(&dest_uri)?;

        let files =
            transfer_directory(&src_context, &src_uri.path, &dest_context, &dest_uri.path, mode)
                .await?;
        debug!(src = %src_uri, dest = %dest_uri, files = files.len(), ?mode, "Directory transferred");
        Ok(self.returned_directory(&dest_context, dest_uri.path, options.returning))
    }

    /// Delete a directory and everything below it. A missing directory is
    /// not an error; the bucket root is emptied instead of removed.
    pub async fn delete_directory<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<bool> {
        self.delete_directory_inner(path.into()).await.into()
    }

    async fn delete_directory_inner(&self, location: Location<'_>) -> Result<bool> {
        let (context, path) = self.locate(&location)?;
        context.require_write()?;
        if path.is_root() {
            return empty_in(&context, &path).await;
        }
        match context.backend().rmdir(&context.to_provider_path(&path), true).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Delete everything inside a directory, keeping the directory.
    pub async fn empty_directory<'a>(&self, dir: impl Into<Location<'a>>) -> StorageResponse<bool> {
        let emptied = async {
            let (context, path) = self.locate(&dir.into())?;
            context.require_write()?;
            empty_in(&context, &path).await
        };
        emptied.await.into()
    }

    /// Remove every directory that contains no files, deepest first, so a
    /// parent emptied by pruning its children goes in the same pass. The
    /// bucket root itself is kept.
    pub async fn remove_empty_directories(&self) -> StorageResponse<bool> {
        let pruned = async {
            let context = self.context()?;
            context.require_write()?;
            let root = context.to_provider_path(&NormalizedPath::root());
            prune_empty(context.backend(), root, false).await?;
            Ok::<_, Error>(true)
        };
        pruned.await.into()
    }

    // ----- access and lifecycle -----

    /// Whether the bucket's access mode allows reads. False once the bucket
    /// is unregistered.
    pub fn can_read(&self) -> bool {
        self.context().is_ok_and(|c| c.state.mode.can_read())
    }

    /// Whether the bucket's access mode allows writes. False once the
    /// bucket is unregistered.
    pub fn can_write(&self) -> bool {
        self.context().is_ok_and(|c| c.state.mode.can_write())
    }

    /// Underlying filesystem path of an entry, for backends that have one.
    pub fn get_native_path<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<PathBuf> {
        let native = || {
            let (context, path) = self.locate(&path.into())?;
            context.native_path(&path).ok_or_else(|| {
                Error::Resolution(format!(
                    "Provider '{}' has no native filesystem paths",
                    context.provider.name()
                ))
            })
        };
        native().into()
    }

    /// Public URL of an entry, when the provider has a public URL base.
    pub fn public_url<'a>(&self, path: impl Into<Location<'a>>) -> StorageResponse<Option<String>> {
        let url = || {
            let (context, path) = self.locate(&path.into())?;
            Ok::<_, Error>(context.public_url(&path))
        };
        url().into()
    }

    /// Unregister the bucket, leaving its contents in place.
    pub async fn destroy(&self) -> StorageResponse<bool> {
        let destroyed = async {
            self.provider()?.remove_bucket(&self.name)?;
            Ok::<_, Error>(true)
        };
        destroyed.await.into()
    }

    /// Delete the bucket's contents, then unregister it.
    pub async fn remove(&self) -> StorageResponse<bool> {
        let removed = async {
            let context = self.context()?;
            context.require_write()?;
            if context.state.root.is_root() {
                empty_in(&context, &NormalizedPath::root()).await?;
            } else {
                match context.backend().rmdir(&context.state.root, true).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            context.provider.remove_bucket(&self.name)?;
            info!(provider = %self.provider, bucket = %self.name, "Bucket contents removed");
            Ok::<_, Error>(true)
        };
        removed.await.into()
    }
}

/// Idempotent single-file delete inside one bucket.
async fn delete_in(context: &BucketContext, path: &NormalizedPath) -> Result<bool> {
    context.require_write()?;
    match context.backend().delete(&context.to_provider_path(path)).await {
        Ok(()) => {
            debug!(uri = %context.uri(path.clone()), "File deleted");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(true),
        Err(e) => Err(e),
    }
}

/// Remove all children of a directory.
async fn empty_in(context: &BucketContext, dir: &NormalizedPath) -> Result<bool> {
    let native = context.to_provider_path(dir);
    for entry in context.backend().list(&native).await? {
        if entry.is_directory {
            context.backend().rmdir(&entry.path, true).await?;
        } else {
            context.backend().delete(&entry.path).await?;
        }
    }
    Ok(true)
}

/// Collapse per-entry batch outcomes: keep successes in input order, log
/// failures, and fail only when nothing succeeded.
fn settle<T>(outcomes: Vec<Result<T>>, operation: &str) -> Result<Vec<T>> {
    let total = outcomes.len();
    let mut succeeded = Vec::with_capacity(total);
    let mut first_error = None;

    for outcome in outcomes {
        match outcome {
            Ok(value) => succeeded.push(value),
            Err(e) => {
                warn!(operation, error = %e, "Batch entry failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) if succeeded.is_empty() => Err(e),
        Some(_) => {
            warn!(operation, succeeded = succeeded.len(), total, "Batch partially succeeded");
            Ok(succeeded)
        }
        None => Ok(succeeded),
    }
}
