//! Copy/move planning across buckets and providers.
//!
//! A transfer takes one of three routes:
//!
//! 1. Same bucket: the provider's native copy/rename.
//! 2. Same provider, different bucket: native, when the provider supports
//!    cross-bucket primitives; otherwise streamed.
//! 3. Different providers: read from the source, write to the destination,
//!    and for a move delete the source only once the write has succeeded.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use filestore_common::{Error, NormalizedPath, Result, StorageUri};

use crate::bucket::BucketContext;
use crate::provider::{Metadata, StorageProvider};

/// Whether the source survives the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// How a transfer is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Provider primitive inside one bucket.
    SameBucket,
    /// Provider primitive between two buckets of the same provider.
    NativeCrossBucket,
    /// Read from the source, write to the destination.
    Streamed,
}

/// Choose the route for a transfer between two resolved URIs.
///
/// `cross_bucket_native` is the source provider's capability flag.
pub fn plan_route(src: &StorageUri, dest: &StorageUri, cross_bucket_native: bool) -> Route {
    if src.provider != dest.provider {
        Route::Streamed
    } else if src.bucket == dest.bucket {
        Route::SameBucket
    } else if cross_bucket_native {
        Route::NativeCrossBucket
    } else {
        Route::Streamed
    }
}

/// Transfer one file and return the destination metadata.
pub(crate) async fn transfer_file(
    src: &BucketContext,
    src_path: &NormalizedPath,
    dest: &BucketContext,
    dest_path: &NormalizedPath,
    mode: TransferMode,
) -> Result<Metadata> {
    src.require_read()?;
    dest.require_write()?;
    if mode == TransferMode::Move {
        src.require_write()?;
    }

    let src_uri = src.uri(src_path.clone());
    let dest_uri = dest.uri(dest_path.clone());
    let src_native = src.to_provider_path(src_path);
    let dest_native = dest.to_provider_path(dest_path);

    if src_uri == dest_uri {
        return src.backend().stat(&src_native).await;
    }

    let route = plan_route(&src_uri, &dest_uri, src.backend().cross_bucket_native());
    debug!(src = %src_uri, dest = %dest_uri, ?route, ?mode, "Transferring file");

    if route != Route::Streamed {
        let native = match mode {
            TransferMode::Copy => src.backend().native_copy(&src_native, &dest_native).await?,
            TransferMode::Move => src.backend().native_move(&src_native, &dest_native).await?,
        };
        if let Some(metadata) = native {
            return Ok(metadata);
        }
        debug!(src = %src_uri, "No native primitive, falling back to streaming");
    }

    let stream = src.backend().read(&src_native).await?;
    let metadata = dest.backend().write(&dest_native, stream).await?;

    if mode == TransferMode::Move {
        src.backend().delete(&src_native).await?;
    }
    Ok(metadata)
}

/// Transfer every file below `src_dir` to the same relative path below
/// `dest_dir`. On move, emptied source directories are pruned, `src_dir`
/// included unless it is the bucket root. Returns the bucket-relative
/// destination paths.
pub(crate) async fn transfer_directory(
    src: &BucketContext,
    src_dir: &NormalizedPath,
    dest: &BucketContext,
    dest_dir: &NormalizedPath,
    mode: TransferMode,
) -> Result<Vec<NormalizedPath>> {
    let same_bucket = src.uri(src_dir.clone()).same_bucket(&dest.uri(dest_dir.clone()));
    if mode == TransferMode::Move && same_bucket && dest_dir.starts_with(src_dir) {
        return Err(Error::InvalidPath(format!(
            "Cannot move {} into itself ({})",
            src_dir, dest_dir
        )));
    }

    let src_root = src.to_provider_path(src_dir);
    let files: Vec<Metadata> = walk(src.backend(), &src_root, true)
        .await?
        .into_iter()
        .filter(|entry| !entry.is_directory)
        .collect();

    dest.require_write()?;
    dest.backend().mkdir(&dest.to_provider_path(dest_dir)).await?;

    let mut transferred = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .path
            .strip_prefix(&src_root)
            .ok_or_else(|| Error::backend(format!("{} is outside {}", file.path, src_root)))?;
        let src_path = src_dir.concat(&relative);
        let dest_path = dest_dir.concat(&relative);
        transfer_file(src, &src_path, dest, &dest_path, mode).await?;
        transferred.push(dest_path);
    }

    if mode == TransferMode::Move {
        prune_empty(src.backend(), src_root, !src_dir.is_root()).await?;
    }
    Ok(transferred)
}

/// List below `root`: direct children, or the full tree when `recursive`.
/// Breadth-first; order within a level is whatever the backend returns.
pub(crate) async fn walk(
    backend: &Arc<dyn StorageProvider>,
    root: &NormalizedPath,
    recursive: bool,
) -> Result<Vec<Metadata>> {
    let mut entries = Vec::new();
    let mut pending = VecDeque::from([root.clone()]);

    while let Some(dir) = pending.pop_front() {
        for entry in backend.list(&dir).await? {
            if recursive && entry.is_directory {
                pending.push_back(entry.path.clone());
            }
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Remove directories that contain no files, children before parents.
/// `dir` itself is removed only when `remove_self`. Resolves to whether
/// `dir` ended up empty.
pub(crate) fn prune_empty(
    backend: &Arc<dyn StorageProvider>,
    dir: NormalizedPath,
    remove_self: bool,
) -> BoxFuture<'_, Result<bool>> {
    Box::pin(async move {
        let mut remaining = 0usize;
        for entry in backend.list(&dir).await? {
            if entry.is_directory {
                if !prune_empty(backend, entry.path, true).await? {
                    remaining += 1;
                }
            } else {
                remaining += 1;
            }
        }

        if remaining == 0 && remove_self {
            debug!(dir = %dir, "Pruning empty directory");
            backend.rmdir(&dir, false).await?;
        }
        Ok(remaining == 0)
    })
}
