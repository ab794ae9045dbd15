//! Local filesystem storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use crate::provider::{guess_mime, ByteStream, Metadata, StorageProvider};
use filestore_common::{Error, NormalizedPath, Result};

/// Suffix of in-flight staging files; never listed.
const STAGING_SUFFIX: &str = ".partial";

/// Local filesystem storage provider.
///
/// Every bucket lives in a sub-directory of one root, so moves and copies
/// between buckets stay on the same filesystem.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a new local provider with the given root directory.
    ///
    /// The directory is created by [`StorageProvider::init`].
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of this provider.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a provider path to a filesystem path.
    fn to_fs_path(&self, path: &NormalizedPath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for segment in path.segments() {
            fs_path.push(segment);
        }
        fs_path
    }

    /// Sibling path used while a write is in flight.
    fn staging_path(target: &Path) -> Result<PathBuf> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::InvalidPath("Cannot write to the provider root".to_string()))?;
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        Ok(parent.join(format!(".{}.{}{}", name, Uuid::new_v4(), STAGING_SUFFIX)))
    }

    fn is_staging_name(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
    }

    /// Create metadata from filesystem metadata.
    fn create_metadata(&self, path: &NormalizedPath, fs_meta: std::fs::Metadata) -> Metadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());
        let name = path.name().unwrap_or("/").to_string();

        Metadata {
            mime: if fs_meta.is_file() { guess_mime(&name) } else { None },
            name,
            path: path.clone(),
            size: if fs_meta.is_file() {
                Some(fs_meta.len())
            } else {
                None
            },
            is_directory: fs_meta.is_dir(),
            modified,
            etag: Some(format!("{}-{}", modified.timestamp(), fs_meta.len())),
        }
    }

    async fn ensure_parent(fs_path: &Path) -> Result<()> {
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn require_file(&self, path: &NormalizedPath) -> Result<PathBuf> {
        let fs_path = self.to_fs_path(path);
        match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_file() => Ok(fs_path),
            Ok(_) => Err(Error::InvalidInput(format!("Not a file: {}", path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("File not found: {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stream into the staging file, then rename over the target.
    async fn write_staged(&self, target: &Path, mut stream: ByteStream) -> Result<()> {
        let staging = Self::staging_path(target)?;
        let written = async {
            let mut file = fs::File::create(&staging).await?;
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<(), Error>(())
        }
        .await;

        let committed = match written {
            Ok(()) => fs::rename(&staging, target).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if committed.is_err() {
            let _ = fs::remove_file(&staging).await;
        }
        committed
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "Local provider root ready");
        Ok(())
    }

    async fn read(&self, path: &NormalizedPath) -> Result<ByteStream> {
        let fs_path = self.require_file(path).await?;
        let file = fs::File::open(&fs_path).await?;
        let stream = ReaderStream::new(file)
            .map_ok(|chunk| chunk.to_vec())
            .map_err(Error::from);
        Ok(Box::pin(stream))
    }

    async fn write(&self, path: &NormalizedPath, stream: ByteStream) -> Result<Metadata> {
        let fs_path = self.to_fs_path(path);
        if fs_path.is_dir() {
            return Err(Error::AlreadyExists(format!(
                "A directory exists at {}",
                path
            )));
        }
        Self::ensure_parent(&fs_path).await?;
        self.write_staged(&fs_path, stream).await?;

        let fs_meta = fs::metadata(&fs_path).await?;
        Ok(self.create_metadata(path, fs_meta))
    }

    async fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        let fs_path = self.to_fs_path(path);
        match fs::metadata(&fs_path).await {
            Ok(fs_meta) => Ok(self.create_metadata(path, fs_meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Path not found: {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool> {
        Ok(fs::try_exists(self.to_fs_path(path)).await?)
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<Metadata>> {
        let fs_path = self.to_fs_path(path);

        if !fs_path.exists() {
            return Err(Error::NotFound(format!("Directory not found: {}", path)));
        }

        if !fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&fs_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_staging_name(&name) {
                continue;
            }

            let child = path.child(&name)?;
            let fs_meta = entry.metadata().await?;
            results.push(self.create_metadata(&child, fs_meta));
        }

        Ok(results)
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<()> {
        let fs_path = self.require_file(path).await?;
        fs::remove_file(&fs_path).await?;
        Ok(())
    }

    async fn mkdir(&self, path: &NormalizedPath) -> Result<Metadata> {
        let fs_path = self.to_fs_path(path);

        if fs_path.is_file() {
            return Err(Error::AlreadyExists(format!(
                "A file exists at {}",
                path
            )));
        }

        fs::create_dir_all(&fs_path).await?;

        let fs_meta = fs::metadata(&fs_path).await?;
        Ok(self.create_metadata(path, fs_meta))
    }

    async fn rmdir(&self, path: &NormalizedPath, recursive: bool) -> Result<()> {
        let fs_path = self.to_fs_path(path);

        if !fs_path.exists() {
            return Err(Error::NotFound(format!("Directory not found: {}", path)));
        }

        if !fs_path.is_dir() {
            return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
        }

        if recursive {
            fs::remove_dir_all(&fs_path).await?;
            return Ok(());
        }

        let mut entries = fs::read_dir(&fs_path).await?;
        if entries.next_entry().await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "Directory not empty: {}",
                path
            )));
        }

        fs::remove_dir(&fs_path).await?;
        Ok(())
    }

    async fn native_copy(
        &self,
        from: &NormalizedPath,
        to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        let from_path = self.require_file(from).await?;
        let to_path = self.to_fs_path(to);
        Self::ensure_parent(&to_path).await?;

        let staging = Self::staging_path(&to_path)?;
        let copied = match fs::copy(&from_path, &staging).await {
            Ok(_) => fs::rename(&staging, &to_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = copied {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        let fs_meta = fs::metadata(&to_path).await?;
        Ok(Some(self.create_metadata(to, fs_meta)))
    }

    async fn native_move(
        &self,
        from: &NormalizedPath,
        to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        let from_path = self.require_file(from).await?;
        let to_path = self.to_fs_path(to);
        Self::ensure_parent(&to_path).await?;

        fs::rename(&from_path, &to_path).await?;

        let fs_meta = fs::metadata(&to_path).await?;
        Ok(Some(self.create_metadata(to, fs_meta)))
    }

    fn cross_bucket_native(&self) -> bool {
        true
    }

    fn native_path(&self, path: &NormalizedPath) -> Option<PathBuf> {
        Some(self.to_fs_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{bytes_stream, collect_stream};
    use tempfile::TempDir;

    fn p(path: &str) -> NormalizedPath {
        NormalizedPath::parse(path).unwrap()
    }

    async fn provider(temp: &TempDir) -> LocalProvider {
        let provider = LocalProvider::new(temp.path().join("root"));
        provider.init().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn test_local_write_read() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;
        let data = b"Hello, Local!".to_vec();

        let meta = provider.write(&p("/nested/test.txt"), bytes_stream(data.clone())).await.unwrap();
        assert_eq!(meta.size, Some(data.len() as u64));
        assert_eq!(meta.mime.as_deref(), Some("text/plain"));

        let read = collect_stream(provider.read(&p("nested/test.txt")).await.unwrap()).await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(b"partial".to_vec()), Err(Error::backend("stream broke"))];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

        assert!(provider.write(&p("broken.txt"), stream).await.is_err());
        assert!(!provider.exists(&p("broken.txt")).await.unwrap());
        assert!(provider.list(&NormalizedPath::root()).await.unwrap().is_empty());
        let leftovers = std::fs::read_dir(provider.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_local_mkdir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;

        let metadata = provider.mkdir(&p("/a/b")).await.unwrap();
        assert!(metadata.is_directory);
        assert!(provider.mkdir(&p("/a/b")).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_list() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;

        provider.write(&p("/dir/file1.txt"), bytes_stream(vec![1])).await.unwrap();
        provider.write(&p("/dir/file2.txt"), bytes_stream(vec![2])).await.unwrap();
        provider.mkdir(&p("/dir/sub")).await.unwrap();

        let contents = provider.list(&p("/dir")).await.unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents.iter().filter(|m| m.is_directory).count(), 1);
    }

    #[tokio::test]
    async fn test_local_rmdir_requires_empty() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;
        provider.write(&p("/dir/file.txt"), bytes_stream(vec![1])).await.unwrap();

        assert!(provider.rmdir(&p("dir"), false).await.is_err());
        provider.rmdir(&p("dir"), true).await.unwrap();
        assert!(!provider.exists(&p("dir")).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_native_move_and_copy() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;
        provider.write(&p("a/one.txt"), bytes_stream(b"1".to_vec())).await.unwrap();

        provider.native_copy(&p("a/one.txt"), &p("b/copy.txt")).await.unwrap().unwrap();
        provider.native_move(&p("a/one.txt"), &p("c/moved.txt")).await.unwrap().unwrap();

        assert!(!provider.exists(&p("a/one.txt")).await.unwrap());
        assert!(provider.exists(&p("b/copy.txt")).await.unwrap());
        assert!(provider.exists(&p("c/moved.txt")).await.unwrap());
        assert_eq!(
            provider.native_path(&p("c/moved.txt")).unwrap(),
            temp.path().join("root").join("c").join("moved.txt")
        );
    }

    #[tokio::test]
    async fn test_local_delete_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp).await;
        let err = provider.delete(&p("missing.txt")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
