//! In-memory storage provider.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::provider::{bytes_stream, collect_stream, guess_mime, ByteStream, Metadata, StorageProvider};
use filestore_common::{Error, NormalizedPath, Result};

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, metadata: Metadata },
    Directory { metadata: Metadata },
}

impl Entry {
    fn metadata(&self) -> &Metadata {
        match self {
            Entry::File { metadata, .. } | Entry::Directory { metadata } => metadata,
        }
    }
}

/// In-memory storage provider.
///
/// Behaves like an object store: puts are atomic, parent directories are
/// implicit, and server-side copy/move stays within a bucket. All data is
/// lost on drop.
pub struct MemoryProvider {
    storage: RwLock<BTreeMap<NormalizedPath, Entry>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider.
    pub fn new() -> Self {
        let mut storage = BTreeMap::new();
        let root = NormalizedPath::root();
        storage.insert(
            root.clone(),
            Entry::Directory {
                metadata: Self::dir_metadata(&root),
            },
        );
        Self {
            storage: RwLock::new(storage),
        }
    }

    fn read_storage(&self) -> RwLockReadGuard<'_, BTreeMap<NormalizedPath, Entry>> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_storage(&self) -> RwLockWriteGuard<'_, BTreeMap<NormalizedPath, Entry>> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn dir_metadata(path: &NormalizedPath) -> Metadata {
        Metadata {
            name: path.name().unwrap_or("/").to_string(),
            path: path.clone(),
            size: None,
            is_directory: true,
            mime: None,
            modified: Utc::now(),
            etag: Some(Uuid::new_v4().to_string()),
        }
    }

    fn file_metadata(path: &NormalizedPath, len: usize) -> Metadata {
        let name = path.name().unwrap_or("/").to_string();
        Metadata {
            mime: guess_mime(&name),
            name,
            path: path.clone(),
            size: Some(len as u64),
            is_directory: false,
            modified: Utc::now(),
            etag: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Create every missing ancestor directory of `path` (and `path` itself
    /// when `include_self`).
    fn ensure_dirs(
        storage: &mut BTreeMap<NormalizedPath, Entry>,
        path: &NormalizedPath,
        include_self: bool,
    ) -> Result<()> {
        let depth = if include_self { path.depth() } else { path.depth().saturating_sub(1) };
        let mut current = NormalizedPath::root();
        for segment in &path.segments()[..depth] {
            current = current.child(segment)?;
            match storage.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(Error::InvalidInput(format!(
                        "{} is a file, not a directory",
                        current
                    )));
                }
                None => {
                    storage.insert(
                        current.clone(),
                        Entry::Directory {
                            metadata: Self::dir_metadata(&current),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn put(&self, path: &NormalizedPath, data: Vec<u8>) -> Result<Metadata> {
        let mut storage = self.write_storage();
        if let Some(Entry::Directory { .. }) = storage.get(path) {
            return Err(Error::AlreadyExists(format!(
                "A directory exists at {}",
                path
            )));
        }
        Self::ensure_dirs(&mut storage, path, false)?;

        let metadata = Self::file_metadata(path, data.len());
        storage.insert(
            path.clone(),
            Entry::File {
                data,
                metadata: metadata.clone(),
            },
        );
        Ok(metadata)
    }

    fn file_data(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        match self.read_storage().get(path) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => {
                Err(Error::InvalidInput(format!("Not a file: {}", path)))
            }
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, path: &NormalizedPath) -> Result<ByteStream> {
        Ok(bytes_stream(self.file_data(path)?))
    }

    async fn write(&self, path: &NormalizedPath, stream: ByteStream) -> Result<Metadata> {
        // Buffer fully before the put so a broken stream never lands.
        let data = collect_stream(stream).await?;
        self.put(path, data)
    }

    async fn stat(&self, path: &NormalizedPath) -> Result<Metadata> {
        self.read_storage()
            .get(path)
            .map(|entry| entry.metadata().clone())
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", path)))
    }

    async fn exists(&self, path: &NormalizedPath) -> Result<bool> {
        Ok(self.read_storage().contains_key(path))
    }

    async fn list(&self, path: &NormalizedPath) -> Result<Vec<Metadata>> {
        let storage = self.read_storage();

        match storage.get(path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
            }
            None => {
                return Err(Error::NotFound(format!("Directory not found: {}", path)));
            }
        }

        let results = storage
            .iter()
            .filter(|(key, _)| key.depth() == path.depth() + 1 && key.starts_with(path))
            .map(|(_, entry)| entry.metadata().clone())
            .collect();

        Ok(results)
    }

    async fn delete(&self, path: &NormalizedPath) -> Result<()> {
        let mut storage = self.write_storage();

        match storage.get(path) {
            Some(Entry::File { .. }) => {
                storage.remove(path);
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                Err(Error::InvalidInput(format!("Not a file: {}", path)))
            }
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn mkdir(&self, path: &NormalizedPath) -> Result<Metadata> {
        let mut storage = self.write_storage();
        if let Some(Entry::File { .. }) = storage.get(path) {
            return Err(Error::AlreadyExists(format!("A file exists at {}", path)));
        }
        Self::ensure_dirs(&mut storage, path, true)?;
        storage
            .get(path)
            .map(|entry| entry.metadata().clone())
            .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", path)))
    }

    async fn rmdir(&self, path: &NormalizedPath, recursive: bool) -> Result<()> {
        let mut storage = self.write_storage();

        match storage.get(path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
            }
            None => {
                return Err(Error::NotFound(format!("Directory not found: {}", path)));
            }
        }

        let descendants: Vec<NormalizedPath> = storage
            .keys()
            .filter(|key| key.depth() > path.depth() && key.starts_with(path))
            .cloned()
            .collect();

        if !descendants.is_empty() && !recursive {
            return Err(Error::InvalidInput(format!(
                "Directory not empty: {}",
                path
            )));
        }

        for key in descendants {
            storage.remove(&key);
        }
        if !path.is_root() {
            storage.remove(path);
        }
        Ok(())
    }

    async fn native_copy(
        &self,
        from: &NormalizedPath,
        to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        let data = self.file_data(from)?;
        self.put(to, data).map(Some)
    }

    async fn native_move(
        &self,
        from: &NormalizedPath,
        to: &NormalizedPath,
    ) -> Result<Option<Metadata>> {
        let data = self.file_data(from)?;
        let metadata = self.put(to, data)?;
        if from != to {
            self.write_storage().remove(from);
        }
        Ok(Some(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> NormalizedPath {
        NormalizedPath::parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_write_read() {
        let provider = MemoryProvider::new();
        let data = b"Hello, World!".to_vec();

        provider.write(&p("/test.txt"), bytes_stream(data.clone())).await.unwrap();
        let read = collect_stream(provider.read(&p("/test.txt")).await.unwrap()).await.unwrap();

        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_implicit_parent_directories() {
        let provider = MemoryProvider::new();
        provider.write(&p("a/b/c.txt"), bytes_stream(vec![1])).await.unwrap();

        assert!(provider.stat(&p("a")).await.unwrap().is_directory);
        assert!(provider.stat(&p("a/b")).await.unwrap().is_directory);
        assert_eq!(provider.list(&NormalizedPath::root()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_stream_is_not_stored() {
        let provider = MemoryProvider::new();
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(vec![1]), Err(Error::backend("reset"))];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

        assert!(provider.write(&p("x.bin"), stream).await.is_err());
        assert!(!provider.exists(&p("x.bin")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = MemoryProvider::new();
        let path = p("/test.txt");

        provider.write(&path, bytes_stream(vec![1, 2, 3])).await.unwrap();
        provider.delete(&path).await.unwrap();
        assert!(!provider.exists(&path).await.unwrap());
        assert!(provider.delete(&path).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_direct_children_only() {
        let provider = MemoryProvider::new();

        provider.mkdir(&p("/dir")).await.unwrap();
        provider.write(&p("/dir/file1.txt"), bytes_stream(vec![1])).await.unwrap();
        provider.write(&p("/dir/file2.txt"), bytes_stream(vec![2])).await.unwrap();
        provider.write(&p("/dir/sub/deep.txt"), bytes_stream(vec![3])).await.unwrap();

        let contents = provider.list(&p("/dir")).await.unwrap();
        assert_eq!(contents.len(), 3);
    }

    #[tokio::test]
    async fn test_rmdir() {
        let provider = MemoryProvider::new();
        provider.write(&p("/dir/sub/deep.txt"), bytes_stream(vec![3])).await.unwrap();

        assert!(provider.rmdir(&p("dir"), false).await.is_err());
        provider.rmdir(&p("dir"), true).await.unwrap();
        assert!(!provider.exists(&p("dir/sub/deep.txt")).await.unwrap());
        assert!(!provider.exists(&p("dir")).await.unwrap());
    }

    #[tokio::test]
    async fn test_native_move() {
        let provider = MemoryProvider::new();
        let from = p("/old.txt");
        let to = p("/new/new.txt");

        provider.write(&from, bytes_stream(vec![1, 2, 3])).await.unwrap();
        provider.native_move(&from, &to).await.unwrap().unwrap();

        assert!(!provider.exists(&from).await.unwrap());
        assert!(provider.exists(&to).await.unwrap());
        assert!(!provider.cross_bucket_native());
    }

    #[tokio::test]
    async fn test_native_copy() {
        let provider = MemoryProvider::new();
        let data = vec![1, 2, 3];

        provider.write(&p("/original.txt"), bytes_stream(data.clone())).await.unwrap();
        provider.native_copy(&p("/original.txt"), &p("/copy.txt")).await.unwrap();

        assert!(provider.exists(&p("/original.txt")).await.unwrap());
        let copied = collect_stream(provider.read(&p("/copy.txt")).await.unwrap()).await.unwrap();
        assert_eq!(copied, data);
    }
}
