//! End-to-end flow across two local providers and an in-memory provider.

use filestore_storage::{
    bytes_stream, create_default_registry, BucketConfig, Error, ListOptions, ProviderConfig,
    ReturnOptions,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_storage_flow() {
    let temp = TempDir::new().unwrap();
    let registry = create_default_registry();

    // Providers: explicit config and connection string.
    let provider01 = registry
        .add_provider(
            "provider01",
            ProviderConfig::new("local", temp.path().join("provider01").to_string_lossy()),
        )
        .await
        .unwrap();
    let uri = format!(
        "fs://{}?name=provider02&mode=0777",
        temp.path().join("provider02").display()
    );
    let provider02 = registry.add_provider_from_uri(&uri).await.unwrap();
    assert!(temp.path().join("provider01").is_dir());
    assert!(temp.path().join("provider02").is_dir());

    let bucket01 = provider01
        .add_bucket("bucket01", BucketConfig::default())
        .await
        .into_result()
        .unwrap();
    let bucket02 = provider01
        .add_bucket("bucket02", BucketConfig::new("other/bucket02"))
        .await
        .into_result()
        .unwrap();
    let archive = provider02
        .add_bucket("archive", BucketConfig::default())
        .await
        .into_result()
        .unwrap();
    assert!(bucket01.can_read() && bucket01.can_write());

    // Put from text, bytes and a stream.
    let put = bucket01
        .put_file("file01.txt", "Test 01", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(put.as_uri(), Some("provider01://bucket01/file01.txt"));
    bucket01
        .put_file("/file 03.json", br#"{"n": 3}"#.to_vec(), ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    let streamed = bucket01
        .put_file("file02.txt", bytes_stream(b"Test 02".to_vec()), ReturnOptions::returning())
        .await
        .into_result()
        .unwrap()
        .into_entity()
        .unwrap();
    assert_eq!(streamed.metadata().await.unwrap().size, Some(7));

    // Single-file copy across buckets keeps the base name on a directory target.
    let copied = bucket01
        .copy_file("/file01.txt", "provider01://bucket02/", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(copied.as_uri(), Some("provider01://bucket02/file01.txt"));
    let copied = bucket01
        .copy_file("/file01.txt", "provider01://bucket02/file_copy.txt", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(copied.as_uri(), Some("provider01://bucket02/file_copy.txt"));
    assert_eq!(bucket01.file_exists("file01.txt").await.result, Some(true));
    assert!(temp.path().join("provider01/other/bucket02/file_copy.txt").is_file());

    // Move into a new subdirectory.
    bucket01
        .move_file("file02.txt", "subdir 01/file moved.txt", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(bucket01.file_exists("file02.txt").await.result, Some(false));
    assert_eq!(bucket01.file_exists("subdir 01/file moved.txt").await.result, Some(true));

    // Listing counts files only.
    let flat = bucket01.list_files("/", ListOptions::default()).await.into_result().unwrap();
    assert_eq!(flat.len(), 2);
    let all = bucket01.list_files("/", ListOptions::recursive()).await.into_result().unwrap();
    assert_eq!(all.len(), 3);
    let matched = bucket01
        .list_files("/", ListOptions::recursive().with_pattern("/subdir*/**/*.txt"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(matched.uris(), vec!["provider01://bucket01/subdir 01/file moved.txt".to_string()]);

    // Batch copy within a provider.
    let mut copies = bucket01
        .copy_files("/", "provider01://bucket02/multiplecopy/", "**")
        .await
        .into_result()
        .unwrap();
    copies.sort();
    assert_eq!(
        copies,
        vec![
            "provider01://bucket02/multiplecopy/file 03.json".to_string(),
            "provider01://bucket02/multiplecopy/file01.txt".to_string(),
            "provider01://bucket02/multiplecopy/subdir 01/file moved.txt".to_string(),
        ]
    );

    // Batch move across providers takes the streamed route.
    let moved = bucket02
        .move_files("multiplecopy", "provider02://archive/moved/", "**/*.txt")
        .await
        .into_result()
        .unwrap();
    assert_eq!(moved.len(), 2);
    assert_eq!(
        archive.read_file("moved/subdir 01/file moved.txt").await.result.unwrap(),
        b"Test 02"
    );
    assert_eq!(bucket02.file_exists("multiplecopy/file01.txt").await.result, Some(false));

    // Batch delete, then prune what the moves left behind.
    let deleted = bucket02
        .delete_files("/", "**/*.json")
        .await
        .into_result()
        .unwrap();
    assert_eq!(deleted, vec!["provider01://bucket02/multiplecopy/file 03.json".to_string()]);
    assert_eq!(bucket02.remove_empty_directories().await.result, Some(true));
    let native = bucket02.get_native_path("multiplecopy").into_result().unwrap();
    assert_eq!(native, temp.path().join("provider01/other/bucket02/multiplecopy"));
    assert!(!native.exists());
    assert!(temp.path().join("provider01/other/bucket02").is_dir());

    // Cross-provider copy into memory.
    let scratch = registry
        .add_provider("scratch", ProviderConfig::new("memory", ""))
        .await
        .unwrap();
    let cache = scratch
        .add_bucket("cache", BucketConfig::default())
        .await
        .into_result()
        .unwrap();
    bucket01
        .copy_file("file 03.json", "scratch://cache/", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(cache.read_file("file 03.json").await.result.unwrap(), br#"{"n": 3}"#);
    assert!(matches!(cache.get_native_path("file 03.json").error, Some(Error::Resolution(_))));

    // Directory copy into a new destination keeps the source intact.
    let backup = bucket01
        .copy_directory("subdir 01", "scratch://cache/backup/", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(backup.as_uri(), Some("scratch://cache/backup/subdir 01"));
    let backed_up = cache
        .list_files("backup", ListOptions::recursive())
        .await
        .into_result()
        .unwrap();
    assert_eq!(backed_up.len(), 1);
    let source = bucket01
        .list_files("subdir 01", ListOptions::recursive())
        .await
        .into_result()
        .unwrap();
    assert_eq!(source.len(), 1);

    // Deletes are idempotent.
    assert_eq!(bucket01.delete_file("file01.txt").await.result, Some(true));
    assert_eq!(bucket01.delete_file("file01.txt").await.result, Some(true));

    // destroy keeps contents, remove deletes them.
    assert_eq!(bucket02.destroy().await.result, Some(true));
    assert!(matches!(bucket02.destroy().await.error, Some(Error::NotFound(_))));
    assert!(temp.path().join("provider01/other/bucket02/file01.txt").is_file());

    assert_eq!(bucket01.remove().await.result, Some(true));
    assert!(!temp.path().join("provider01/bucket01").exists());
    assert!(matches!(bucket01.remove().await.error, Some(Error::NotFound(_))));

    registry.teardown().await.unwrap();
    assert!(registry.provider_names().is_empty());
}

#[tokio::test]
async fn test_directory_copy_keeps_every_nested_file() {
    let temp = TempDir::new().unwrap();
    let registry = create_default_registry();
    let disk = registry
        .add_provider("disk", ProviderConfig::new("local", temp.path().to_string_lossy()))
        .await
        .unwrap();
    let scratch = registry
        .add_provider("scratch", ProviderConfig::new("memory", ""))
        .await
        .unwrap();
    let docs = disk
        .add_bucket("docs", BucketConfig::default())
        .await
        .into_result()
        .unwrap();
    let mirror = disk
        .add_bucket("mirror", BucketConfig::default())
        .await
        .into_result()
        .unwrap();
    let cache = scratch
        .add_bucket("cache", BucketConfig::default())
        .await
        .into_result()
        .unwrap();

    let tree = ["tree/a.txt", "tree/b.txt", "tree/sub/c.txt", "tree/sub/deep/d.txt"];
    for path in tree {
        docs.put_file(path, path, ReturnOptions::default())
            .await
            .into_result()
            .unwrap();
    }
    let expected: Vec<String> = tree.iter().map(|path| path.replacen("tree/", "", 1)).collect();

    let relative = |uris: Vec<String>, prefix: &str| -> Vec<String> {
        let mut paths: Vec<String> = uris
            .iter()
            .map(|uri| uri.trim_start_matches(prefix).to_string())
            .collect();
        paths.sort();
        paths
    };

    // Same provider: native copies.
    let copied = docs
        .copy_directory("tree", "disk://mirror/copied/", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    assert_eq!(copied.as_uri(), Some("disk://mirror/copied/tree"));
    let listed = mirror
        .list_files("copied/tree", ListOptions::recursive())
        .await
        .into_result()
        .unwrap();
    assert_eq!(relative(listed.uris(), "disk://mirror/copied/tree/"), expected);
    assert!(temp.path().join("mirror/copied/tree/sub/deep/d.txt").is_file());

    // Across providers: streamed copies.
    docs.copy_directory("tree", "scratch://cache/backup/", ReturnOptions::default())
        .await
        .into_result()
        .unwrap();
    let listed = cache
        .list_files("backup/tree", ListOptions::recursive())
        .await
        .into_result()
        .unwrap();
    assert_eq!(relative(listed.uris(), "scratch://cache/backup/tree/"), expected);
    assert_eq!(
        cache.read_file("backup/tree/sub/deep/d.txt").await.result.unwrap(),
        b"tree/sub/deep/d.txt"
    );

    // The source tree is untouched.
    let source = docs
        .list_files("tree", ListOptions::recursive())
        .await
        .into_result()
        .unwrap();
    assert_eq!(relative(source.uris(), "disk://docs/tree/"), expected);
}
