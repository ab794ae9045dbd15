//! Resolution of strings and entity references to storage URIs.

use std::borrow::Cow;

use filestore_common::{Error, NormalizedPath, Result, StorageUri};

use crate::bucket::Bucket;
use crate::entry::{StorageDirectory, StorageFile};

/// Anything an operation can be addressed with.
#[derive(Debug, Clone)]
pub enum Location<'a> {
    /// `provider://bucket/path`, or a path relative to a context bucket.
    Text(Cow<'a, str>),
    /// Already resolved URI.
    Uri(StorageUri),
    /// Reference to an existing file.
    File(StorageUri),
    /// Reference to a directory.
    Directory(StorageUri),
}

impl Location<'_> {
    /// Whether the location names a directory rather than a file:
    /// a trailing separator, a bucket root, or a directory reference.
    pub fn is_directory_hint(&self) -> bool {
        match self {
            Location::Text(text) => {
                text.ends_with('/')
                    || text.is_empty()
                    || StorageUri::split_scheme(text)
                        .is_some_and(|(_, rest)| !rest.trim_end_matches('/').contains('/'))
            }
            Location::Directory(_) => true,
            Location::Uri(uri) => uri.path.is_root(),
            Location::File(_) => false,
        }
    }
}

impl<'a> From<&'a str> for Location<'a> {
    fn from(text: &'a str) -> Self {
        Location::Text(Cow::Borrowed(text))
    }
}

impl<'a> From<&'a String> for Location<'a> {
    fn from(text: &'a String) -> Self {
        Location::Text(Cow::Borrowed(text.as_str()))
    }
}

impl From<String> for Location<'static> {
    fn from(text: String) -> Self {
        Location::Text(Cow::Owned(text))
    }
}

impl From<StorageUri> for Location<'static> {
    fn from(uri: StorageUri) -> Self {
        Location::Uri(uri)
    }
}

impl From<&StorageUri> for Location<'static> {
    fn from(uri: &StorageUri) -> Self {
        Location::Uri(uri.clone())
    }
}

impl From<&StorageFile> for Location<'static> {
    fn from(file: &StorageFile) -> Self {
        Location::File(file.uri())
    }
}

impl From<&StorageDirectory> for Location<'static> {
    fn from(dir: &StorageDirectory) -> Self {
        Location::Directory(dir.uri())
    }
}

/// Resolve a location to a storage URI.
///
/// Text with a scheme selects the provider by name; text without one is
/// resolved against `context`, which is then required. Already resolved
/// URIs and entity references pass through unchanged.
///
/// # Errors
/// - `Resolution` when a relative path has no context bucket
/// - `InvalidPath` when the path escapes the bucket root
pub fn resolve(location: &Location<'_>, context: Option<&Bucket>) -> Result<StorageUri> {
    match location {
        Location::Uri(uri) | Location::File(uri) | Location::Directory(uri) => Ok(uri.clone()),
        Location::Text(text) => {
            if StorageUri::has_scheme(text) {
                return StorageUri::parse(text);
            }
            let bucket = context.ok_or_else(|| {
                Error::Resolution(format!(
                    "'{}' is relative but no bucket was given to resolve it against",
                    text
                ))
            })?;
            Ok(bucket.uri(NormalizedPath::parse(text)?))
        }
    }
}

/// Resolve a copy/move destination.
///
/// When the location names a directory, or normalizes to the bucket root,
/// the source's file name is kept and appended to it.
pub fn resolve_destination(
    location: &Location<'_>,
    context: Option<&Bucket>,
    source_name: Option<&str>,
) -> Result<StorageUri> {
    let mut uri = resolve(location, context)?;
    if location.is_directory_hint() || uri.path.is_root() {
        if let Some(name) = source_name {
            uri.path = uri.path.child(name)?;
        }
    }
    Ok(uri)
}

/// Resolve a location relative to a directory.
///
/// Plain text is joined with the directory's path; anything else resolves
/// as usual.
pub fn resolve_relative(location: &Location<'_>, base: &StorageUri) -> Result<StorageUri> {
    match location {
        Location::Text(text) if !StorageUri::has_scheme(text) => Ok(StorageUri::new(
            base.provider.clone(),
            base.bucket.clone(),
            base.path.join(text)?,
        )),
        other => resolve(other, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> StorageUri {
        StorageUri::parse(s).unwrap()
    }

    #[test]
    fn test_scheme_selects_provider() {
        let resolved = resolve(&"provider01://bucket02/a/./b.txt".into(), None).unwrap();
        assert_eq!(resolved, uri("provider01://bucket02/a/b.txt"));
    }

    #[test]
    fn test_relative_without_context_fails() {
        let err = resolve(&"file01.txt".into(), None).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let first = resolve(&"p://b/x/y".into(), None).unwrap();
        let second = resolve(&Location::from(&first), None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_escape_rejected() {
        let err = resolve(&"p://b/../../etc".into(), None).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn test_directory_hints() {
        assert!(Location::from("p://b").is_directory_hint());
        assert!(Location::from("p://b/").is_directory_hint());
        assert!(Location::from("some/dir/").is_directory_hint());
        assert!(!Location::from("p://b/file.txt").is_directory_hint());
        assert!(!Location::from("file.txt").is_directory_hint());
        assert!(Location::Directory(uri("p://b/d")).is_directory_hint());
    }

    #[test]
    fn test_destination_keeps_source_name() {
        let dest = resolve_destination(&"p://b2/".into(), None, Some("file01.txt")).unwrap();
        assert_eq!(dest.to_string(), "p://b2/file01.txt");

        let dest = resolve_destination(&"p://b2/new.txt".into(), None, Some("file01.txt")).unwrap();
        assert_eq!(dest.to_string(), "p://b2/new.txt");

        let dest = resolve_destination(&"p://b2/sub/..".into(), None, Some("file01.txt")).unwrap();
        assert_eq!(dest.to_string(), "p://b2/file01.txt");

        let dest = resolve_destination(&"p://b2/./".into(), None, Some("file01.txt")).unwrap();
        assert_eq!(dest.to_string(), "p://b2/file01.txt");
    }

    #[test]
    fn test_relative_to_directory() {
        let base = uri("p://b/docs");
        let nested = resolve_relative(&"sub/inner".into(), &base).unwrap();
        assert_eq!(nested.to_string(), "p://b/docs/sub/inner");

        let absolute = resolve_relative(&"q://c/elsewhere".into(), &base).unwrap();
        assert_eq!(absolute.to_string(), "q://c/elsewhere");

        assert!(resolve_relative(&"../../up".into(), &base).is_err());
    }
}
