//! Path and URI types shared by every storage component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Separator between the provider scheme and the bucket name.
pub const SCHEME_SEPARATOR: &str = "://";

/// A bucket-relative path, independent of the underlying backend.
///
/// Always normalized: no empty, `.` or `..` segments. The root is the empty
/// sequence. Equality is segment-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedPath {
    segments: Vec<String>,
}

impl NormalizedPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Create a path from already split segments.
    ///
    /// # Errors
    /// - Returns error if any segment is empty, `.`, `..` or contains `/`
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        for seg in &segments {
            if seg.is_empty() || seg == "." || seg == ".." {
                return Err(Error::InvalidPath(format!(
                    "'{}' is not a valid path segment",
                    seg
                )));
            }
            if seg.contains('/') {
                return Err(Error::InvalidPath(
                    "Path segment cannot contain separators".to_string(),
                ));
            }
        }
        Ok(Self { segments })
    }

    /// Parse a `/`-separated path.
    ///
    /// Leading, trailing and repeated separators are dropped, `.` segments
    /// collapse, and `..` removes the previous segment.
    ///
    /// # Errors
    /// - `InvalidPath` if a `..` would ascend past the root
    pub fn parse(path: &str) -> Result<Self> {
        Self::root().join(path)
    }

    /// Resolve `relative` against this path.
    ///
    /// A leading separator in `relative` is not special: the result is
    /// always below `self` unless `..` segments walk back up.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        for part in relative.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(Error::InvalidPath(format!(
                            "'{}' escapes the bucket root",
                            relative
                        )));
                    }
                }
                seg => segments.push(seg.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Append a single segment.
    pub fn child(&self, name: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self::from_segments(segments)
    }

    /// Concatenate another normalized path below this one.
    pub fn concat(&self, other: &NormalizedPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self { segments })
        }
    }

    /// Get the file/directory name (last segment).
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Get the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether `base` is this path or one of its ancestors.
    pub fn starts_with(&self, base: &NormalizedPath) -> bool {
        self.segments.starts_with(&base.segments)
    }

    /// The remainder of this path below `base`.
    pub fn strip_prefix(&self, base: &NormalizedPath) -> Option<Self> {
        if self.starts_with(base) {
            Some(Self {
                segments: self.segments[base.segments.len()..].to_vec(),
            })
        } else {
            None
        }
    }

    /// Segments joined with `/`, no leading separator. Root is `""`.
    pub fn as_relative(&self) -> String {
        self.segments.join("/")
    }

    /// Absolute form with a leading separator. Root is `"/"`.
    pub fn to_string_path(&self) -> String {
        format!("/{}", self.as_relative())
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// A fully resolved storage address: `provider://bucket/path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageUri {
    /// Registered provider name (the URI scheme).
    pub provider: String,
    /// Bucket name within the provider.
    pub bucket: String,
    /// Bucket-relative path.
    pub path: NormalizedPath,
}

impl StorageUri {
    /// Build a URI from its parts.
    pub fn new(
        provider: impl Into<String>,
        bucket: impl Into<String>,
        path: NormalizedPath,
    ) -> Self {
        Self {
            provider: provider.into(),
            bucket: bucket.into(),
            path,
        }
    }

    /// Split a `scheme://rest` string, if it has a well-formed scheme.
    pub fn split_scheme(input: &str) -> Option<(&str, &str)> {
        let idx = input.find(SCHEME_SEPARATOR)?;
        let scheme = &input[..idx];
        let valid = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'));
        valid.then(|| (scheme, &input[idx + SCHEME_SEPARATOR.len()..]))
    }

    /// Whether `input` carries a provider scheme.
    pub fn has_scheme(input: &str) -> bool {
        Self::split_scheme(input).is_some()
    }

    /// Parse `provider://bucket/path`.
    ///
    /// # Errors
    /// - `Resolution` when the scheme or bucket is missing
    /// - `InvalidPath` when the path escapes the bucket root
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = Self::split_scheme(input).ok_or_else(|| {
            Error::Resolution(format!("'{}' is not a storage URI", input))
        })?;
        let (bucket, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(Error::Resolution(format!(
                "'{}' does not name a bucket",
                input
            )));
        }
        Ok(Self::new(scheme, bucket, NormalizedPath::parse(path)?))
    }

    /// Same provider and bucket as `other`.
    pub fn same_bucket(&self, other: &StorageUri) -> bool {
        self.provider == other.provider && self.bucket == other.bucket
    }
}

impl FromStr for StorageUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}/{}",
            self.provider,
            SCHEME_SEPARATOR,
            self.bucket,
            self.path.as_relative()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_path_root() {
        let path = NormalizedPath::parse("/").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "/");
        assert_eq!(NormalizedPath::parse("").unwrap(), NormalizedPath::root());
    }

    #[test]
    fn test_path_normalization() {
        let path = NormalizedPath::parse("//foo/./bar//baz/../qux/").unwrap();
        assert_eq!(path.segments(), &["foo", "bar", "qux"]);
        assert_eq!(path.to_string_path(), "/foo/bar/qux");
    }

    #[test]
    fn test_path_escape_rejected() {
        assert!(matches!(
            NormalizedPath::parse("../etc/passwd"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            NormalizedPath::parse("a/../../b"),
            Err(Error::InvalidPath(_))
        ));
        assert!(NormalizedPath::parse("a/../b").is_ok());
    }

    #[test]
    fn test_path_join_relative_to_directory() {
        let dir = NormalizedPath::parse("/docs/2024").unwrap();
        assert_eq!(dir.join("../2025/a.txt").unwrap().to_string_path(), "/docs/2025/a.txt");
        assert_eq!(dir.join("/nested").unwrap().to_string_path(), "/docs/2024/nested");
        assert!(dir.join("../../..").is_err());
    }

    #[test]
    fn test_path_strip_prefix() {
        let base = NormalizedPath::parse("a/b").unwrap();
        let full = NormalizedPath::parse("a/b/c/d.txt").unwrap();
        assert_eq!(full.strip_prefix(&base).unwrap().as_relative(), "c/d.txt");
        assert!(base.strip_prefix(&full).is_none());
        assert!(full.starts_with(&NormalizedPath::root()));
    }

    #[test]
    fn test_path_parent_and_name() {
        let path = NormalizedPath::parse("/foo/bar").unwrap();
        assert_eq!(path.name(), Some("bar"));
        assert_eq!(path.parent().unwrap().to_string_path(), "/foo");
        assert!(NormalizedPath::root().parent().is_none());
    }

    #[test]
    fn test_uri_parse_and_display() {
        let uri = StorageUri::parse("provider01://bucket01/sub dir/file01.txt").unwrap();
        assert_eq!(uri.provider, "provider01");
        assert_eq!(uri.bucket, "bucket01");
        assert_eq!(uri.path.as_relative(), "sub dir/file01.txt");
        assert_eq!(uri.to_string(), "provider01://bucket01/sub dir/file01.txt");
    }

    #[test]
    fn test_uri_bucket_root() {
        let uri = StorageUri::parse("p://b").unwrap();
        assert!(uri.path.is_root());
        assert_eq!(uri.to_string(), "p://b/");
    }

    #[test]
    fn test_uri_requires_scheme_and_bucket() {
        assert!(matches!(StorageUri::parse("file.txt"), Err(Error::Resolution(_))));
        assert!(matches!(StorageUri::parse("p:///x"), Err(Error::Resolution(_))));
        assert!(matches!(StorageUri::parse("://b/x"), Err(Error::Resolution(_))));
        assert!(matches!(StorageUri::parse("p://b/../x"), Err(Error::InvalidPath(_))));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_ -]{1,8}".prop_filter("no dot segments", |s| s != "." && s != "..")
    }

    proptest! {
        #[test]
        fn prop_round_trip(segs in proptest::collection::vec(segment(), 0..6), leading in any::<bool>(), trailing in any::<bool>()) {
            let body = segs.join("/");
            let input = format!(
                "{}{}{}",
                if leading { "/" } else { "" },
                body,
                if trailing && !body.is_empty() { "/" } else { "" }
            );
            let parsed = NormalizedPath::parse(&input).unwrap();
            prop_assert_eq!(parsed.as_relative(), body);
        }

        #[test]
        fn prop_escape_fails(segs in proptest::collection::vec(segment(), 0..4), extra in 1usize..3) {
            let mut parts: Vec<String> = segs.clone();
            for _ in 0..segs.len() + extra {
                parts.push("..".to_string());
            }
            let result = NormalizedPath::parse(&parts.join("/"));
            prop_assert!(matches!(result, Err(Error::InvalidPath(_))));
        }
    }
}
