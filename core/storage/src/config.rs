//! Provider and bucket configuration.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use filestore_common::{Error, Result, StorageUri};

/// Unix-style octal access mode applied to a provider or bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessMode(pub u32);

impl AccessMode {
    /// Full read/write access.
    pub const DEFAULT: Self = Self(0o777);

    /// Parse an octal string like `"0777"` or `"755"`.
    pub fn parse(mode: &str) -> Result<Self> {
        let digits = mode.trim().trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|bits| *bits <= 0o7777)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput(format!("'{}' is not an octal access mode", mode)))
    }

    /// Any read bit set.
    pub fn can_read(&self) -> bool {
        self.0 & 0o444 != 0
    }

    /// Any write bit set.
    pub fn can_write(&self) -> bool {
        self.0 & 0o222 != 0
    }
}

impl Default for AccessMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl<'de> Deserialize<'de> for AccessMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(bits) => Ok(Self(bits)),
            Raw::Text(text) => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Configuration for one provider instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type tag selecting the factory (e.g. "local", "memory").
    #[serde(rename = "type", default)]
    pub provider_type: Option<String>,
    /// Connection string `scheme://root?name=alias&mode=0777`.
    #[serde(default)]
    pub uri: Option<String>,
    /// Backend root (directory for local providers).
    #[serde(default)]
    pub root: Option<String>,
    /// Access mode for buckets that do not override it.
    #[serde(default)]
    pub mode: Option<AccessMode>,
    /// Base URL for public links.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Backend-specific extras.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ProviderConfig {
    /// Config for a provider type rooted at `root`.
    pub fn new(provider_type: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            provider_type: Some(provider_type.into()),
            root: Some(root.into()),
            ..Default::default()
        }
    }

    /// Set the access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the public URL base.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Build a config from a connection string.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// Fill explicit fields from the connection string, if any.
    ///
    /// Explicit fields win over values carried by the URI. Returns the
    /// `name` alias from the query string.
    pub fn resolve(&mut self) -> Result<Option<String>> {
        let Some(uri) = self.uri.clone() else {
            return Ok(None);
        };
        let conn = ConnectionString::parse(&uri)?;

        if self.provider_type.is_none() {
            self.provider_type = Some(conn.scheme);
        }
        if self.root.is_none() {
            self.root = Some(conn.root);
        }
        if self.mode.is_none() {
            if let Some(mode) = conn.params.get("mode") {
                self.mode = Some(AccessMode::parse(mode)?);
            }
        }
        if self.public_url.is_none() {
            self.public_url = conn.params.get("public_url").cloned();
        }
        Ok(conn.params.get("name").cloned())
    }

    /// Access mode, defaulting to full access.
    pub fn access_mode(&self) -> AccessMode {
        self.mode.unwrap_or_default()
    }
}

/// Parsed `scheme://root-path?key=value` provider connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Provider type.
    pub scheme: String,
    /// Percent-decoded root.
    pub root: String,
    /// Query parameters.
    pub params: HashMap<String, String>,
}

impl ConnectionString {
    /// Parse a connection string.
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = StorageUri::split_scheme(input).ok_or_else(|| {
            Error::InvalidInput(format!("'{}' is not a provider connection string", input))
        })?;
        let (root, query) = match rest.split_once('?') {
            Some((root, query)) => (root, query),
            None => (rest, ""),
        };
        let root = percent_encoding::percent_decode_str(root)
            .decode_utf8()
            .map_err(|e| Error::InvalidInput(format!("Invalid root in '{}': {}", input, e)))?
            .into_owned();
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        Ok(Self {
            scheme: scheme.to_string(),
            root,
            params,
        })
    }
}

/// Configuration for a bucket within a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Sub-path under the provider root. Defaults to the bucket name.
    #[serde(default)]
    pub root: Option<String>,
    /// Overrides the provider's access mode.
    #[serde(default)]
    pub mode: Option<AccessMode>,
}

impl BucketConfig {
    /// Bucket rooted at `root` below the provider root.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: Some(root.into()),
            mode: None,
        }
    }

    /// Set the access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::parse("0777").unwrap().can_write());
        let read_only = AccessMode::parse("0444").unwrap();
        assert!(read_only.can_read());
        assert!(!read_only.can_write());
        assert!(!AccessMode(0o200).can_read());
        assert!(AccessMode::parse("rw").is_err());
        assert!(AccessMode::parse("9").is_err());
    }

    #[test]
    fn test_connection_string() {
        let conn =
            ConnectionString::parse("fs://./private/provider%2002?name=provider02&mode=0777").unwrap();
        assert_eq!(conn.scheme, "fs");
        assert_eq!(conn.root, "./private/provider 02");
        assert_eq!(conn.params.get("name").map(String::as_str), Some("provider02"));
        assert_eq!(conn.params.get("mode").map(String::as_str), Some("0777"));
    }

    #[test]
    fn test_resolve_prefers_explicit_fields() {
        let mut config = ProviderConfig::from_uri("local:///srv/data?mode=0444&name=alias");
        config.root = Some("/override".to_string());

        let alias = config.resolve().unwrap();
        assert_eq!(alias.as_deref(), Some("alias"));
        assert_eq!(config.provider_type.as_deref(), Some("local"));
        assert_eq!(config.root.as_deref(), Some("/override"));
        assert!(!config.access_mode().can_write());
    }

    #[test]
    fn test_deserialize_config() {
        let json = r#"{ "type": "local", "root": "/tmp/x", "mode": "0755", "public_url": "https://cdn.example" }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.provider_type.as_deref(), Some("local"));
        assert_eq!(config.access_mode(), AccessMode(0o755));

        let config: ProviderConfig = serde_json::from_str(r#"{ "type": "memory", "mode": 420 }"#).unwrap();
        assert_eq!(config.access_mode(), AccessMode(0o644));
    }
}
