//! Common error types for Filestore.

use thiserror::Error;

/// Boxed native backend failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Path ascends above the bucket root or is otherwise malformed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Reference is ambiguous or cannot be resolved.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Provider, bucket or entry missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A provider instance with this name is already registered.
    #[error("Duplicate provider: {0}")]
    DuplicateProvider(String),

    /// A provider type with this name is already registered.
    #[error("Duplicate provider type: {0}")]
    DuplicateType(String),

    /// No factory registered for this provider type.
    #[error("Unknown provider type: {0}")]
    UnknownProviderType(String),

    /// Access-mode violation.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided (configuration, pattern).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Native backend failure, kept verbatim.
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),
}

impl Error {
    /// Wrap a backend failure described only by a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend(message.into().into())
    }

    /// Whether this error means the target does not exist.
    ///
    /// Also true for a wrapped `std::io::Error` of kind `NotFound`, so
    /// callers can treat missing paths uniformly across backends.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Backend(source) => source
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Backend(Box::new(err))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_is_not_found() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Backend(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_backend_keeps_native_message() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire").into();
        assert_eq!(err.to_string(), "Backend error: disk on fire");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_permission_is_not_not_found() {
        assert!(!Error::Permission("read-only".into()).is_not_found());
        assert!(Error::NotFound("x".into()).is_not_found());
    }
}
