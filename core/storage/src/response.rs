//! Uniform result envelope returned by every bucket operation.

use filestore_common::{Error, Result};

/// Outcome of a public storage operation.
///
/// Single-entity operations populate exactly one of `result` and `error`.
/// Batch operations return the list of entries that succeeded; a list
/// shorter than the set of matched inputs signals partial success.
#[derive(Debug)]
#[must_use]
pub struct StorageResponse<T> {
    /// Operation payload on success.
    pub result: Option<T>,
    /// Failure, including the native backend error when there is one.
    pub error: Option<Error>,
}

impl<T> StorageResponse<T> {
    /// Successful response.
    pub fn ok(result: T) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    /// Failed response.
    pub fn err(error: Error) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Borrow the payload.
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// Borrow the error.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Convert back into a `Result` for `?` propagation.
    pub fn into_result(self) -> Result<T> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::Resolution("Operation returned no result".to_string())),
        }
    }

    /// Transform the payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StorageResponse<U> {
        StorageResponse {
            result: self.result.map(f),
            error: self.error,
        }
    }
}

impl<T> From<Result<T>> for StorageResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::err(error),
        }
    }
}

/// Payload of operations that honour a `returning` option: the storage URI
/// by default, the resolved entity when requested.
#[derive(Debug, Clone)]
pub enum Returned<T> {
    /// Storage URI string (`provider://bucket/path`).
    Uri(String),
    /// Resolved entity.
    Entity(T),
}

impl<T> Returned<T> {
    /// The URI, when no entity was requested.
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Returned::Uri(uri) => Some(uri),
            Returned::Entity(_) => None,
        }
    }

    /// The entity, when one was requested.
    pub fn into_entity(self) -> Option<T> {
        match self {
            Returned::Entity(entity) => Some(entity),
            Returned::Uri(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_and_err_are_exclusive() {
        let ok: StorageResponse<u32> = Ok(7).into();
        assert!(ok.is_ok());
        assert_eq!(ok.result(), Some(&7));
        assert!(ok.error().is_none());

        let err: StorageResponse<u32> = Err(Error::NotFound("x".into())).into();
        assert!(!err.is_ok());
        assert!(err.result().is_none());
        assert!(matches!(err.into_result(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_map_keeps_error() {
        let err: StorageResponse<u32> = StorageResponse::err(Error::Permission("ro".into()));
        let mapped = err.map(|v| v * 2);
        assert!(matches!(mapped.error, Some(Error::Permission(_))));
        assert_eq!(StorageResponse::ok(2).map(|v| v * 2).into_result().unwrap(), 4);
    }

    #[test]
    fn test_returned_accessors() {
        let uri: Returned<u8> = Returned::Uri("p://b/x".into());
        assert_eq!(uri.as_uri(), Some("p://b/x"));
        assert!(uri.into_entity().is_none());
        assert_eq!(Returned::Entity(3u8).into_entity(), Some(3));
    }
}
