//! Common types shared across Filestore crates.
//!
//! Provides the error taxonomy and the path/URI types every storage
//! component speaks.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::{NormalizedPath, StorageUri, SCHEME_SEPARATOR};
