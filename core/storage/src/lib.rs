//! Storage abstraction over heterogeneous backends.
//!
//! Every entry is addressed as `provider://bucket/path`. A
//! [`ProviderRegistry`] maps provider names to configured backends, each
//! provider owns named [`Bucket`]s, and every bucket operation returns a
//! [`StorageResponse`].
//!
//! # Design Principles
//! - Provider isolation: backends only implement [`StorageProvider`]; URI
//!   resolution, planning and pattern expansion live above them
//! - Async operations: all I/O operations are async
//! - Streaming support: content moves between providers as byte streams
//! - Unified error semantics: one error taxonomy across providers

pub mod bucket;
pub mod config;
pub mod content;
pub mod entry;
pub mod local;
pub mod memory;
pub mod pattern;
pub mod planner;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod response;

pub use bucket::{Bucket, FileList, ListOptions, ReturnOptions};
pub use config::{AccessMode, BucketConfig, ConnectionString, ProviderConfig};
pub use content::Content;
pub use entry::{StorageDirectory, StorageFile};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use pattern::{Matchable, Pattern};
pub use planner::{plan_route, Route, TransferMode};
pub use provider::{bytes_stream, collect_stream, ByteStream, Metadata, StorageProvider};
pub use registry::{create_default_registry, Provider, ProviderFactory, ProviderRegistry};
pub use resolver::{resolve, resolve_destination, resolve_relative, Location};
pub use response::{Returned, StorageResponse};

pub use filestore_common::{Error, NormalizedPath, Result, StorageUri};
