//! Provider registry: provider types (factories) and live provider instances.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info};

use filestore_common::{Error, NormalizedPath, Result, StorageUri};

use crate::bucket::{Bucket, BucketContext};
use crate::config::{AccessMode, BucketConfig, ProviderConfig};
use crate::provider::StorageProvider;
use crate::response::StorageResponse;

/// Factory function type for creating providers from configuration.
///
/// Shared so that re-registering the very same factory can be detected.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Registered state of one bucket.
#[derive(Debug, Clone)]
pub(crate) struct BucketState {
    pub root: NormalizedPath,
    pub mode: AccessMode,
}

/// A configured, initialized provider and the buckets it owns.
pub struct Provider {
    name: String,
    config: ProviderConfig,
    backend: Arc<dyn StorageProvider>,
    buckets: RwLock<HashMap<String, BucketState>>,
    registry: Weak<RegistryInner>,
}

impl Provider {
    /// Registered name (the URI scheme for this provider).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Backend implementing the capability interface.
    pub fn backend(&self) -> &Arc<dyn StorageProvider> {
        &self.backend
    }

    /// Add a bucket rooted below the provider root.
    ///
    /// The bucket root directory is created if missing.
    ///
    /// # Errors
    /// - `AlreadyExists` if the bucket name is taken
    /// - `InvalidPath` if the root escapes the provider root
    pub async fn add_bucket(
        &self,
        name: impl Into<String>,
        config: BucketConfig,
    ) -> StorageResponse<Bucket> {
        self.add_bucket_inner(name.into(), config).await.into()
    }

    async fn add_bucket_inner(&self, name: String, config: BucketConfig) -> Result<Bucket> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidInput(format!("Invalid bucket name '{}'", name)));
        }
        if read_lock(&self.buckets).contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Bucket '{}' already exists in provider '{}'",
                name, self.name
            )));
        }

        let root = NormalizedPath::parse(config.root.as_deref().unwrap_or(&name))?;
        self.backend.mkdir(&root).await?;

        let state = BucketState {
            root,
            mode: config.mode.unwrap_or_else(|| self.config.access_mode()),
        };
        {
            let mut buckets = write_lock(&self.buckets);
            if buckets.contains_key(&name) {
                return Err(Error::AlreadyExists(format!(
                    "Bucket '{}' already exists in provider '{}'",
                    name, self.name
                )));
            }
            buckets.insert(name.clone(), state);
        }

        info!(provider = %self.name, bucket = %name, "Bucket added");
        self.get_bucket(&name)
    }

    /// Get a handle to a registered bucket.
    pub fn get_bucket(&self, name: &str) -> Result<Bucket> {
        self.bucket_state(name)?;
        let registry = self.registry.upgrade().ok_or_else(|| {
            Error::NotFound(format!("Provider '{}' is no longer registered", self.name))
        })?;
        Ok(Bucket::new(
            ProviderRegistry { inner: registry },
            self.name.clone(),
            name.to_string(),
        ))
    }

    /// Names of all buckets.
    pub fn bucket_names(&self) -> Vec<String> {
        read_lock(&self.buckets).keys().cloned().collect()
    }

    /// Unregister a bucket without touching its contents.
    pub fn remove_bucket(&self, name: &str) -> Result<()> {
        write_lock(&self.buckets)
            .remove(name)
            .map(|_| info!(provider = %self.name, bucket = %name, "Bucket removed"))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Bucket '{}' not found in provider '{}'",
                    name, self.name
                ))
            })
    }

    pub(crate) fn bucket_state(&self, name: &str) -> Result<BucketState> {
        read_lock(&self.buckets).get(name).cloned().ok_or_else(|| {
            Error::NotFound(format!(
                "Bucket '{}' not found in provider '{}'",
                name, self.name
            ))
        })
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("type", &self.backend.name())
            .field("buckets", &self.bucket_names())
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    factories: RwLock<HashMap<String, ProviderFactory>>,
    providers: RwLock<HashMap<String, Arc<Provider>>>,
}

/// Registry for provider types and provider instances.
///
/// Cheap to clone; clones share state. Construct one per application (or
/// per test) instead of relying on global state.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    inner: Arc<RegistryInner>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider type.
    ///
    /// Registering the identical factory again is a no-op.
    ///
    /// # Errors
    /// - `DuplicateType` if `name` is bound to a different factory
    pub fn register_provider_type(
        &self,
        name: impl Into<String>,
        factory: ProviderFactory,
    ) -> Result<()> {
        let name = name.into();
        let mut factories = write_lock(&self.inner.factories);
        if let Some(existing) = factories.get(&name) {
            if Arc::ptr_eq(existing, &factory) {
                return Ok(());
            }
            return Err(Error::DuplicateType(format!(
                "Provider type '{}' is already registered",
                name
            )));
        }
        debug!(provider_type = %name, "Provider type registered");
        factories.insert(name, factory);
        Ok(())
    }

    /// Check if a provider type is registered.
    pub fn has_provider_type(&self, name: &str) -> bool {
        read_lock(&self.inner.factories).contains_key(name)
    }

    /// Instantiate, initialize and register a provider.
    ///
    /// The type comes from `config.type`, or from the scheme of
    /// `config.uri`.
    ///
    /// # Errors
    /// - `DuplicateProvider` if `name` is in use
    /// - `UnknownProviderType` if the type has no factory
    pub async fn add_provider(
        &self,
        name: impl Into<String>,
        mut config: ProviderConfig,
    ) -> Result<Arc<Provider>> {
        let name = name.into();
        config.resolve()?;
        self.insert_provider(name, config).await
    }

    /// Register a self-configuring provider from a connection string
    /// `scheme://root?name=alias&mode=0777`.
    pub async fn add_provider_from_uri(&self, uri: &str) -> Result<Arc<Provider>> {
        let mut config = ProviderConfig::from_uri(uri);
        let name = config.resolve()?.ok_or_else(|| {
            Error::InvalidInput(format!("Connection string '{}' has no 'name' parameter", uri))
        })?;
        self.insert_provider(name, config).await
    }

    async fn insert_provider(&self, name: String, config: ProviderConfig) -> Result<Arc<Provider>> {
        if read_lock(&self.inner.providers).contains_key(&name) {
            return Err(Error::DuplicateProvider(format!(
                "Provider '{}' is already registered",
                name
            )));
        }

        let provider_type = config.provider_type.clone().ok_or_else(|| {
            Error::InvalidInput(format!("Provider '{}' has no type", name))
        })?;
        let factory = read_lock(&self.inner.factories)
            .get(&provider_type)
            .cloned()
            .ok_or_else(|| Error::UnknownProviderType(provider_type.clone()))?;

        let backend = factory(&config)?;
        backend.init().await?;

        let provider = Arc::new(Provider {
            name: name.clone(),
            config,
            backend,
            buckets: RwLock::new(HashMap::new()),
            registry: Arc::downgrade(&self.inner),
        });

        {
            let mut providers = write_lock(&self.inner.providers);
            if providers.contains_key(&name) {
                return Err(Error::DuplicateProvider(format!(
                    "Provider '{}' is already registered",
                    name
                )));
            }
            providers.insert(name.clone(), provider.clone());
        }

        info!(provider = %name, provider_type = %provider_type, "Provider added");
        Ok(provider)
    }

    /// Get a provider by name.
    ///
    /// # Errors
    /// - `NotFound` if absent
    pub fn get_provider(&self, name: &str) -> Result<Arc<Provider>> {
        read_lock(&self.inner.providers)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))
    }

    /// Names of all registered providers.
    pub fn provider_names(&self) -> Vec<String> {
        read_lock(&self.inner.providers).keys().cloned().collect()
    }

    /// Unregister a provider and destroy its backend. Stored content is
    /// left untouched.
    pub async fn remove_provider(&self, name: &str) -> Result<()> {
        let provider = write_lock(&self.inner.providers)
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))?;
        provider.backend.destroy().await?;
        info!(provider = %name, "Provider destroyed");
        Ok(())
    }

    /// Handle to `provider://bucket`.
    pub fn bucket(&self, provider: &str, bucket: &str) -> Result<Bucket> {
        self.get_provider(provider)?.get_bucket(bucket)
    }

    /// Handle to the bucket addressed by a URI.
    pub fn bucket_for(&self, uri: &StorageUri) -> Result<Bucket> {
        self.bucket(&uri.provider, &uri.bucket)
    }

    pub(crate) fn context(&self, provider: &str, bucket: &str) -> Result<BucketContext> {
        let provider = self.get_provider(provider)?;
        let state = provider.bucket_state(bucket)?;
        Ok(BucketContext::new(provider, bucket.to_string(), state))
    }

    pub(crate) fn context_for(&self, uri: &StorageUri) -> Result<BucketContext> {
        self.context(&uri.provider, &uri.bucket)
    }

    /// Drop every provider and provider type.
    pub fn reset(&self) {
        write_lock(&self.inner.providers).clear();
        write_lock(&self.inner.factories).clear();
    }

    /// Destroy every provider backend, then reset.
    pub async fn teardown(&self) -> Result<()> {
        let providers: Vec<Arc<Provider>> =
            write_lock(&self.inner.providers).drain().map(|(_, p)| p).collect();
        for provider in providers {
            provider.backend.destroy().await?;
        }
        self.reset();
        Ok(())
    }
}

/// Factory for [`crate::LocalProvider`]; requires `root`.
pub fn local_factory() -> ProviderFactory {
    Arc::new(|config: &ProviderConfig| {
        let root = config
            .root
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("Local provider requires 'root' path".to_string()))?;
        Ok(Arc::new(crate::local::LocalProvider::new(root)) as Arc<dyn StorageProvider>)
    })
}

/// Factory for [`crate::MemoryProvider`].
pub fn memory_factory() -> ProviderFactory {
    Arc::new(|_config: &ProviderConfig| {
        Ok(Arc::new(crate::memory::MemoryProvider::new()) as Arc<dyn StorageProvider>)
    })
}

/// Create a registry with the built-in provider types: `local` (alias `fs`)
/// and `memory`.
pub fn create_default_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    let local = local_factory();
    let builtins = [
        ("local", local.clone()),
        ("fs", local),
        ("memory", memory_factory()),
    ];
    for (name, factory) in builtins {
        // Fresh registry: names cannot collide.
        let _ = registry.register_provider_type(name, factory);
    }
    registry
}
