//! Filestore CLI - Command line interface for storage operations.
//!
//! Providers and buckets come from a JSON configuration file; every entry
//! is addressed as `provider://bucket/path`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use filestore_storage::{
    create_default_registry, Bucket, BucketConfig, ListOptions, ProviderConfig, ProviderRegistry,
    Returned, ReturnOptions, StorageUri,
};

#[derive(Parser)]
#[command(name = "filestore")]
#[command(about = "Filestore - One file API over many storage backends")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Provider configuration file (default: <config dir>/filestore/storage.json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers and their buckets.
    Providers,

    /// List files in a directory.
    Ls {
        /// Directory URI (provider://bucket/dir).
        uri: String,

        /// Traverse subdirectories.
        #[arg(short, long)]
        recursive: bool,

        /// Glob filter relative to the directory, e.g. "**/*.txt".
        #[arg(short, long)]
        pattern: Option<String>,

        /// Show size and modification time.
        #[arg(short, long)]
        long: bool,
    },

    /// Upload a local file.
    Put {
        /// Local source file.
        source: PathBuf,

        /// Destination URI.
        dest: String,
    },

    /// Print a file to stdout.
    Cat {
        /// File URI.
        uri: String,
    },

    /// Download a file to a local path.
    Get {
        /// File URI.
        uri: String,

        /// Local destination file.
        dest: PathBuf,
    },

    /// Copy a file, a directory tree, or every file matching a pattern.
    Cp {
        /// Source URI.
        src: String,

        /// Destination URI. A trailing '/' keeps the source name.
        dest: String,

        /// Copy a whole directory tree.
        #[arg(short, long)]
        recursive: bool,

        /// Copy files below SRC matching this glob.
        #[arg(short, long, conflicts_with = "recursive")]
        pattern: Option<String>,
    },

    /// Move a file, a directory tree, or every file matching a pattern.
    Mv {
        /// Source URI.
        src: String,

        /// Destination URI. A trailing '/' keeps the source name.
        dest: String,

        /// Move a whole directory tree.
        #[arg(short, long)]
        recursive: bool,

        /// Move files below SRC matching this glob.
        #[arg(short, long, conflicts_with = "recursive")]
        pattern: Option<String>,
    },

    /// Delete a file, a directory tree, or every file matching a pattern.
    Rm {
        /// URI to delete.
        uri: String,

        /// Delete a whole directory tree.
        #[arg(short, long)]
        recursive: bool,

        /// Delete files below URI matching this glob.
        #[arg(short, long, conflicts_with = "recursive")]
        pattern: Option<String>,
    },

    /// Create a directory and any missing parents.
    Mkdir {
        /// Directory URI.
        uri: String,
    },

    /// Remove every directory in a bucket that contains no files.
    Prune {
        /// Bucket URI (provider://bucket).
        bucket: String,
    },

    /// Print the public URL of an entry.
    Url {
        /// Entry URI.
        uri: String,
    },
}

/// On-disk configuration: providers keyed by name, each with its buckets.
#[derive(Debug, Default, Deserialize)]
struct StorageConfig {
    #[serde(default)]
    providers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    #[serde(flatten)]
    config: ProviderConfig,
    #[serde(default)]
    buckets: BTreeMap<String, BucketConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let registry = load_registry(&config_path).await?;

    let outcome = match cli.command {
        Commands::Providers => cmd_providers(&registry),

        Commands::Ls {
            uri,
            recursive,
            pattern,
            long,
        } => cmd_ls(&registry, &uri, recursive, pattern, long).await,

        Commands::Put { source, dest } => cmd_put(&registry, &source, &dest).await,

        Commands::Cat { uri } => cmd_cat(&registry, &uri).await,

        Commands::Get { uri, dest } => cmd_get(&registry, &uri, &dest).await,

        Commands::Cp {
            src,
            dest,
            recursive,
            pattern,
        } => cmd_transfer(&registry, &src, &dest, recursive, pattern, false).await,

        Commands::Mv {
            src,
            dest,
            recursive,
            pattern,
        } => cmd_transfer(&registry, &src, &dest, recursive, pattern, true).await,

        Commands::Rm {
            uri,
            recursive,
            pattern,
        } => cmd_rm(&registry, &uri, recursive, pattern).await,

        Commands::Mkdir { uri } => cmd_mkdir(&registry, &uri).await,

        Commands::Prune { bucket } => cmd_prune(&registry, &bucket).await,

        Commands::Url { uri } => cmd_url(&registry, &uri),
    };

    registry.teardown().await.context("Failed to shut down providers")?;
    outcome
}

fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(dir.join("filestore").join("storage.json"))
}

fn parse_config(json: &str) -> Result<StorageConfig> {
    serde_json::from_str(json).context("Invalid storage configuration")
}

/// Build a registry with every configured provider and bucket.
async fn load_registry(path: &Path) -> Result<ProviderRegistry> {
    let config = match tokio::fs::read_to_string(path).await {
        Ok(json) => parse_config(&json)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No configuration file, starting empty");
            StorageConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let registry = create_default_registry();
    for (name, entry) in config.providers {
        let provider = registry
            .add_provider(name.as_str(), entry.config)
            .await
            .with_context(|| format!("Failed to add provider '{}'", name))?;

        for (bucket, bucket_config) in entry.buckets {
            provider
                .add_bucket(bucket.as_str(), bucket_config)
                .await
                .into_result()
                .with_context(|| format!("Failed to add bucket '{}://{}'", name, bucket))?;
        }
    }

    info!(providers = registry.provider_names().len(), "Configuration loaded");
    Ok(registry)
}

/// Bucket addressed by a full storage URI.
fn bucket_for(registry: &ProviderRegistry, uri: &str) -> Result<Bucket> {
    let parsed: StorageUri = uri.parse().with_context(|| format!("Invalid storage URI '{}'", uri))?;
    registry
        .bucket_for(&parsed)
        .with_context(|| format!("Unknown bucket in '{}'", uri))
}

fn cmd_providers(registry: &ProviderRegistry) -> Result<()> {
    let mut names = registry.provider_names();
    if names.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    names.sort();
    for name in names {
        let provider = registry.get_provider(&name)?;
        println!("{} ({})", name, provider.backend().name());
        let mut buckets = provider.bucket_names();
        buckets.sort();
        for bucket in buckets {
            println!("  {}://{}", name, bucket);
        }
    }
    Ok(())
}

async fn cmd_ls(
    registry: &ProviderRegistry,
    uri: &str,
    recursive: bool,
    pattern: Option<String>,
    long: bool,
) -> Result<()> {
    let bucket = bucket_for(registry, uri)?;
    let options = ListOptions {
        recursive,
        pattern,
        returning: long,
    };

    let list = bucket
        .list_files(uri, options)
        .await
        .into_result()
        .context("Failed to list files")?;

    if list.is_empty() {
        println!("No files.");
        return Ok(());
    }

    for entry in list.entries {
        match entry {
            Returned::Uri(uri) => println!("{}", uri),
            Returned::Entity(file) => {
                let metadata = file.metadata().await?;
                let size = metadata.size.map(|s| format!("{} bytes", s)).unwrap_or_default();
                println!(
                    "{:>14}  {}  {}",
                    size,
                    metadata.modified.format("%Y-%m-%d %H:%M"),
                    file.storage_uri()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_put(registry: &ProviderRegistry, source: &Path, dest: &str) -> Result<()> {
    let data = tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let size = data.len();

    let bucket = bucket_for(registry, dest)?;
    let stored = bucket
        .put_file(dest, data, ReturnOptions::default())
        .await
        .into_result()
        .context("Failed to upload file")?;

    println!("Uploaded {} bytes to {}", size, stored.as_uri().unwrap_or(dest));
    Ok(())
}

async fn cmd_cat(registry: &ProviderRegistry, uri: &str) -> Result<()> {
    let data = bucket_for(registry, uri)?
        .read_file(uri)
        .await
        .into_result()
        .context("Failed to read file")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

async fn cmd_get(registry: &ProviderRegistry, uri: &str, dest: &Path) -> Result<()> {
    let data = bucket_for(registry, uri)?
        .read_file(uri)
        .await
        .into_result()
        .context("Failed to read file")?;

    tokio::fs::write(dest, &data)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    println!("Downloaded {} bytes to {}", data.len(), dest.display());
    Ok(())
}

async fn cmd_transfer(
    registry: &ProviderRegistry,
    src: &str,
    dest: &str,
    recursive: bool,
    pattern: Option<String>,
    is_move: bool,
) -> Result<()> {
    let bucket = bucket_for(registry, src)?;
    let verb = if is_move { "Moved" } else { "Copied" };

    if let Some(pattern) = pattern {
        let response = if is_move {
            bucket.move_files(src, dest, &pattern).await
        } else {
            bucket.copy_files(src, dest, &pattern).await
        };
        let uris = response.into_result().context("Batch transfer failed")?;
        for uri in &uris {
            println!("{}", uri);
        }
        println!("{} {} file(s)", verb, uris.len());
        return Ok(());
    }

    let target = if recursive {
        let response = if is_move {
            bucket.move_directory(src, dest, ReturnOptions::default()).await
        } else {
            bucket.copy_directory(src, dest, ReturnOptions::default()).await
        };
        response.into_result().context("Directory transfer failed")?
            .as_uri()
            .map(str::to_string)
    } else {
        let response = if is_move {
            bucket.move_file(src, dest, ReturnOptions::default()).await
        } else {
            bucket.copy_file(src, dest, ReturnOptions::default()).await
        };
        response.into_result().context("File transfer failed")?
            .as_uri()
            .map(str::to_string)
    };

    println!("{} {} -> {}", verb, src, target.as_deref().unwrap_or(dest));
    Ok(())
}

async fn cmd_rm(
    registry: &ProviderRegistry,
    uri: &str,
    recursive: bool,
    pattern: Option<String>,
) -> Result<()> {
    let bucket = bucket_for(registry, uri)?;

    if let Some(pattern) = pattern {
        let deleted = bucket
            .delete_files(uri, &pattern)
            .await
            .into_result()
            .context("Batch delete failed")?;
        println!("Deleted {} file(s)", deleted.len());
        return Ok(());
    }

    let response = if recursive {
        bucket.delete_directory(uri).await
    } else {
        bucket.delete_file(uri).await
    };
    response.into_result().context("Delete failed")?;

    println!("Deleted {}", uri);
    Ok(())
}

async fn cmd_mkdir(registry: &ProviderRegistry, uri: &str) -> Result<()> {
    bucket_for(registry, uri)?
        .make_directory(uri, ReturnOptions::default())
        .await
        .into_result()
        .context("Failed to create directory")?;

    println!("Created {}", uri);
    Ok(())
}

async fn cmd_prune(registry: &ProviderRegistry, uri: &str) -> Result<()> {
    bucket_for(registry, uri)?
        .remove_empty_directories()
        .await
        .into_result()
        .context("Failed to prune directories")?;

    println!("Pruned empty directories in {}", uri);
    Ok(())
}

fn cmd_url(registry: &ProviderRegistry, uri: &str) -> Result<()> {
    let url = bucket_for(registry, uri)?
        .public_url(uri)
        .into_result()
        .context("Failed to resolve URL")?
        .with_context(|| format!("Provider for '{}' has no public URL", uri))?;

    println!("{}", url);
    Ok(())
}
