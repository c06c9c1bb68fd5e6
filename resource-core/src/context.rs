/*!
The collaborators an entity works against.

A [`StorageContext`] bundles the file store, key codec, clock, compression
adapter and directory resolver. Entities hold a clone of it, so tests can
swap any single collaborator without touching process-wide state.
*/

use crate::clock::{Clock, SystemClock};
use crate::compression::CompressionAdapter;
use crate::config::{StorageConfig, StorageDirectoryResolver};
use crate::key::{DefaultKeyCodec, KeyCodec};
use crate::record::ResourceFile;
use crate::storage::{FileStore, LocalFileStore};
use crate::{ResourceError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators shared by entities
#[derive(Clone)]
pub struct StorageContext {
    store: Arc<dyn FileStore>,
    codec: Arc<dyn KeyCodec>,
    clock: Arc<dyn Clock>,
    compressor: Arc<dyn CompressionAdapter>,
    resolver: Arc<dyn StorageDirectoryResolver>,
    file_extension: String,
}

impl StorageContext {
    /// Build a context for local files from a storage configuration
    ///
    /// # Example
    /// ```rust
    /// use resource_core::{StorageConfig, StorageContext};
    ///
    /// let config = StorageConfig::local_with_base_directory("/srv/cache").gzip();
    /// let context = StorageContext::from_config(config)?;
    /// assert_eq!(context.file_extension(), ".resource.json.gz");
    /// # Ok::<(), resource_core::ResourceError>(())
    /// ```
    pub fn from_config(config: StorageConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store: Arc::new(LocalFileStore::new()),
            codec: Arc::new(DefaultKeyCodec::new()),
            clock: Arc::new(SystemClock::new()),
            compressor: config.compression.adapter(),
            file_extension: config.file_extension.clone(),
            resolver: Arc::new(config),
        })
    }

    /// Replace the file store
    pub fn with_store<S: FileStore + 'static>(mut self, store: S) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Replace the key codec
    pub fn with_codec<K: KeyCodec + 'static>(mut self, codec: K) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replace the clock
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the compression adapter
    pub fn with_compressor<C: CompressionAdapter + 'static>(mut self, compressor: C) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    /// Replace the directory resolver
    pub fn with_resolver<R: StorageDirectoryResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    pub fn codec(&self) -> &dyn KeyCodec {
        self.codec.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn compressor(&self) -> &dyn CompressionAdapter {
        self.compressor.as_ref()
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Default root for entities constructed without a directory
    pub fn storage_directory(&self) -> PathBuf {
        self.resolver.storage_directory()
    }

    /// Normalize a directory the way entity paths are normalized
    ///
    /// # Errors
    /// * `ResourceError::Validation` - the directory is not valid UTF-8
    pub fn normalize_directory(&self, directory: &Path) -> Result<PathBuf> {
        let text = directory.to_str().ok_or_else(|| {
            ResourceError::validation(format!(
                "Storage directory {} is not valid UTF-8",
                directory.display()
            ))
        })?;
        Ok(PathBuf::from(self.codec.normalize_path(text)))
    }

    /// File name of a resource: its normalized key plus the file extension
    pub fn file_name(&self, name: &str) -> String {
        format!("{}{}", self.codec.normalize_key(name), self.file_extension)
    }

    /// Derive the file path for an already resolved resource name
    pub fn resolve_path(&self, name: &str, directory: &Path) -> Result<PathBuf> {
        Ok(self.normalize_directory(directory)?.join(self.file_name(name)))
    }

    /// Load, decompress and decode the resource file at `path`
    pub fn read_file(&self, path: &Path) -> Result<ResourceFile> {
        let stored = self.store.load(path)?;
        let content = self.compressor.decompress(&stored)?;
        let text = String::from_utf8(content).map_err(|e| {
            ResourceError::invalid_format(format!(
                "Resource file {} is not valid UTF-8: {e}",
                path.display()
            ))
        })?;
        ResourceFile::decode(&text)
    }
}

impl Default for StorageContext {
    fn default() -> Self {
        Self {
            store: Arc::new(LocalFileStore::new()),
            codec: Arc::new(DefaultKeyCodec::new()),
            clock: Arc::new(SystemClock::new()),
            compressor: StorageConfig::default_local().compression.adapter(),
            file_extension: StorageConfig::default_local().file_extension,
            resolver: Arc::new(StorageConfig::default_local()),
        }
    }
}

impl fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageContext")
            .field("compression", &self.compressor.algorithm_name())
            .field("file_extension", &self.file_extension)
            .field("storage_directory", &self.storage_directory())
            .finish_non_exhaustive()
    }
}
