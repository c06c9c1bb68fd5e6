//! Configuration for resource storage
//!
//! This module provides the storage configuration (root directory, file
//! suffix, compression) and the resolver that supplies a default root
//! directory to entities constructed without one.

use crate::compression::CompressionKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the default storage directory
pub const STORAGE_DIR_ENV: &str = "RESOURCE_STORAGE_DIR";

/// Environment variable overriding the file suffix
pub const FILE_EXTENSION_ENV: &str = "RESOURCE_FILE_EXTENSION";

/// Environment variable selecting compression (`none`, `gzip`)
pub const COMPRESSION_ENV: &str = "RESOURCE_COMPRESSION";

/// Suffix of plain resource files
pub const DEFAULT_FILE_EXTENSION: &str = ".resource.json";

/// Suffix of gzip-compressed resource files
pub const GZIP_FILE_EXTENSION: &str = ".resource.json.gz";

static DEFAULT_STORAGE_DIRECTORY: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os(STORAGE_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("resources"))
});

/// Process-wide default root for resource files
///
/// Read once from `RESOURCE_STORAGE_DIR`, falling back to `<tmp>/resources`.
pub fn default_storage_directory() -> PathBuf {
    DEFAULT_STORAGE_DIRECTORY.clone()
}

/// Supplies the root directory for entities constructed without one
pub trait StorageDirectoryResolver: Send + Sync {
    fn storage_directory(&self) -> PathBuf;
}

/// Configuration structure for resource storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory (optional, defaults to the process-wide default)
    pub base_directory: Option<PathBuf>,
    /// Suffix appended to every normalized resource key
    pub file_extension: String,
    /// Compression applied to the rendered file
    pub compression: CompressionKind,
}

impl StorageConfig {
    /// Plain-text files under the process-wide default directory
    pub fn default_local() -> Self {
        StorageConfig {
            base_directory: None,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            compression: CompressionKind::None,
        }
    }

    /// Plain-text files under the given directory
    pub fn local_with_base_directory<P: Into<PathBuf>>(directory: P) -> Self {
        StorageConfig {
            base_directory: Some(directory.into()),
            ..Self::default_local()
        }
    }

    /// Switch to gzip-compressed files with the matching suffix
    pub fn gzip(self) -> Self {
        self.with_compression(CompressionKind::Gzip)
    }

    /// Select a compression, swapping between the default suffixes
    ///
    /// A custom file extension is kept as-is.
    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        let default_extension = match compression {
            CompressionKind::None => DEFAULT_FILE_EXTENSION,
            CompressionKind::Gzip => GZIP_FILE_EXTENSION,
        };
        if self.file_extension == DEFAULT_FILE_EXTENSION
            || self.file_extension == GZIP_FILE_EXTENSION
        {
            self.file_extension = default_extension.to_string();
        }
        self
    }

    /// Build a configuration from the environment
    ///
    /// Reads `RESOURCE_COMPRESSION` and `RESOURCE_FILE_EXTENSION`; the storage
    /// directory comes from `RESOURCE_STORAGE_DIR` through the process default.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from variables supplied by `lookup`
    ///
    /// Compression is applied before the extension, so an explicit extension
    /// wins over the compressed default. Unset variables keep their defaults;
    /// invalid values are rejected.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default_local();

        if let Some(value) = lookup(COMPRESSION_ENV) {
            config = config.with_compression(CompressionKind::parse(&value)?);
        }
        if let Some(extension) = lookup(FILE_EXTENSION_ENV) {
            config.file_extension = extension;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if !self.file_extension.starts_with('.') || self.file_extension.len() < 2 {
            return Err(crate::ResourceError::validation(format!(
                "File extension must start with '.' and name a suffix, got '{}'",
                self.file_extension
            )));
        }
        if self.file_extension.contains(['/', '\\']) {
            return Err(crate::ResourceError::validation(
                "File extension cannot contain path separators",
            ));
        }
        if let Some(directory) = &self.base_directory {
            if directory.as_os_str().is_empty() {
                return Err(crate::ResourceError::validation(
                    "Base directory cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

impl StorageDirectoryResolver for StorageConfig {
    fn storage_directory(&self) -> PathBuf {
        self.base_directory
            .clone()
            .unwrap_or_else(default_storage_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_local_config() {
        let config = StorageConfig::default_local();
        assert!(config.base_directory.is_none());
        assert_eq!(config.file_extension, DEFAULT_FILE_EXTENSION);
        assert_eq!(config.compression, CompressionKind::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolver_prefers_base_directory() {
        let config = StorageConfig::local_with_base_directory("/srv/cache");
        assert_eq!(config.storage_directory(), PathBuf::from("/srv/cache"));

        let fallback = StorageConfig::default_local();
        assert_eq!(fallback.storage_directory(), default_storage_directory());
    }

    #[test]
    fn test_default_storage_directory_is_stable() {
        assert_eq!(default_storage_directory(), default_storage_directory());
    }

    #[test]
    fn test_gzip_config_switches_extension() {
        let config = StorageConfig::local_with_base_directory("/srv/cache").gzip();
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.file_extension, GZIP_FILE_EXTENSION);

        let mut custom = StorageConfig::default_local();
        custom.file_extension = ".cache".to_string();
        assert_eq!(custom.gzip().file_extension, ".cache");
    }

    #[test]
    fn test_with_compression_swaps_default_extensions() {
        let config = StorageConfig::default_local().gzip();
        let plain = config.with_compression(CompressionKind::None);
        assert_eq!(plain.compression, CompressionKind::None);
        assert_eq!(plain.file_extension, DEFAULT_FILE_EXTENSION);
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = StorageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StorageConfig::default_local());
    }

    #[test]
    fn test_from_lookup_gzip_override() {
        let config =
            StorageConfig::from_lookup(lookup_from(&[(COMPRESSION_ENV, "gzip")])).unwrap();
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.file_extension, GZIP_FILE_EXTENSION);
    }

    #[test]
    fn test_from_lookup_extension_wins_over_gzip_default() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            (COMPRESSION_ENV, "gzip"),
            (FILE_EXTENSION_ENV, ".cache.gz"),
        ]))
        .unwrap();
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.file_extension, ".cache.gz");
    }

    #[test]
    fn test_from_lookup_rejects_invalid_values() {
        let result = StorageConfig::from_lookup(lookup_from(&[(COMPRESSION_ENV, "zstd")]));
        assert!(matches!(result, Err(crate::ResourceError::Validation(_))));

        let result = StorageConfig::from_lookup(lookup_from(&[(FILE_EXTENSION_ENV, "json")]));
        assert!(matches!(result, Err(crate::ResourceError::Validation(_))));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        std::env::set_var(COMPRESSION_ENV, "gzip");
        std::env::set_var(FILE_EXTENSION_ENV, ".env.json.gz");
        let config = StorageConfig::from_env();
        std::env::remove_var(COMPRESSION_ENV);
        std::env::remove_var(FILE_EXTENSION_ENV);

        let config = config.unwrap();
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.file_extension, ".env.json.gz");
        assert!(config.base_directory.is_none());
    }

    #[test]
    fn test_validate_file_extension() {
        let mut config = StorageConfig::default_local();

        config.file_extension = "resource.json".to_string();
        assert!(config.validate().is_err());

        config.file_extension = ".".to_string();
        assert!(config.validate().is_err());

        config.file_extension = ".a/b".to_string();
        assert!(config.validate().is_err());

        config.file_extension = ".resource.dat".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_base_directory() {
        let config = StorageConfig::local_with_base_directory("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = StorageConfig::local_with_base_directory("/srv/cache").gzip();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"gzip\""));

        let restored: StorageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
