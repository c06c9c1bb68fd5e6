/*!
Local filesystem store with atomic writes.
*/

use super::FileStore;
use crate::{ResourceError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Local filesystem store
///
/// Content is written to a temporary file in the target directory, synced,
/// and renamed over the destination, so readers never observe a partial
/// resource file.
///
/// # Example
/// ```rust
/// use resource_core::storage::{FileStore, LocalFileStore};
///
/// let dir = tempfile::TempDir::new()?;
/// let path = dir.path().join("nested/cache/user-42.resource.json");
///
/// let store = LocalFileStore::new();
/// store.save(&path, b"{}")?;
/// assert!(store.exists(&path));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }

    /// Directory the temporary file is created in
    fn staging_dir(path: &Path) -> &Path {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl FileStore for LocalFileStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        let directory = Self::staging_dir(path);
        fs::create_dir_all(directory)?;

        let mut staged = NamedTempFile::new_in(directory)?;
        staged.write_all(content)?;
        staged.as_file().sync_all()?;
        staged
            .persist(path)
            .map_err(|e| ResourceError::Io(e.error))?;

        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}
