/*!
In-memory store, used for tests and dry runs.
*/

use super::FileStore;
use crate::{ResourceError, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Memory-based store
///
/// Clones share the same files, so a test can keep a handle while the
/// store itself is owned by a storage context.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Paths currently stored
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<PathBuf, Vec<u8>>>> {
        self.files
            .lock()
            .map_err(|_| ResourceError::Io(io::Error::other("memory store lock poisoned")))
    }
}

impl FileStore for MemoryFileStore {
    fn exists(&self, path: &Path) -> bool {
        self.lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn save(&self, path: &Path, content: &[u8]) -> Result<()> {
        self.lock()?.insert(path.to_path_buf(), content.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        self.lock()?.get(path).cloned().ok_or_else(|| {
            ResourceError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Resource not found: {}", path.display()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryFileStore::new();
        let handle = store.clone();
        let path = Path::new("/cache/user-42.resource.json");

        assert!(!store.exists(path));
        store.save(path, b"one").unwrap();
        store.save(path, b"two").unwrap();

        assert!(handle.exists(path));
        assert_eq!(handle.writes(), 2);
        assert_eq!(handle.load(path).unwrap(), b"two");
        assert_eq!(handle.paths(), vec![path.to_path_buf()]);
    }

    #[test]
    fn test_memory_store_missing_path() {
        let store = MemoryFileStore::new();
        let result = store.load(Path::new("/missing"));
        assert!(matches!(result, Err(ResourceError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound));
    }
}
