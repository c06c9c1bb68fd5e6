/*!
File stores for resource persistence.

Entities never touch the filesystem directly; they hand fully rendered
content to a [`FileStore`]. This keeps the entity lifecycle independent of
where the bytes end up and lets tests count writes.
*/

pub mod local;
pub mod memory;

use crate::Result;
use std::path::Path;

/// Storage abstraction for resource files
#[cfg_attr(test, mockall::automock)]
pub trait FileStore: Send + Sync {
    /// True iff a regular file exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Write `content` to `path`, creating parent directories as needed
    ///
    /// Implementations must not leave a partially written file behind: either
    /// the new content is in place or the previous file is untouched.
    fn save(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Read the stored bytes at `path`
    fn load(&self, path: &Path) -> Result<Vec<u8>>;
}

// Re-export types for convenience
pub use local::LocalFileStore;
pub use memory::MemoryFileStore;
