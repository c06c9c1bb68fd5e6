/*!
# Resource Core

Named data caches that persist themselves to generated resource files.

A resource entity owns one serializable payload under a stable name. It can
save the payload to a human-readable file carrying a provenance header, load
it back with integrity verification, and optionally write itself out again
when its data changed.

- Stable file paths derived from normalized resource names
- Content hashes for change detection and integrity checks
- Readonly entities that never write
- Explicit autosave through `flush`/`close`, with a best-effort flush on drop
- Pluggable file store, key codec, clock and compression adapters

## Architecture

Entities work against a [`StorageContext`], which bundles the collaborators
that touch the outside world. Local files and gzip are the defaults; tests
swap in [`MemoryFileStore`] and [`FixedClock`].

## Usage

```rust
use resource_core::{Entity, PersistentEntity, StorageConfig, StorageContext};
use serde_json::{json, Value};

let dir = tempfile::TempDir::new()?;
let context = StorageContext::from_config(StorageConfig::local_with_base_directory(dir.path()))?;

let mut users = Entity::named("user:42")
    .context(context.clone())
    .autosave(true)
    .build(json!({"role": "admin"}))?;
users.data_mut()["role"] = json!("owner");
let path = users.file_path().to_path_buf();
users.close()?;

let restored = Entity::<Value>::load(&path, &context)?;
assert_eq!(restored.data()["role"], "owner");
# Ok::<(), resource_core::ResourceError>(())
```
*/

pub mod clock;
pub mod compression;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod key;
pub mod observability;
pub mod record;
pub mod storage;


pub use clock::{Clock, FixedClock, SystemClock, Timestamp};
pub use compression::{CompressionAdapter, CompressionKind, GzipCompressor, NoCompression};
pub use config::{StorageConfig, StorageDirectoryResolver};
pub use context::StorageContext;
pub use entity::{AutosaveBaseline, Entity, EntityBuilder, Hydrate, Payload, PersistentEntity};
pub use error::{ResourceError, Result};
pub use key::{DefaultKeyCodec, KeyCodec};
pub use observability::{init_default_observability, init_observability};
pub use record::{ProvenanceHeader, ResourceFile, ResourceRecord};
pub use storage::{FileStore, LocalFileStore, MemoryFileStore};
