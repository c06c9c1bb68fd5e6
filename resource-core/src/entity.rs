/*!
Persistent resource entities.

An [`Entity`] owns one named payload and knows how to write it to a
generated resource file and how to rebuild itself from one. Construction
never touches the filesystem; the file path is derived on first use and the
payload is hashed so later changes can be detected.

Autosave is an explicit flush: [`Entity::flush`] and [`Entity::close`]
report failures to the caller, and dropping an entity that was never closed
performs the same flush on a best-effort basis, logging instead of failing.
*/

use crate::clock::Timestamp;
use crate::context::StorageContext;
use crate::record::{type_label, ProvenanceHeader, ResourceFile, ResourceRecord};
#[cfg(feature = "metrics")]
use crate::observability::{ResourceMetrics, SaveTimer};
use crate::{ResourceError, Result};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Values an entity can persist
pub trait Payload: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> Payload for T {}

/// What the current data is compared against when deciding whether to autosave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutosaveBaseline {
    /// The hash captured at construction; never refreshed
    #[default]
    Construction,
    /// The hash of the most recent successful save, or the construction hash before one
    LastSave,
}

#[derive(Debug, Clone)]
enum Identity {
    /// Arbitrary name, normalized into a key
    Key(String),
    /// Used as-is: type names and names read back from records
    Verbatim(String),
}

/// Construction options for an [`Entity`]
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    identity: Identity,
    readonly: bool,
    autosave: bool,
    directory: Option<PathBuf>,
    context: Option<StorageContext>,
    generator: Option<&'static str>,
    baseline: AutosaveBaseline,
}

impl EntityBuilder {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            readonly: false,
            autosave: false,
            directory: None,
            context: None,
            generator: None,
            baseline: AutosaveBaseline::default(),
        }
    }

    /// Disable every write for the entity's lifetime
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Save on flush, close or drop when the data changed
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Store the file under `directory` instead of the context default
    pub fn directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn context(mut self, context: StorageContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Record `G` as the generator of saved files
    pub fn generator<G: ?Sized>(mut self) -> Self {
        self.generator = Some(type_name::<G>());
        self
    }

    pub fn baseline(mut self, baseline: AutosaveBaseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Resolve the entity name, failing when it normalizes to nothing
    fn resolve_name(&self, context: &StorageContext) -> Result<String> {
        let (raw, name) = match &self.identity {
            Identity::Key(raw) => (raw, context.codec().normalize_key(raw)),
            Identity::Verbatim(raw) => (raw, raw.trim().to_string()),
        };
        if name.is_empty() {
            return Err(ResourceError::InvalidIdentity(raw.clone()));
        }
        Ok(name)
    }

    fn resolve_directory(&self, context: &StorageContext) -> Result<PathBuf> {
        let directory = self
            .directory
            .clone()
            .unwrap_or_else(|| context.storage_directory());
        context.normalize_directory(&directory)
    }

    /// Construct the entity around its initial data
    ///
    /// # Errors
    /// * `ResourceError::InvalidIdentity` - the name normalizes to an empty key
    /// * `ResourceError::Validation` - the storage directory is not valid UTF-8
    /// * `ResourceError::Export` - the data cannot be serialized for hashing
    pub fn build<T: Payload>(self, data: T) -> Result<Entity<T>> {
        let context = self.context.clone().unwrap_or_default();
        let name = self.resolve_name(&context)?;
        let storage_directory = self.resolve_directory(&context)?;
        self.assemble(context, name, storage_directory, None, data)
    }

    /// Rebuild an entity from an exported record
    ///
    /// The record must carry this builder's name, and its payload must still
    /// match the recorded hash. Without an explicit directory the entity lives
    /// in the directory of the record's `path`, which [`PersistentEntity::load`]
    /// sets to the file the record was read from. Without an explicit generator
    /// the recorded one is kept.
    ///
    /// # Errors
    /// * `ResourceError::NameMismatch` - the record belongs to another resource
    /// * `ResourceError::IntegrityCheckFailed` - the payload no longer matches its hash
    pub fn hydrate<T: Payload>(self, record: ResourceRecord<T>) -> Result<Entity<T>> {
        let context = self.context.clone().unwrap_or_default();
        let name = self.resolve_name(&context)?;
        if name != record.name {
            return Err(ResourceError::NameMismatch {
                expected: name,
                found: record.name,
            });
        }

        let storage_directory = match (&self.directory, Path::new(&record.path).parent()) {
            (None, Some(parent)) if !parent.as_os_str().is_empty() => {
                context.normalize_directory(parent)?
            }
            _ => self.resolve_directory(&context)?,
        };

        let entity = self.assemble(
            context,
            name,
            storage_directory,
            Some(record.generator),
            record.data,
        )?;
        if entity.hash != record.hash {
            return Err(ResourceError::IntegrityCheckFailed {
                expected: record.hash,
                actual: entity.hash.clone(),
            });
        }
        Ok(entity)
    }

    /// Hydrate from the existing file when there is one, otherwise build from `data`
    pub fn open<T: Payload>(self, data: T) -> Result<Entity<T>> {
        let context = self.context.clone().unwrap_or_default();
        let name = self.resolve_name(&context)?;
        let directory = self.resolve_directory(&context)?;
        let path = directory.join(context.file_name(&name));

        if !context.store().exists(&path) {
            return self.context(context).build(data);
        }

        debug!(resource = %name, path = %path.display(), "Opening existing resource file");
        let record = context.read_file(&path)?.record.into_typed::<T>()?;
        self.context(context).directory(directory).hydrate(record)
    }

    fn assemble<T: Payload>(
        self,
        context: StorageContext,
        name: String,
        storage_directory: PathBuf,
        recorded_generator: Option<String>,
        data: T,
    ) -> Result<Entity<T>> {
        let value = serde_json::to_value(&data).map_err(|e| ResourceError::export(&name, e))?;
        let hash = context.codec().hash_key(&value);

        debug!(
            resource = %name,
            hash = %hash,
            directory = %storage_directory.display(),
            "Resource entity constructed"
        );

        Ok(Entity {
            name,
            type_label: type_label(&value),
            data,
            hash,
            last_saved: None,
            readonly: self.readonly,
            autosave: self.autosave,
            baseline: self.baseline,
            storage_directory,
            filename: OnceCell::new(),
            generator: match (self.generator, recorded_generator) {
                (Some(generator), _) => Cow::Borrowed(generator),
                (None, Some(recorded)) => Cow::Owned(recorded),
                (None, None) => Cow::Borrowed(type_name::<Entity<T>>()),
            },
            context,
            closed: false,
        })
    }
}

/// A named payload persisted to a generated resource file
///
/// # Example
/// ```rust
/// use resource_core::{Entity, StorageConfig, StorageContext};
/// use serde_json::json;
///
/// let dir = tempfile::TempDir::new()?;
/// let context = StorageContext::from_config(StorageConfig::local_with_base_directory(dir.path()))?;
///
/// let mut entity = Entity::named("user:42")
///     .context(context)
///     .build(json!({"role": "admin"}))?;
///
/// entity.save()?;
/// assert!(entity.exists());
/// assert!(entity.file_path().ends_with("user-42.resource.json"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Entity<T: Payload> {
    name: String,
    data: T,
    type_label: &'static str,
    hash: String,
    last_saved: Option<String>,
    readonly: bool,
    autosave: bool,
    baseline: AutosaveBaseline,
    storage_directory: PathBuf,
    filename: OnceCell<PathBuf>,
    generator: Cow<'static, str>,
    context: StorageContext,
    closed: bool,
}

// The builder is payload-agnostic; `build` and `hydrate` pick the payload type.
impl Entity<Value> {
    /// Entity identified by an arbitrary name, normalized into a key
    pub fn named<S: Into<String>>(name: S) -> EntityBuilder {
        EntityBuilder::new(Identity::Key(name.into()))
    }

    /// Entity identified by the type name of `K`, used verbatim
    pub fn typed<K: ?Sized>() -> EntityBuilder {
        EntityBuilder::new(Identity::Verbatim(type_name::<K>().to_string()))
    }

    /// Entity over an untyped JSON payload with default options
    pub fn json<S: Into<String>>(name: S, data: Value) -> Result<Self> {
        Self::named(name).build(data)
    }
}

impl<T: Payload> Entity<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable access to the payload; changes are picked up by the next save or flush
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Replace the payload, returning the previous one
    pub fn set_data(&mut self, data: T) -> T {
        std::mem::replace(&mut self.data, data)
    }

    /// Type label captured at construction
    pub fn type_label(&self) -> &'static str {
        self.type_label
    }

    /// Hash of the data at construction
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn autosaves(&self) -> bool {
        self.autosave
    }

    pub fn baseline(&self) -> AutosaveBaseline {
        self.baseline
    }

    /// Type recorded as the generator of saved files
    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn storage_directory(&self) -> &Path {
        &self.storage_directory
    }

    pub fn context(&self) -> &StorageContext {
        &self.context
    }

    /// Path of the resource file, derived once and cached
    pub fn file_path(&self) -> &Path {
        self.filename.get_or_init(|| {
            let path = self
                .storage_directory
                .join(self.context.file_name(&self.name));
            debug!(resource = %self.name, path = %path.display(), "Resolved resource path");
            path
        })
    }

    /// Whether a resource file exists at [`Entity::file_path`]
    pub fn exists(&self) -> bool {
        self.context.store().exists(self.file_path())
    }

    /// Hash of the current data
    pub fn data_hash(&self) -> Result<String> {
        self.hash_of(&self.data)
    }

    /// Hash of an arbitrary payload value, computed the way this entity hashes its own data
    pub fn hash_of(&self, data: &T) -> Result<String> {
        let value = self.to_value(data)?;
        Ok(self.context.codec().hash_key(&value))
    }

    fn to_value(&self, data: &T) -> Result<Value> {
        serde_json::to_value(data).map_err(|e| ResourceError::export(&self.name, e))
    }

    /// Build the record describing the current data
    ///
    /// Type label and hash are computed fresh from the data as it is now.
    pub fn export_record(&self, generated: &Timestamp) -> Result<ResourceRecord<Value>> {
        let data = self.to_value(&self.data)?;
        Ok(ResourceRecord {
            name: self.name.clone(),
            // lossless: the directory is checked for UTF-8 at construction
            path: self.file_path().to_string_lossy().into_owned(),
            generator: self.generator.to_string(),
            generated: generated.datetime.clone(),
            timestamp: generated.unix_timestamp,
            type_label: type_label(&data).to_string(),
            hash: self.context.codec().hash_key(&data),
            data,
        })
    }

    /// Serialize the current record
    ///
    /// # Errors
    /// * `ResourceError::Export` - the data cannot be represented, with the codec error as source
    pub fn export_data(&self, generated: &Timestamp) -> Result<String> {
        let record = self.export_record(generated)?;
        serde_json::to_string_pretty(&record).map_err(|e| ResourceError::export(&self.name, e))
    }

    /// Write the resource file
    ///
    /// A readonly entity logs and returns without writing. Otherwise the hash
    /// and timestamp are recomputed, the full content is built in memory and
    /// handed to the file store, so a failure leaves any previous file intact.
    ///
    /// # Errors
    /// * `ResourceError::Export` - the data cannot be serialized
    /// * `ResourceError::Compression` - the content cannot be compressed
    /// * `ResourceError::Io` - the write failed
    pub fn save(&mut self) -> Result<()> {
        if self.readonly {
            info!(resource = %self.name, "Could not save resource, as it is readonly");
            #[cfg(feature = "metrics")]
            ResourceMetrics::global().record_readonly_skip();
            return Ok(());
        }

        #[cfg(feature = "metrics")]
        let timer = SaveTimer::start();

        let written = self.write();

        #[cfg(feature = "metrics")]
        match &written {
            Ok((_, size)) => timer.finish(*size),
            Err(_) => timer.finish_with_error(),
        }

        let (hash, _) = written?;
        if self.baseline == AutosaveBaseline::LastSave {
            self.last_saved = Some(hash);
        }
        Ok(())
    }

    fn write(&self) -> Result<(String, usize)> {
        let generated = self.context.clock().now();
        let record = self.export_record(&generated)?;
        let body =
            serde_json::to_string_pretty(&record).map_err(|e| ResourceError::export(&self.name, e))?;
        let content = ResourceFile::render_with_body(&ProvenanceHeader::for_record(&record), &body);
        let bytes = self.context.compressor().compress(content.as_bytes())?;

        self.context.store().save(self.file_path(), &bytes)?;

        debug!(
            resource = %self.name,
            path = %self.file_path().display(),
            hash = %record.hash,
            bytes = bytes.len(),
            "Resource saved"
        );
        Ok((record.hash, bytes.len()))
    }

    /// Whether the data differs from the autosave baseline
    pub fn is_dirty(&self) -> Result<bool> {
        let baseline = match self.baseline {
            AutosaveBaseline::Construction => &self.hash,
            AutosaveBaseline::LastSave => self.last_saved.as_ref().unwrap_or(&self.hash),
        };
        Ok(self.data_hash()? != *baseline)
    }

    /// Autosave now: write when autosave is on, the entity is writable and the data changed
    ///
    /// Returns whether a file was written.
    pub fn flush(&mut self) -> Result<bool> {
        if self.readonly || !self.autosave || !self.is_dirty()? {
            return Ok(false);
        }

        debug!(resource = %self.name, "Autosaving changed resource");
        self.save()?;
        #[cfg(feature = "metrics")]
        ResourceMetrics::global().record_autosave();
        Ok(true)
    }

    /// Flush and disarm the drop-time autosave
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush().map(|_| ())
    }
}

impl<T: Payload> Drop for Entity<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            error!(
                resource = %self.name,
                error = %e,
                "Autosave failed while dropping resource entity"
            );
        }
    }
}

/// Reconstruct an entity from a decoded record
pub trait Hydrate: Sized {
    type Data: Payload;

    fn hydrate(record: ResourceRecord<Self::Data>, context: &StorageContext) -> Result<Self>;
}

impl<T: Payload> Hydrate for Entity<T> {
    type Data = T;

    fn hydrate(record: ResourceRecord<T>, context: &StorageContext) -> Result<Self> {
        EntityBuilder::new(Identity::Verbatim(record.name.clone()))
            .context(context.clone())
            .hydrate(record)
    }
}

/// Types built around an [`Entity`]
///
/// Implementors supply access to their entity and a [`Hydrate`] impl; saving,
/// path resolution and loading from disk come for free.
///
/// # Example
/// ```rust
/// use resource_core::{Entity, Hydrate, PersistentEntity, ResourceRecord, Result, StorageContext};
/// use std::collections::BTreeMap;
///
/// struct FeatureFlags {
///     entity: Entity<BTreeMap<String, bool>>,
/// }
///
/// impl Hydrate for FeatureFlags {
///     type Data = BTreeMap<String, bool>;
///
///     fn hydrate(record: ResourceRecord<Self::Data>, context: &StorageContext) -> Result<Self> {
///         let entity = Entity::typed::<Self>()
///             .generator::<Self>()
///             .context(context.clone())
///             .hydrate(record)?;
///         Ok(Self { entity })
///     }
/// }
///
/// impl PersistentEntity for FeatureFlags {
///     fn entity(&self) -> &Entity<Self::Data> {
///         &self.entity
///     }
///
///     fn entity_mut(&mut self) -> &mut Entity<Self::Data> {
///         &mut self.entity
///     }
/// }
/// ```
pub trait PersistentEntity: Hydrate {
    fn entity(&self) -> &Entity<Self::Data>;

    fn entity_mut(&mut self) -> &mut Entity<Self::Data>;

    fn name(&self) -> &str {
        self.entity().name()
    }

    fn data(&self) -> &Self::Data {
        self.entity().data()
    }

    fn file_path(&self) -> &Path {
        self.entity().file_path()
    }

    fn exists(&self) -> bool {
        self.entity().exists()
    }

    fn data_hash(&self) -> Result<String> {
        self.entity().data_hash()
    }

    fn save(&mut self) -> Result<()> {
        self.entity_mut().save()
    }

    fn flush(&mut self) -> Result<bool> {
        self.entity_mut().flush()
    }

    /// Flush and disarm the drop-time autosave of the wrapped entity
    fn close(mut self) -> Result<()> {
        let entity = self.entity_mut();
        entity.closed = true;
        entity.flush().map(|_| ())
    }

    /// Read, decode and hydrate the resource file at `path`
    ///
    /// The loaded entity writes back to `path`, whatever location the file
    /// recorded when it was generated.
    fn load(path: &Path, context: &StorageContext) -> Result<Self> {
        let loaded_from = path.to_str().ok_or_else(|| {
            ResourceError::validation(format!(
                "Resource file path {} is not valid UTF-8",
                path.display()
            ))
        })?;

        let mut record = context.read_file(path)?.record.into_typed::<Self::Data>()?;
        if record.path != loaded_from {
            debug!(
                resource = %record.name,
                path = %loaded_from,
                recorded = %record.path,
                "Resource file was generated at another location"
            );
            record.path = loaded_from.to_string();
        }
        Self::hydrate(record, context)
    }
}

impl<T: Payload> PersistentEntity for Entity<T> {
    fn entity(&self) -> &Entity<T> {
        self
    }

    fn entity_mut(&mut self) -> &mut Entity<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::{FileStore, MemoryFileStore, MockFileStore};
    use serde_json::json;
    use std::collections::HashMap;
    use std::io;

    fn memory_context() -> (StorageContext, MemoryFileStore) {
        let store = MemoryFileStore::new();
        let context = StorageContext::default()
            .with_store(store.clone())
            .with_clock(FixedClock::at_unix(1_700_000_000));
        (context, store)
    }

    fn mock_context(store: MockFileStore) -> StorageContext {
        StorageContext::default()
            .with_store(store)
            .with_clock(FixedClock::at_unix(1_700_000_000))
    }

    #[test]
    fn test_named_identity_is_normalized() {
        let (context, _) = memory_context();
        let entity = Entity::named(" User:42 ")
            .context(context)
            .build(json!({}))
            .unwrap();
        assert_eq!(entity.name(), "user-42");
    }

    #[test]
    fn test_typed_identity_is_verbatim() {
        struct SessionCache;

        let (context, _) = memory_context();
        let entity = Entity::typed::<SessionCache>()
            .context(context)
            .directory("/cache")
            .build(json!([]))
            .unwrap();

        assert!(entity.name().ends_with("SessionCache"));
        assert!(entity.name().contains("::"));
        let file_name = entity.file_path().file_name().unwrap().to_string_lossy();
        assert!(file_name.ends_with("-sessioncache.resource.json"));
    }

    #[test]
    fn test_empty_identity_is_rejected() {
        let (context, _) = memory_context();
        let result = Entity::named("  ::  ").context(context).build(json!(1));
        assert!(matches!(result, Err(ResourceError::InvalidIdentity(_))));
    }

    #[test]
    fn test_file_path_is_memoized_and_normalized() {
        let (context, _) = memory_context();
        let mut entity = Entity::named("user:42")
            .context(context)
            .directory("/srv//cache/./resources/")
            .build(json!({"role": "admin"}))
            .unwrap();

        let first = entity.file_path().to_path_buf();
        assert_eq!(first, PathBuf::from("/srv/cache/resources/user-42.resource.json"));

        entity.save().unwrap();
        entity.save().unwrap();
        assert_eq!(entity.file_path(), first.as_path());
        assert!(std::ptr::eq(entity.file_path(), entity.file_path()));
    }

    #[test]
    fn test_construction_does_no_io() {
        let mut store = MockFileStore::new();
        store.expect_save().times(0);
        store.expect_exists().times(0);
        store.expect_load().times(0);

        let entity = Entity::named("lazy")
            .context(mock_context(store))
            .build(json!({"a": 1}))
            .unwrap();
        assert_eq!(entity.type_label(), "object");
    }

    #[test]
    fn test_hash_baseline_and_data_hash() {
        let (context, _) = memory_context();
        let codec_hash = context.codec().hash_key(&json!({"role": "admin"}));
        let mut entity = Entity::named("user:42")
            .context(context)
            .build(json!({"role": "admin"}))
            .unwrap();

        assert_eq!(entity.hash(), codec_hash);
        assert_eq!(entity.data_hash().unwrap(), codec_hash);

        entity.data_mut()["role"] = json!("guest");
        assert_ne!(entity.data_hash().unwrap(), codec_hash);
        assert_eq!(entity.hash(), codec_hash);
        assert_eq!(entity.hash_of(&json!({"role": "admin"})).unwrap(), codec_hash);
    }

    #[test]
    fn test_export_record_fields() {
        let (context, _) = memory_context();
        let entity = Entity::named("user:42")
            .context(context.clone())
            .directory("/cache")
            .build(json!({"role": "admin"}))
            .unwrap();

        let generated = context.clock().now();
        let record = entity.export_record(&generated).unwrap();

        assert_eq!(record.name, "user-42");
        assert_eq!(record.path, "/cache/user-42.resource.json");
        assert_eq!(record.generator, entity.generator());
        assert_eq!(record.generated, "2023-11-14T22:13:20+00:00");
        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.type_label, "object");
        assert_eq!(record.hash, entity.hash());
        assert_eq!(record.data, json!({"role": "admin"}));

        let exported = entity.export_data(&generated).unwrap();
        let decoded: ResourceRecord<Value> = serde_json::from_str(&exported).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_export_type_label_is_fresh() {
        let (context, _) = memory_context();
        let mut entity = Entity::named("drift")
            .context(context.clone())
            .build(json!(42))
            .unwrap();
        entity.set_data(json!("forty-two"));

        let record = entity.export_record(&context.clock().now()).unwrap();
        assert_eq!(entity.type_label(), "integer");
        assert_eq!(record.type_label, "string");
    }

    #[test]
    fn test_export_failure_propagates_from_save() {
        let (context, store) = memory_context();
        let mut entity = Entity::named("grid")
            .context(context)
            .build(HashMap::<(u8, u8), u8>::new())
            .unwrap();

        entity.data_mut().insert((1, 2), 3);
        let error = entity.save().unwrap_err();

        match &error {
            ResourceError::Export { name, source } => {
                assert_eq!(name, "grid");
                assert!(source.to_string().contains("key must be a string"));
            }
            other => panic!("Expected export failure, got {other:?}"),
        }
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_readonly_save_never_writes() {
        let mut store = MockFileStore::new();
        store.expect_save().times(0);

        let mut entity = Entity::named("locked")
            .context(mock_context(store))
            .readonly(true)
            .autosave(true)
            .build(json!({"v": 1}))
            .unwrap();

        entity.data_mut()["v"] = json!(2);
        assert!(entity.save().is_ok());
        assert!(!entity.flush().unwrap());
        drop(entity);
    }

    #[test]
    fn test_save_writes_decodable_file() {
        let (context, store) = memory_context();
        let mut entity = Entity::named("user:42")
            .context(context.clone())
            .directory("/cache")
            .build(json!({"role": "admin"}))
            .unwrap();

        entity.save().unwrap();
        assert_eq!(store.writes(), 1);
        assert!(entity.exists());

        let file = context.read_file(entity.file_path()).unwrap();
        assert_eq!(file.header.name, "user-42");
        assert_eq!(file.header.generator, entity.generator());
        assert_eq!(file.record.data, json!({"role": "admin"}));
        assert_eq!(file.record.hash, context.codec().hash_key(&json!({"role": "admin"})));
    }

    #[test]
    fn test_save_failure_propagates_io_error() {
        let mut store = MockFileStore::new();
        store.expect_save().times(1).returning(|_, _| {
            Err(ResourceError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )))
        });

        let mut entity = Entity::named("denied")
            .context(mock_context(store))
            .build(json!(true))
            .unwrap();

        match entity.save() {
            Err(ResourceError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_autosave_on_drop_writes_once() {
        let mut store = MockFileStore::new();
        store.expect_save().times(1).returning(|_, _| Ok(()));

        let mut entity = Entity::named("counter")
            .context(mock_context(store))
            .autosave(true)
            .build(json!({"count": 1}))
            .unwrap();

        entity.data_mut()["count"] = json!(2);
        drop(entity);
    }

    #[test]
    fn test_autosave_skipped_for_equal_reassignment() {
        let mut store = MockFileStore::new();
        store.expect_save().times(0);

        let mut entity = Entity::named("counter")
            .context(mock_context(store))
            .autosave(true)
            .build(json!({"count": 1, "tags": ["a"]}))
            .unwrap();

        entity.set_data(json!({"tags": ["a"], "count": 1}));
        assert!(!entity.is_dirty().unwrap());
        drop(entity);
    }

    #[test]
    fn test_autosave_disabled_never_writes() {
        let mut store = MockFileStore::new();
        store.expect_save().times(0);

        let mut entity = Entity::named("manual")
            .context(mock_context(store))
            .build(json!(1))
            .unwrap();
        entity.set_data(json!(2));
        assert!(!entity.flush().unwrap());
    }

    #[test]
    fn test_close_flushes_and_disarms_drop() {
        let (context, store) = memory_context();
        let mut entity = Entity::named("closing")
            .context(context)
            .autosave(true)
            .build(json!([1]))
            .unwrap();

        entity.set_data(json!([1, 2]));
        entity.close().unwrap();
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_close_propagates_failure() {
        let mut store = MockFileStore::new();
        store.expect_save().times(1).returning(|_, _| {
            Err(ResourceError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        });

        let mut entity = Entity::named("full")
            .context(mock_context(store))
            .autosave(true)
            .build(json!("a"))
            .unwrap();
        entity.set_data(json!("b"));

        assert!(matches!(entity.close(), Err(ResourceError::Io(_))));
    }

    #[test]
    fn test_drop_swallows_autosave_failure() {
        let mut store = MockFileStore::new();
        store.expect_save().times(1).returning(|_, _| {
            Err(ResourceError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        });

        let mut entity = Entity::named("full")
            .context(mock_context(store))
            .autosave(true)
            .build(json!("a"))
            .unwrap();
        entity.set_data(json!("b"));
        drop(entity);
    }

    #[test]
    fn test_construction_baseline_resaves_after_explicit_save() {
        let (context, store) = memory_context();
        let mut entity = Entity::named("baseline")
            .context(context)
            .autosave(true)
            .build(json!(1))
            .unwrap();

        entity.set_data(json!(2));
        entity.save().unwrap();
        assert!(entity.is_dirty().unwrap());
        assert!(entity.flush().unwrap());
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_last_save_baseline_tracks_writes() {
        let (context, store) = memory_context();
        let mut entity = Entity::named("baseline")
            .context(context)
            .autosave(true)
            .baseline(AutosaveBaseline::LastSave)
            .build(json!(1))
            .unwrap();

        entity.set_data(json!(2));
        entity.save().unwrap();
        assert!(!entity.is_dirty().unwrap());
        assert!(!entity.flush().unwrap());

        entity.set_data(json!(1));
        assert!(entity.is_dirty().unwrap());
        drop(entity);
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_hydrate_round_trip() {
        let (context, _) = memory_context();
        let mut original = Entity::named("user:42")
            .context(context.clone())
            .directory("/cache")
            .build(json!({"role": "admin", "ids": [1, 2, 3]}))
            .unwrap();
        original.save().unwrap();

        let restored = Entity::<Value>::load(original.file_path(), &context).unwrap();
        assert_eq!(restored.name(), original.name());
        assert_eq!(restored.data(), original.data());
        assert_eq!(restored.data_hash().unwrap(), original.data_hash().unwrap());
        assert_eq!(restored.file_path(), original.file_path());
        assert!(!restored.is_readonly());
    }

    #[test]
    fn test_hydrate_rejects_tampered_record() {
        let (context, _) = memory_context();
        let entity = Entity::named("user:42")
            .context(context.clone())
            .build(json!({"role": "admin"}))
            .unwrap();

        let mut record = entity.export_record(&context.clock().now()).unwrap();
        record.data = json!({"role": "root"});

        let result = Entity::<Value>::hydrate(record, &context);
        assert!(matches!(result, Err(ResourceError::IntegrityCheckFailed { .. })));
    }

    #[test]
    fn test_hydrate_rejects_foreign_record() {
        let (context, _) = memory_context();
        let entity = Entity::named("user:42")
            .context(context.clone())
            .build(json!(null))
            .unwrap();
        let record = entity.export_record(&context.clock().now()).unwrap();

        let result = Entity::named("user:43").context(context).hydrate(record);
        match result {
            Err(ResourceError::NameMismatch { expected, found }) => {
                assert_eq!(expected, "user-43");
                assert_eq!(found, "user-42");
            }
            other => panic!("Expected name mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_load_writes_back_to_the_loaded_file() {
        let (context, store) = memory_context();
        let mut original = Entity::named("user:42")
            .context(context.clone())
            .directory("/primary")
            .build(json!({"role": "admin"}))
            .unwrap();
        original.save().unwrap();

        let moved = Path::new("/mirror/user-42.resource.json");
        let bytes = store.load(original.file_path()).unwrap();
        store.save(moved, &bytes).unwrap();

        let mut restored = Entity::<Value>::load(moved, &context).unwrap();
        assert_eq!(restored.storage_directory(), Path::new("/mirror"));
        assert_eq!(restored.file_path(), moved);

        restored.data_mut()["role"] = json!("owner");
        restored.save().unwrap();

        let mirror = context.read_file(moved).unwrap();
        assert_eq!(mirror.record.data, json!({"role": "owner"}));
        assert_eq!(mirror.record.path, "/mirror/user-42.resource.json");
        let primary = context.read_file(original.file_path()).unwrap();
        assert_eq!(primary.record.data, json!({"role": "admin"}));
    }

    #[test]
    fn test_hydrate_keeps_recorded_generator() {
        struct ImportJob;

        let (context, _) = memory_context();
        let mut written = Entity::named("import")
            .context(context.clone())
            .directory("/cache")
            .generator::<ImportJob>()
            .build(json!([1, 2]))
            .unwrap();
        written.save().unwrap();

        let mut restored = Entity::<Value>::load(written.file_path(), &context).unwrap();
        assert_eq!(restored.generator(), type_name::<ImportJob>());

        restored.set_data(json!([1, 2, 3]));
        restored.save().unwrap();
        let file = context.read_file(restored.file_path()).unwrap();
        assert_eq!(file.header.generator, type_name::<ImportJob>());
        assert_eq!(file.record.generator, type_name::<ImportJob>());
    }

    #[test]
    fn test_explicit_generator_overrides_recorded_one() {
        struct Rewriter;

        let (context, _) = memory_context();
        let entity = Entity::named("import")
            .context(context.clone())
            .build(json!(1))
            .unwrap();
        let record = entity.export_record(&context.clock().now()).unwrap();
        assert_eq!(record.generator, type_name::<Entity<Value>>());

        let hydrated = Entity::named("import")
            .context(context)
            .generator::<Rewriter>()
            .hydrate(record)
            .unwrap();
        assert_eq!(hydrated.generator(), type_name::<Rewriter>());
    }

    #[test]
    fn test_open_prefers_existing_file() {
        let (context, _) = memory_context();
        let mut first = Entity::named("settings")
            .context(context.clone())
            .directory("/cache")
            .build(json!({"theme": "dark"}))
            .unwrap();
        first.save().unwrap();

        let reopened = Entity::named("settings")
            .context(context.clone())
            .directory("/cache")
            .open(json!({"theme": "light"}))
            .unwrap();
        assert_eq!(reopened.data(), &json!({"theme": "dark"}));

        let fresh = Entity::named("other")
            .context(context)
            .directory("/cache")
            .open(json!({"theme": "light"}))
            .unwrap();
        assert_eq!(fresh.data(), &json!({"theme": "light"}));
        assert!(!fresh.exists());
    }
}
