//! Storage engine interface.
//!
//! The migration core treats the storage engine as an external collaborator:
//! it only needs "open store", "read/write metadata", and "apply mapping".
//! [`SledEngine`] is the bundled implementation backed by sled.

pub mod sled_engine;

pub use sled_engine::SledEngine;

use crate::error::Error;
use crate::migration::mapping::MappingModel;
use crate::model::{AttributeValue, EntityHash, VersionLock};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The physical location of a persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation(PathBuf);

impl StoreLocation {
    /// Create a location from a filesystem path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The underlying path.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// A sibling scratch location for migrating into the given version.
    ///
    /// Scratch stores live next to the original so the final swap is a
    /// same-filesystem rename.
    pub fn scratch_for(&self, version: &str) -> StoreLocation {
        let mut name = self
            .0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        name.push_str(".migrate-");
        name.push_str(version);
        StoreLocation(self.0.with_file_name(name))
    }

    /// A sibling backout location used during the atomic swap.
    pub fn backout(&self) -> StoreLocation {
        let mut name = self
            .0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        name.push_str(".old");
        StoreLocation(self.0.with_file_name(name))
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for StoreLocation {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

/// The small persisted record, separate from bulk data, describing which
/// schema version a store was created or last migrated to.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Logical model name.
    pub model_name: String,
    /// Schema version name the store is at.
    pub model_version: String,
    /// Entity version hashes by name (the VersionLock payload).
    pub version_hashes: HashMap<String, EntityHash>,
    /// Store type tag (engine-specific, e.g. "sled").
    pub store_type: String,
    /// Configuration name the store was opened under.
    pub configuration: String,
}

impl StoreMetadata {
    /// Create metadata stamping a store at the given version.
    pub fn new(
        model_name: impl Into<String>,
        model_version: impl Into<String>,
        lock: VersionLock,
        store_type: impl Into<String>,
        configuration: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: model_version.into(),
            version_hashes: lock.into_hashes().into_iter().collect(),
            store_type: store_type.into(),
            configuration: configuration.into(),
        }
    }

    /// The version lock persisted in this metadata.
    pub fn lock(&self) -> VersionLock {
        VersionLock::from_hashes(self.version_hashes.clone().into_iter().collect())
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// One persisted object: an id plus its attribute values.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier.
    pub id: [u8; 16],
    /// Attribute values by name.
    pub values: HashMap<String, AttributeValue>,
}

impl Record {
    /// Create a record.
    pub fn new(id: [u8; 16]) -> Self {
        Self {
            id,
            values: HashMap::new(),
        }
    }

    /// Set an attribute value.
    pub fn with_value(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Get an attribute value by name.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// An opened store registered with a [`crate::stack::DataStack`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    /// Physical location.
    pub location: StoreLocation,
    /// Metadata read at open time.
    pub metadata: StoreMetadata,
}

/// The storage-engine collaborator the migration core drives.
///
/// Implementations must tolerate being called on closed stores; every
/// operation opens what it needs and releases it before returning, so the
/// coordinator can rename store directories between calls.
pub trait StorageEngine: Send + Sync {
    /// Check whether a store exists at the location.
    fn exists(&self, location: &StoreLocation) -> bool;

    /// Create an empty store stamped with the given metadata.
    fn create_store(&self, location: &StoreLocation, metadata: &StoreMetadata)
        -> Result<(), Error>;

    /// Open an existing store and read its metadata.
    fn open_store(&self, location: &StoreLocation) -> Result<StoreHandle, Error>;

    /// Read a store's metadata dictionary.
    fn read_metadata(&self, location: &StoreLocation) -> Result<StoreMetadata, Error>;

    /// Replace a store's metadata dictionary.
    fn write_metadata(&self, location: &StoreLocation, metadata: &StoreMetadata)
        -> Result<(), Error>;

    /// Copy `source` into a new store at `destination`, transforming every
    /// record through the mapping model. The destination must not exist.
    fn apply_mapping(
        &self,
        model: &MappingModel,
        source: &StoreLocation,
        destination: &StoreLocation,
    ) -> Result<(), Error>;

    /// Atomically replace `target` with `scratch`. On failure the target is
    /// left as it was.
    fn swap_store(&self, scratch: &StoreLocation, target: &StoreLocation) -> Result<(), Error>;

    /// Delete a store if it exists.
    fn delete_store(&self, location: &StoreLocation) -> Result<(), Error>;

    /// Write records into a store, for seeding and tests.
    fn put_records(
        &self,
        location: &StoreLocation,
        entity: &str,
        records: &[Record],
    ) -> Result<(), Error>;

    /// Read all records of an entity from a store.
    fn fetch_records(&self, location: &StoreLocation, entity: &str) -> Result<Vec<Record>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeDef, AttributeKind, EntityDef};

    #[test]
    fn test_scratch_location_is_sibling() {
        let location = StoreLocation::new("/data/stores/main");
        let scratch = location.scratch_for("v2");
        assert_eq!(
            scratch.path(),
            Path::new("/data/stores/main.migrate-v2")
        );
        assert_eq!(location.backout().path(), Path::new("/data/stores/main.old"));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let entities = vec![EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::String))];
        let lock = VersionLock::compute(&entities);

        let meta = StoreMetadata::new("blog", "v1", lock.clone(), "sled", "default");
        let bytes = meta.to_bytes().unwrap();
        let restored = StoreMetadata::from_bytes(&bytes).unwrap();

        assert_eq!(restored.model_version, "v1");
        assert_eq!(restored.lock(), lock);
    }

    #[test]
    fn test_record_roundtrip() {
        let record = Record::new([7u8; 16])
            .with_value("name", AttributeValue::String("Ada".into()))
            .with_value("age", AttributeValue::Int32(36));

        let bytes = record.to_bytes().unwrap();
        let restored = Record::from_bytes(&bytes).unwrap();

        assert_eq!(restored.id, [7u8; 16]);
        assert_eq!(restored.get("age"), Some(&AttributeValue::Int32(36)));
    }
}
