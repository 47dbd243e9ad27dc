//! Sled-backed storage engine.
//!
//! Each physical store is one sled database directory: records live in
//! per-entity trees and the metadata dictionary under a reserved tree. Every
//! operation opens the database it needs and releases it before returning,
//! which keeps store directories renameable between calls.

use super::{Record, StorageEngine, StoreHandle, StoreLocation, StoreMetadata};
use crate::error::Error;
use crate::migration::mapping::MappingModel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Tree name for the store metadata dictionary.
const META_TREE: &str = "store:meta";

/// Key for the metadata record within the meta tree.
const META_KEY: &[u8] = b"metadata";

/// Prefix for per-entity record trees.
const RECORDS_PREFIX: &str = "records:";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The bundled sled implementation of [`StorageEngine`].
#[derive(Debug, Default)]
pub struct SledEngine;

impl SledEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Generate a unique record id.
    pub fn generate_id() -> [u8; 16] {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&nanos.to_be_bytes());
        id[8..].copy_from_slice(&count.to_be_bytes());
        id
    }

    fn open_db(&self, location: &StoreLocation) -> Result<sled::Db, Error> {
        Ok(sled::open(location.path())?)
    }

    fn records_tree_name(entity: &str) -> String {
        format!("{RECORDS_PREFIX}{entity}")
    }

    fn read_metadata_from(db: &sled::Db, location: &StoreLocation) -> Result<StoreMetadata, Error> {
        let tree = db.open_tree(META_TREE)?;
        match tree.get(META_KEY)? {
            Some(bytes) => StoreMetadata::from_bytes(&bytes),
            None => Err(Error::MetadataMissing {
                location: location.to_string(),
            }),
        }
    }

    fn write_metadata_to(db: &sled::Db, metadata: &StoreMetadata) -> Result<(), Error> {
        let tree = db.open_tree(META_TREE)?;
        tree.insert(META_KEY, metadata.to_bytes()?)?;
        tree.flush()?;
        Ok(())
    }

    /// Load every entity's records from an open database.
    fn load_all_records(db: &sled::Db) -> Result<HashMap<String, Vec<Record>>, Error> {
        let mut all = HashMap::new();
        for name in db.tree_names() {
            let name = String::from_utf8_lossy(&name).into_owned();
            let Some(entity) = name.strip_prefix(RECORDS_PREFIX) else {
                continue;
            };
            let tree = db.open_tree(name.as_bytes())?;
            let mut records = Vec::new();
            for item in tree.iter() {
                let (_, value) = item?;
                records.push(Record::from_bytes(&value)?);
            }
            all.insert(entity.to_string(), records);
        }
        Ok(all)
    }
}

impl StorageEngine for SledEngine {
    fn exists(&self, location: &StoreLocation) -> bool {
        location.path().exists()
    }

    fn create_store(
        &self,
        location: &StoreLocation,
        metadata: &StoreMetadata,
    ) -> Result<(), Error> {
        let db = self.open_db(location)?;
        Self::write_metadata_to(&db, metadata)?;
        db.flush()?;
        debug!(store = %location, version = %metadata.model_version, "store created");
        Ok(())
    }

    fn open_store(&self, location: &StoreLocation) -> Result<StoreHandle, Error> {
        if !self.exists(location) {
            return Err(Error::StoreNotFound {
                location: location.to_string(),
            });
        }
        let db = self.open_db(location)?;
        let metadata = Self::read_metadata_from(&db, location)?;
        Ok(StoreHandle {
            location: location.clone(),
            metadata,
        })
    }

    fn read_metadata(&self, location: &StoreLocation) -> Result<StoreMetadata, Error> {
        if !self.exists(location) {
            return Err(Error::StoreNotFound {
                location: location.to_string(),
            });
        }
        let db = self.open_db(location)?;
        Self::read_metadata_from(&db, location)
    }

    fn write_metadata(
        &self,
        location: &StoreLocation,
        metadata: &StoreMetadata,
    ) -> Result<(), Error> {
        let db = self.open_db(location)?;
        Self::write_metadata_to(&db, metadata)
    }

    fn apply_mapping(
        &self,
        model: &MappingModel,
        source: &StoreLocation,
        destination: &StoreLocation,
    ) -> Result<(), Error> {
        if self.exists(destination) {
            return Err(Error::InvalidData(format!(
                "mapping destination already exists: {destination}"
            )));
        }

        let mut records = {
            let db = self.open_db(source)?;
            Self::load_all_records(&db)?
        };

        for stage in &model.stages {
            let mut output: HashMap<String, Vec<Record>> = HashMap::new();
            for mapping in &stage.mappings {
                match (
                    mapping.source_entity.as_deref(),
                    mapping.destination_entity.as_deref(),
                ) {
                    (Some(src), Some(dest)) => {
                        let inputs = records.get(src).cloned().unwrap_or_default();
                        let out = output.entry(dest.to_string()).or_default();
                        for record in &inputs {
                            let migrated = mapping
                                .apply(record)
                                .map_err(|e| Error::InvalidData(e.to_string()))?;
                            out.push(migrated);
                        }
                    }
                    (None, Some(dest)) => {
                        output.entry(dest.to_string()).or_default();
                    }
                    // Dropped entities simply do not reach the output.
                    (Some(_), None) | (None, None) => {}
                }
            }
            records = output;
        }

        let db = self.open_db(destination)?;
        for (entity, entity_records) in &records {
            let tree = db.open_tree(Self::records_tree_name(entity).as_bytes())?;
            for record in entity_records {
                tree.insert(record.id, record.to_bytes()?)?;
            }
        }
        db.flush()?;
        debug!(
            from = %source,
            to = %destination,
            stages = model.stages.len(),
            "mapping applied"
        );
        Ok(())
    }

    fn swap_store(&self, scratch: &StoreLocation, target: &StoreLocation) -> Result<(), Error> {
        let backout = target.backout();
        if backout.path().exists() {
            std::fs::remove_dir_all(backout.path())?;
        }

        let had_target = target.path().exists();
        if had_target {
            std::fs::rename(target.path(), backout.path())?;
        }

        if let Err(e) = std::fs::rename(scratch.path(), target.path()) {
            if had_target {
                // Restore the original before surfacing the failure.
                let _ = std::fs::rename(backout.path(), target.path());
            }
            return Err(e.into());
        }

        if had_target {
            std::fs::remove_dir_all(backout.path())?;
        }
        debug!(scratch = %scratch, target = %target, "store swapped");
        Ok(())
    }

    fn delete_store(&self, location: &StoreLocation) -> Result<(), Error> {
        if location.path().exists() {
            std::fs::remove_dir_all(location.path())?;
        }
        Ok(())
    }

    fn put_records(
        &self,
        location: &StoreLocation,
        entity: &str,
        records: &[Record],
    ) -> Result<(), Error> {
        let db = self.open_db(location)?;
        let tree = db.open_tree(Self::records_tree_name(entity).as_bytes())?;
        for record in records {
            tree.insert(record.id, record.to_bytes()?)?;
        }
        tree.flush()?;
        Ok(())
    }

    fn fetch_records(&self, location: &StoreLocation, entity: &str) -> Result<Vec<Record>, Error> {
        let db = self.open_db(location)?;
        let tree = db.open_tree(Self::records_tree_name(entity).as_bytes())?;
        let mut records = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            records.push(Record::from_bytes(&value)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::mapping::{InferredMapping, MappingProvider};
    use crate::model::{
        AttributeDef, AttributeKind, AttributeValue, EntityDef, ModelVersion, VersionLock,
    };

    fn v1() -> ModelVersion {
        ModelVersion::new(
            "v1",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("name", AttributeKind::String))
                .with_attribute(AttributeDef::new("age", AttributeKind::Int32))],
        )
    }

    fn v2() -> ModelVersion {
        ModelVersion::new(
            "v2",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("name", AttributeKind::String))
                .with_attribute(AttributeDef::new("age", AttributeKind::Int64))
                .with_attribute(AttributeDef::optional("email", AttributeKind::String))],
        )
    }

    fn metadata_for(model: &ModelVersion) -> StoreMetadata {
        StoreMetadata::new("test", model.version.as_str(), model.lock(), "sled", "default")
    }

    fn seeded_store(dir: &std::path::Path) -> StoreLocation {
        let engine = SledEngine::new();
        let location = StoreLocation::new(dir.join("main"));
        engine.create_store(&location, &metadata_for(&v1())).unwrap();
        engine
            .put_records(
                &location,
                "User",
                &[
                    Record::new([1u8; 16])
                        .with_value("name", AttributeValue::String("Ada".into()))
                        .with_value("age", AttributeValue::Int32(36)),
                    Record::new([2u8; 16])
                        .with_value("name", AttributeValue::String("Grace".into()))
                        .with_value("age", AttributeValue::Int32(45)),
                ],
            )
            .unwrap();
        location
    }

    #[test]
    fn test_create_and_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        let handle = engine.open_store(&location).unwrap();
        assert_eq!(handle.metadata.model_version, "v1");

        let records = engine.fetch_records(&location, "User").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_open_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = StoreLocation::new(dir.path().join("missing"));

        assert!(matches!(
            engine.open_store(&location),
            Err(Error::StoreNotFound { .. })
        ));
    }

    #[test]
    fn test_metadata_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        engine.write_metadata(&location, &metadata_for(&v2())).unwrap();
        let read = engine.read_metadata(&location).unwrap();
        assert_eq!(read.model_version, "v2");
        assert_eq!(read.lock(), v2().lock());
    }

    #[test]
    fn test_apply_mapping_transforms_records() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        let models = [v1(), v2()];
        let model = InferredMapping::new("v1", "v2")
            .produce_mapping(&models)
            .unwrap();

        let scratch = location.scratch_for("v2");
        engine.apply_mapping(&model, &location, &scratch).unwrap();

        let migrated = engine.fetch_records(&scratch, "User").unwrap();
        assert_eq!(migrated.len(), 2);
        for record in &migrated {
            assert!(matches!(record.get("age"), Some(AttributeValue::Int64(_))));
            assert_eq!(record.get("email"), Some(&AttributeValue::Null));
        }

        // Source untouched.
        let original = engine.fetch_records(&location, "User").unwrap();
        assert!(matches!(
            original[0].get("age"),
            Some(AttributeValue::Int32(_))
        ));
    }

    #[test]
    fn test_apply_mapping_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        let models = [v1(), v2()];
        let model = InferredMapping::new("v1", "v2")
            .produce_mapping(&models)
            .unwrap();

        let result = engine.apply_mapping(&model, &location, &location);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_swap_store_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        let scratch = StoreLocation::new(dir.path().join("scratch"));
        engine.create_store(&scratch, &metadata_for(&v2())).unwrap();

        engine.swap_store(&scratch, &location).unwrap();

        let metadata = engine.read_metadata(&location).unwrap();
        assert_eq!(metadata.model_version, "v2");
        assert!(!scratch.path().exists());
        assert!(!location.backout().path().exists());
    }

    #[test]
    fn test_delete_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        engine.delete_store(&location).unwrap();
        assert!(!engine.exists(&location));
        engine.delete_store(&location).unwrap();
    }

    #[test]
    fn test_generate_id_unique() {
        let a = SledEngine::generate_id();
        let b = SledEngine::generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_lock_survives_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SledEngine::new();
        let location = seeded_store(dir.path());

        let read = engine.read_metadata(&location).unwrap();
        let expected = VersionLock::compute(&v1().entities);
        assert_eq!(read.lock(), expected);
    }
}
