//! StratumDB - Versioned schema models and progressive store migration.
//!
//! This crate models an application's persistence schema as an explicit
//! series of versions, fingerprints each version with per-entity hashes,
//! and migrates on-disk stores hop by hop along a declared migration chain.

pub mod error;
pub mod migration;
pub mod model;
pub mod stack;
pub mod storage;

pub use error::Error;
pub use migration::{
    AttributeTransform, ChainedMappings, CustomMapping, EntityMapping, InferredMapping,
    MappingModel, MappingProvider, MigrationChain, MigrationError, MigrationPhase,
    MigrationProgress, MigrationReport, Migrator,
};
pub use model::{
    AttributeDef, AttributeKind, AttributeValue, DeleteRule, EntityDef, ModelVersion,
    RelationshipDef, SchemaHistory, SchemaVersion, VersionLock,
};
pub use stack::{DataStack, DataStackConfig, StoreDescriptor};
pub use storage::{Record, SledEngine, StorageEngine, StoreHandle, StoreLocation, StoreMetadata};
