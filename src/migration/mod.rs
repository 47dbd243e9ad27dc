//! Schema migration engine.
//!
//! Opening a store whose on-disk schema version differs from the in-memory
//! model triggers a progressive migration:
//!
//! 1. The store's current version is identified from its persisted entity
//!    version hashes ([`crate::model::SchemaHistory::identify_version`]).
//! 2. [`MigrationChain::path`] computes the exact, non-skippable hop list to
//!    the target version.
//! 3. The [`Migrator`] applies each hop's [`MappingProvider`] against a
//!    scratch copy, stamping intermediate metadata, and atomically swaps the
//!    final scratch in as the store of record.
//!
//! Every failure mid-hop leaves the original store untouched; a cooperative
//! cancellation between hops commits the last completed intermediate version
//! so migration can resume later.

pub mod chain;
pub mod coordinator;
pub mod error;
pub mod mapping;
pub mod progress;

pub use chain::MigrationChain;
pub use coordinator::{MigrationReport, Migrator};
pub use error::MigrationError;
pub use mapping::{
    AttributeTransform, ChainedMappings, ComputeFn, CustomMapping, EntityMapping,
    InferredMapping, MappingModel, MappingProvider, MappingStage, ModelResolver,
};
pub use progress::{MigrationPhase, MigrationProgress, ProgressObserver};
