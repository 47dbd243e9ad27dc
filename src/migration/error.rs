//! Migration-specific error types.

use crate::model::AttributeKind;
use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Store metadata matched zero or more than one known version.
    /// Unrecoverable without user intervention.
    #[error("cannot determine store version for model {model}: metadata matched {matched} known versions")]
    AmbiguousVersion {
        /// The logical model name.
        model: String,
        /// How many versions matched.
        matched: usize,
    },

    /// A named version's declaration is missing from the model set.
    #[error("model version not found: {name}")]
    ModelNotFound {
        /// The missing version name.
        name: String,
    },

    /// The migration chain has no route between two versions.
    #[error("no migration path from {from} to {to}")]
    NoPathFound {
        /// The detected store version.
        from: String,
        /// The requested target version.
        to: String,
    },

    /// Automatic mapping inference could not resolve a shape difference.
    /// Requires an explicit custom mapping.
    #[error("cannot infer mapping for {entity}.{attribute}: {reason}")]
    CannotInferMapping {
        /// The destination entity.
        entity: String,
        /// The destination attribute.
        attribute: String,
        /// Why inference failed.
        reason: String,
    },

    /// Incompatible attribute kinds encountered during inference.
    #[error("incompatible kinds for {entity}.{attribute}: {from_kind} does not convert to {to_kind}")]
    IncompatibleKinds {
        /// The destination entity.
        entity: String,
        /// The destination attribute.
        attribute: String,
        /// Source kind.
        from_kind: AttributeKind,
        /// Destination kind.
        to_kind: AttributeKind,
    },

    /// Malformed chained-mapping construction: a provider's destination does
    /// not equal the next provider's source. Fails fast at construction.
    #[error("mapping chain mismatch: step {index} ends at {found}, next step starts at {expected}")]
    MappingChainMismatch {
        /// Index of the offending step.
        index: usize,
        /// The version the step produces.
        found: String,
        /// The version the next step consumes.
        expected: String,
    },

    /// Migration chain validation failed (cycle, reconvergence, unknown
    /// version, or a malformed history declaration).
    #[error("invalid migration chain: {reason}")]
    InvalidChain {
        /// Description of the violation.
        reason: String,
    },

    /// An add-store target collides with an incompatible existing store.
    #[error("a different store already exists at {location}: {reason}")]
    DifferentStoreExists {
        /// The colliding location.
        location: String,
        /// What differed.
        reason: String,
    },

    /// Cooperative cancellation between hops. The store is left at the last
    /// fully completed intermediate version; re-running resumes from there.
    #[error("migration cancelled at version {at_version}")]
    Cancelled {
        /// The version the store was left at.
        at_version: String,
    },

    /// A mapping transform failed against a concrete record.
    #[error("transform failed for {entity}.{attribute} on record {record_id}: {reason}")]
    TransformFailed {
        /// The destination entity.
        entity: String,
        /// The destination attribute.
        attribute: String,
        /// Hex id of the offending record.
        record_id: String,
        /// Why the transform failed.
        reason: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}
