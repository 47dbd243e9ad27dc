//! Core error types.

use thiserror::Error;

/// Core storage and serialization errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A store has no metadata record.
    #[error("store metadata missing at {location}")]
    MetadataMissing {
        /// The store location that was inspected.
        location: String,
    },

    /// No store exists at the given location.
    #[error("no store at {location}")]
    StoreNotFound {
        /// The missing store location.
        location: String,
    },

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
