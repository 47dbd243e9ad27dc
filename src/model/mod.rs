//! Schema model: entities, attributes, relationships, versions, and locks.

pub mod attribute;
pub mod entity;
pub mod history;
pub mod lock;
pub mod relationship;
pub mod types;
pub mod version;

pub use attribute::AttributeDef;
pub use entity::EntityDef;
pub use history::SchemaHistory;
pub use lock::{EntityHash, VersionLock};
pub use relationship::RelationshipDef;
pub use types::{AttributeKind, AttributeValue, DeleteRule};
pub use version::{ModelVersion, SchemaVersion};
