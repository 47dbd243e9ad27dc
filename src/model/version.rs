//! Schema version names and versioned model snapshots.

use super::entity::EntityDef;
use super::lock::VersionLock;

/// An opaque identifier naming one point-in-time shape of the model.
///
/// Immutable once defined; ordered so version sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// Create a version name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The version name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaVersion {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for SchemaVersion {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A complete, immutable snapshot of the entity set at one schema version.
///
/// Built explicitly at configuration time; no runtime reflection is involved
/// beyond the documented by-name weak references between entities.
#[derive(Debug, Clone)]
pub struct ModelVersion {
    /// The version this snapshot belongs to.
    pub version: SchemaVersion,
    /// Entity definitions.
    pub entities: Vec<EntityDef>,
}

impl ModelVersion {
    /// Create a model version from its entity set.
    pub fn new(version: impl Into<SchemaVersion>, entities: Vec<EntityDef>) -> Self {
        Self {
            version: version.into(),
            entities,
        }
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Compute the version lock for this snapshot.
    pub fn lock(&self) -> VersionLock {
        VersionLock::compute(&self.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::AttributeDef;
    use crate::model::types::AttributeKind;

    #[test]
    fn test_version_ordering() {
        let a = SchemaVersion::new("v1");
        let b = SchemaVersion::new("v2");
        assert!(a < b);
        assert_eq!(a.to_string(), "v1");
    }

    #[test]
    fn test_model_version_lookup() {
        let model = ModelVersion::new(
            "v1",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("name", AttributeKind::String))],
        );

        assert!(model.get_entity("User").is_some());
        assert!(model.get_entity("Post").is_none());
        assert_eq!(model.entity_names(), vec!["User"]);
    }
}
