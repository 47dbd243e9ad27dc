//! Relationship definitions between entities.

use super::types::DeleteRule;
use rkyv::{Archive, Deserialize, Serialize};

/// A relationship definition on an entity.
///
/// The destination entity is referenced by name and resolved lazily, never by
/// owning pointer, so entity definitions stay independent of each other.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship name (unique within the owning entity).
    pub name: String,
    /// Destination entity name (weak reference).
    pub destination: String,
    /// Whether the relationship points at many objects.
    pub to_many: bool,
    /// Whether a to-many relationship preserves insertion order.
    pub ordered: bool,
    /// Minimum object count (0 = unbounded).
    pub min_count: u32,
    /// Maximum object count (0 = unbounded).
    pub max_count: u32,
    /// Behavior applied to the destination when the owner is deleted.
    pub delete_rule: DeleteRule,
    /// Inverse relationship as (entity name, relationship name).
    ///
    /// Declared on exactly one side of the pair to avoid duplicate
    /// declarations of the same bidirectional link.
    pub inverse: Option<(String, String)>,
    /// Identifier used to match this relationship across schema versions.
    pub renaming_identifier: Option<String>,
    /// Extra token mixed into the version hash to force incompatibility.
    pub version_hash_modifier: Option<String>,
}

impl RelationshipDef {
    /// Create a to-one relationship.
    pub fn to_one(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            to_many: false,
            ordered: false,
            min_count: 0,
            max_count: 1,
            delete_rule: DeleteRule::Nullify,
            inverse: None,
            renaming_identifier: None,
            version_hash_modifier: None,
        }
    }

    /// Create a to-many relationship.
    pub fn to_many(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            to_many: true,
            ordered: false,
            min_count: 0,
            max_count: 0,
            delete_rule: DeleteRule::Nullify,
            inverse: None,
            renaming_identifier: None,
            version_hash_modifier: None,
        }
    }

    /// Preserve insertion order on a to-many relationship.
    pub fn with_ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Set the count bounds (0 = unbounded).
    pub fn with_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_count = min;
        self.max_count = max;
        self
    }

    /// Set the delete rule.
    pub fn with_delete_rule(mut self, rule: DeleteRule) -> Self {
        self.delete_rule = rule;
        self
    }

    /// Pair this relationship with its inverse on the destination entity.
    pub fn with_inverse(
        mut self,
        entity: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        self.inverse = Some((entity.into(), relationship.into()));
        self
    }

    /// Set the renaming identifier.
    pub fn with_renaming_identifier(mut self, id: impl Into<String>) -> Self {
        self.renaming_identifier = Some(id.into());
        self
    }

    /// Set the version hash modifier.
    pub fn with_version_hash_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.version_hash_modifier = Some(modifier.into());
        self
    }

    /// The identifier used to line this relationship up with a prior version.
    pub fn matching_identifier(&self) -> &str {
        self.renaming_identifier.as_deref().unwrap_or(&self.name)
    }
}
