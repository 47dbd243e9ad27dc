//! Entity definitions.

use super::attribute::AttributeDef;
use super::relationship::RelationshipDef;
use rkyv::{Archive, Deserialize, Serialize};

/// An entity definition: one named shape in a schema version.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within a schema version).
    pub name: String,
    /// Attribute definitions.
    pub attributes: Vec<AttributeDef>,
    /// Relationship definitions.
    pub relationships: Vec<RelationshipDef>,
    /// Whether the entity is abstract (never instantiated directly).
    pub is_abstract: bool,
    /// Superentity name (weak reference, resolved by lookup).
    pub super_entity: Option<String>,
    /// Extra token mixed into the version hash to force incompatibility.
    pub version_hash_modifier: Option<String>,
    /// Identifier used to match this entity across schema versions.
    pub renaming_identifier: Option<String>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            is_abstract: false,
            super_entity: None,
            version_hash_modifier: None,
            renaming_identifier: None,
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = AttributeDef>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Mark the entity as abstract.
    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set the superentity by name.
    pub fn with_super_entity(mut self, name: impl Into<String>) -> Self {
        self.super_entity = Some(name.into());
        self
    }

    /// Set the version hash modifier.
    pub fn with_version_hash_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.version_hash_modifier = Some(modifier.into());
        self
    }

    /// Set the renaming identifier.
    pub fn with_renaming_identifier(mut self, id: impl Into<String>) -> Self {
        self.renaming_identifier = Some(id.into());
        self
    }

    /// Get an attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Get a relationship by name.
    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Attributes that are persisted (non-transient).
    pub fn persistent_attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter().filter(|a| !a.transient)
    }

    /// The identifier used to line this entity up with a prior version.
    pub fn matching_identifier(&self) -> &str {
        self.renaming_identifier.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::AttributeKind;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::String))
            .with_attribute(
                AttributeDef::optional("bio", AttributeKind::String).with_transient(),
            )
            .with_relationship(RelationshipDef::to_many("posts", "Post"))
            .with_super_entity("Person");

        assert_eq!(entity.name, "User");
        assert_eq!(entity.attributes.len(), 2);
        assert_eq!(entity.relationships.len(), 1);
        assert_eq!(entity.super_entity.as_deref(), Some("Person"));
        assert_eq!(entity.persistent_attributes().count(), 1);
    }

    #[test]
    fn test_lookup() {
        let entity = EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::String))
            .with_relationship(RelationshipDef::to_one("profile", "Profile"));

        assert!(entity.get_attribute("name").is_some());
        assert!(entity.get_attribute("missing").is_none());
        assert!(entity.get_relationship("profile").is_some());
    }
}
