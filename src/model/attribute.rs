//! Attribute definitions for entities.

use super::types::{AttributeKind, AttributeValue};
use rkyv::{Archive, Deserialize, Serialize};

/// An attribute definition within an entity.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name.
    pub name: String,
    /// Semantic value kind.
    pub kind: AttributeKind,
    /// Whether the attribute may be absent.
    pub optional: bool,
    /// Whether the attribute is computed in memory and never persisted.
    pub transient: bool,
    /// Default value applied when no value is provided.
    pub default: Option<AttributeValue>,
    /// Identifier used to match this attribute across schema versions
    /// during migration, when the name changed between versions.
    pub renaming_identifier: Option<String>,
    /// Extra token mixed into the version hash to force incompatibility.
    pub version_hash_modifier: Option<String>,
}

impl AttributeDef {
    /// Create a new required attribute.
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            transient: false,
            default: None,
            renaming_identifier: None,
            version_hash_modifier: None,
        }
    }

    /// Create an optional attribute.
    pub fn optional(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: true,
            transient: false,
            default: None,
            renaming_identifier: None,
            version_hash_modifier: None,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: AttributeValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the attribute as transient.
    pub fn with_transient(mut self) -> Self {
        self.transient = true;
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

    /// Check if this attribute has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The identifier used to line this attribute up with a prior version:
    /// the renaming identifier when present, the name otherwise.
    pub fn matching_identifier(&self) -> &str {
        self.renaming_identifier.as_deref().unwrap_or(&self.name)
    }
}
