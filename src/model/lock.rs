//! Version locks: order-independent content hashes of an entity set's shape.

use super::entity::EntityDef;
use std::collections::BTreeMap;

/// A content hash of one entity's full shape.
pub type EntityHash = [u8; 32];

/// A mapping from entity name to a hash of that entity's attribute and
/// relationship shape.
///
/// Two locks are equal iff they cover the same entity names with identical
/// hashes; the order entities were declared or enumerated in never matters.
/// Used to stamp a newly created store's metadata and to verify an opened
/// store matches the in-memory model before skipping migration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionLock {
    hashes: BTreeMap<String, EntityHash>,
}

impl VersionLock {
    /// Compute the lock for an entity set.
    ///
    /// Pure: attributes and relationships are hashed in name-sorted order,
    /// so the result is independent of declaration order.
    pub fn compute(entities: &[EntityDef]) -> Self {
        let mut hashes = BTreeMap::new();
        for entity in entities {
            hashes.insert(entity.name.clone(), hash_entity(entity));
        }
        Self { hashes }
    }

    /// Build a lock from an already-persisted hash map (store metadata).
    pub fn from_hashes(hashes: BTreeMap<String, EntityHash>) -> Self {
        Self { hashes }
    }

    /// The hash for a single entity, if present.
    pub fn hash_for(&self, entity: &str) -> Option<&EntityHash> {
        self.hashes.get(entity)
    }

    /// Entity names covered by this lock.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(|s| s.as_str())
    }

    /// Number of entities covered.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Check if the lock covers no entities.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// The underlying name-to-hash map, for persisting into store metadata.
    pub fn hashes(&self) -> &BTreeMap<String, EntityHash> {
        &self.hashes
    }

    /// Consume the lock into its hash map.
    pub fn into_hashes(self) -> BTreeMap<String, EntityHash> {
        self.hashes
    }
}

impl std::fmt::Display for VersionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, hash) in &self.hashes {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={}", &hex::encode(hash)[..8])?;
        }
        Ok(())
    }
}

/// Hash one entity's shape.
fn hash_entity(entity: &EntityDef) -> EntityHash {
    let mut hasher = blake3::Hasher::new();

    update_str(&mut hasher, &entity.name);
    hasher.update(&[entity.is_abstract as u8]);
    update_opt_str(&mut hasher, entity.super_entity.as_deref());
    update_opt_str(&mut hasher, entity.version_hash_modifier.as_deref());

    let mut attributes: Vec<_> = entity.attributes.iter().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    hasher.update(&(attributes.len() as u64).to_le_bytes());
    for attr in attributes {
        update_str(&mut hasher, &attr.name);
        hasher.update(&[attr.kind.tag(), attr.optional as u8, attr.transient as u8]);
        hasher.update(&[attr.default.is_some() as u8]);
        update_opt_str(&mut hasher, attr.version_hash_modifier.as_deref());
    }

    let mut relationships: Vec<_> = entity.relationships.iter().collect();
    relationships.sort_by(|a, b| a.name.cmp(&b.name));
    hasher.update(&(relationships.len() as u64).to_le_bytes());
    for rel in relationships {
        update_str(&mut hasher, &rel.name);
        update_str(&mut hasher, &rel.destination);
        hasher.update(&[rel.to_many as u8, rel.ordered as u8, rel.delete_rule.tag()]);
        hasher.update(&rel.min_count.to_le_bytes());
        hasher.update(&rel.max_count.to_le_bytes());
        update_opt_str(&mut hasher, rel.version_hash_modifier.as_deref());
    }

    *hasher.finalize().as_bytes()
}

// Length-prefixed so adjacent fields can never alias each other.
fn update_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn update_opt_str(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(s) => {
            hasher.update(&[1]);
            update_str(hasher, s);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::AttributeDef;
    use crate::model::relationship::RelationshipDef;
    use crate::model::types::{AttributeKind, AttributeValue, DeleteRule};

    fn user_entity() -> EntityDef {
        EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::String))
            .with_attribute(AttributeDef::optional("age", AttributeKind::Int32))
            .with_relationship(
                RelationshipDef::to_many("posts", "Post").with_delete_rule(DeleteRule::Cascade),
            )
    }

    fn post_entity() -> EntityDef {
        EntityDef::new("Post")
            .with_attribute(AttributeDef::new("title", AttributeKind::String))
            .with_relationship(RelationshipDef::to_one("author", "User"))
    }

    #[test]
    fn test_lock_reflexive_and_symmetric() {
        let a = VersionLock::compute(&[user_entity(), post_entity()]);
        let b = VersionLock::compute(&[user_entity(), post_entity()]);

        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn test_lock_independent_of_declaration_order() {
        let forward = VersionLock::compute(&[user_entity(), post_entity()]);
        let reversed = VersionLock::compute(&[post_entity(), user_entity()]);
        assert_eq!(forward, reversed);

        // Shuffled attribute declaration order within an entity.
        let shuffled = EntityDef::new("User")
            .with_attribute(AttributeDef::optional("age", AttributeKind::Int32))
            .with_attribute(AttributeDef::new("name", AttributeKind::String))
            .with_relationship(
                RelationshipDef::to_many("posts", "Post").with_delete_rule(DeleteRule::Cascade),
            );
        let c = VersionLock::compute(&[shuffled, post_entity()]);
        assert_eq!(forward, c);
    }

    #[test]
    fn test_lock_changes_with_shape() {
        let base = VersionLock::compute(&[user_entity()]);

        let renamed = EntityDef::new("User")
            .with_attribute(AttributeDef::new("full_name", AttributeKind::String))
            .with_attribute(AttributeDef::optional("age", AttributeKind::Int32))
            .with_relationship(
                RelationshipDef::to_many("posts", "Post").with_delete_rule(DeleteRule::Cascade),
            );
        assert_ne!(base, VersionLock::compute(&[renamed]));

        let retyped = EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::Binary))
            .with_attribute(AttributeDef::optional("age", AttributeKind::Int32))
            .with_relationship(
                RelationshipDef::to_many("posts", "Post").with_delete_rule(DeleteRule::Cascade),
            );
        assert_ne!(base, VersionLock::compute(&[retyped]));
    }

    #[test]
    fn test_hash_modifier_forces_incompatibility() {
        let plain = EntityDef::new("User")
            .with_attribute(AttributeDef::new("name", AttributeKind::String));
        let modified = EntityDef::new("User").with_attribute(
            AttributeDef::new("name", AttributeKind::String).with_version_hash_modifier("v2"),
        );

        assert_ne!(
            VersionLock::compute(&[plain]),
            VersionLock::compute(&[modified])
        );
    }

    #[test]
    fn test_default_presence_affects_hash_but_not_value() {
        let with_default = EntityDef::new("User").with_attribute(
            AttributeDef::new("name", AttributeKind::String)
                .with_default(AttributeValue::String("a".into())),
        );
        let other_default = EntityDef::new("User").with_attribute(
            AttributeDef::new("name", AttributeKind::String)
                .with_default(AttributeValue::String("b".into())),
        );
        let no_default =
            EntityDef::new("User").with_attribute(AttributeDef::new("name", AttributeKind::String));

        // Only the presence of a default participates in the hash.
        assert_eq!(
            VersionLock::compute(&[with_default.clone()]),
            VersionLock::compute(&[other_default])
        );
        assert_ne!(
            VersionLock::compute(&[with_default]),
            VersionLock::compute(&[no_default])
        );
    }

    #[test]
    fn test_roundtrip_through_hash_map() {
        let lock = VersionLock::compute(&[user_entity(), post_entity()]);
        let restored = VersionLock::from_hashes(lock.hashes().clone());
        assert_eq!(lock, restored);
        assert_eq!(restored.len(), 2);
    }
}
