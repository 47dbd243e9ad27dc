//! Mapping providers: descriptions of how to transform one schema version's
//! data into the next.
//!
//! Three variants cover the spectrum: [`InferredMapping`] derives the
//! correspondence automatically, [`CustomMapping`] declares it explicitly,
//! and [`ChainedMappings`] composes providers end-to-end. All of them
//! produce a [`MappingModel`], the opaque artifact the storage engine
//! consumes one hop at a time.

use super::error::MigrationError;
use crate::model::{
    AttributeKind, AttributeValue, EntityDef, ModelVersion, SchemaHistory, SchemaVersion,
};
use crate::storage::Record;
use std::sync::Arc;

/// Resolves a version name to its model snapshot.
///
/// [`SchemaHistory`] is the usual implementation; a plain slice of models
/// works for tests and ad-hoc composition.
pub trait ModelResolver {
    /// Look up the model for a version.
    fn resolve(&self, version: &SchemaVersion) -> Result<&ModelVersion, MigrationError>;
}

impl ModelResolver for SchemaHistory {
    fn resolve(&self, version: &SchemaVersion) -> Result<&ModelVersion, MigrationError> {
        self.version(version)
    }
}

impl ModelResolver for [ModelVersion] {
    fn resolve(&self, version: &SchemaVersion) -> Result<&ModelVersion, MigrationError> {
        self.iter()
            .find(|m| &m.version == version)
            .ok_or_else(|| MigrationError::ModelNotFound {
                name: version.to_string(),
            })
    }
}

impl<const N: usize> ModelResolver for [ModelVersion; N] {
    fn resolve(&self, version: &SchemaVersion) -> Result<&ModelVersion, MigrationError> {
        self[..].resolve(version)
    }
}

/// A user-supplied value computation over a source record.
#[derive(Clone)]
pub struct ComputeFn(
    Arc<dyn Fn(&Record) -> Result<AttributeValue, MigrationError> + Send + Sync>,
);

impl ComputeFn {
    /// Wrap a computation closure.
    pub fn new(
        f: impl Fn(&Record) -> Result<AttributeValue, MigrationError> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Run the computation against a source record.
    pub fn call(&self, record: &Record) -> Result<AttributeValue, MigrationError> {
        (self.0)(record)
    }
}

impl std::fmt::Debug for ComputeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ComputeFn")
    }
}

/// One per-attribute transform rule within an entity mapping.
#[derive(Debug, Clone)]
pub enum AttributeTransform {
    /// Carry a source value through unchanged (covers renames).
    Copy {
        /// Source attribute name.
        source: String,
        /// Destination attribute name.
        destination: String,
    },
    /// Carry a source value through a kind conversion.
    Convert {
        /// Source attribute name.
        source: String,
        /// Destination attribute name.
        destination: String,
        /// Kind to convert into.
        to_kind: AttributeKind,
    },
    /// Insert a fixed value regardless of the source record.
    SetDefault {
        /// Destination attribute name.
        destination: String,
        /// The value to insert.
        value: AttributeValue,
    },
    /// Compute the value from the full source record.
    Compute {
        /// Destination attribute name.
        destination: String,
        /// The computation.
        func: ComputeFn,
    },
}

/// How one destination entity's records are produced.
///
/// Attributes with no transform are dropped; an attribute present only in
/// the source is dropped by omission.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    /// Source entity name; `None` inserts a new, empty entity.
    pub source_entity: Option<String>,
    /// Destination entity name; `None` drops the source entity.
    pub destination_entity: Option<String>,
    /// Per-attribute transforms, applied in order.
    pub transforms: Vec<AttributeTransform>,
}

impl EntityMapping {
    /// Map a source entity onto a destination entity.
    pub fn transform(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_entity: Some(source.into()),
            destination_entity: Some(destination.into()),
            transforms: Vec::new(),
        }
    }

    /// Introduce a destination entity with no source records.
    pub fn insert(destination: impl Into<String>) -> Self {
        Self {
            source_entity: None,
            destination_entity: Some(destination.into()),
            transforms: Vec::new(),
        }
    }

    /// Drop a source entity and its records.
    pub fn drop_entity(source: impl Into<String>) -> Self {
        Self {
            source_entity: Some(source.into()),
            destination_entity: None,
            transforms: Vec::new(),
        }
    }

    /// Add a copy transform.
    pub fn with_copy(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.transforms.push(AttributeTransform::Copy {
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    /// Add a default-value transform.
    pub fn with_default(mut self, destination: impl Into<String>, value: AttributeValue) -> Self {
        self.transforms.push(AttributeTransform::SetDefault {
            destination: destination.into(),
            value,
        });
        self
    }

    /// Add a computed transform.
    pub fn with_compute(mut self, destination: impl Into<String>, func: ComputeFn) -> Self {
        self.transforms.push(AttributeTransform::Compute {
            destination: destination.into(),
            func,
        });
        self
    }

    /// Apply this mapping's transforms to one source record.
    pub fn apply(&self, record: &Record) -> Result<Record, MigrationError> {
        let entity = self.destination_entity.as_deref().unwrap_or("");
        let mut out = Record::new(record.id);

        for transform in &self.transforms {
            match transform {
                AttributeTransform::Copy {
                    source,
                    destination,
                } => {
                    let value = record.get(source).cloned().unwrap_or(AttributeValue::Null);
                    out.values.insert(destination.clone(), value);
                }
                AttributeTransform::Convert {
                    source,
                    destination,
                    to_kind,
                } => {
                    let value = record.get(source).cloned().unwrap_or(AttributeValue::Null);
                    let converted = value.convert_to(*to_kind).ok_or_else(|| {
                        MigrationError::TransformFailed {
                            entity: entity.to_string(),
                            attribute: destination.clone(),
                            record_id: hex::encode(record.id),
                            reason: format!("value does not convert to {to_kind}"),
                        }
                    })?;
                    out.values.insert(destination.clone(), converted);
                }
                AttributeTransform::SetDefault { destination, value } => {
                    out.values.insert(destination.clone(), value.clone());
                }
                AttributeTransform::Compute { destination, func } => {
                    let value = func.call(record)?;
                    out.values.insert(destination.clone(), value);
                }
            }
        }

        Ok(out)
    }
}

/// One pass over a store's records: every entity mapping applied in a single
/// source-to-destination copy.
#[derive(Debug, Clone, Default)]
pub struct MappingStage {
    /// Entity mappings applied in this stage.
    pub mappings: Vec<EntityMapping>,
}

impl MappingStage {
    /// Build a stage from entity mappings.
    pub fn new(mappings: Vec<EntityMapping>) -> Self {
        Self { mappings }
    }

    /// Find the mapping that reads from the given source entity.
    pub fn mapping_for_source(&self, entity: &str) -> Option<&EntityMapping> {
        self.mappings
            .iter()
            .find(|m| m.source_entity.as_deref() == Some(entity))
    }
}

/// The opaque mapping artifact a storage engine consumes for one hop.
///
/// Constructed once per migration step, consumed once, then discarded.
#[derive(Debug, Clone)]
pub struct MappingModel {
    /// The version the model reads from.
    pub source: SchemaVersion,
    /// The version the model writes into.
    pub destination: SchemaVersion,
    /// Ordered stages; the engine applies them sequentially.
    pub stages: Vec<MappingStage>,
}

/// Polymorphic capability: describe how to carry data across one hop.
pub trait MappingProvider: Send + Sync {
    /// The version this provider reads from.
    fn source_version(&self) -> &SchemaVersion;

    /// The version this provider writes into.
    fn destination_version(&self) -> &SchemaVersion;

    /// Produce the mapping model for this provider's hop.
    fn produce_mapping(&self, models: &dyn ModelResolver)
        -> Result<MappingModel, MigrationError>;
}

/// Derive an entity mapping automatically, or fail where no safe derivation
/// exists.
fn infer_entity_mapping(
    source: &EntityDef,
    destination: &EntityDef,
) -> Result<EntityMapping, MigrationError> {
    let mut mapping = EntityMapping::transform(&source.name, &destination.name);

    for attr in destination.persistent_attributes() {
        let matched = source
            .attributes
            .iter()
            .filter(|a| !a.transient)
            .find(|a| a.name == attr.matching_identifier());

        match matched {
            Some(src_attr) => {
                if src_attr.kind == attr.kind {
                    mapping
                        .transforms
                        .push(AttributeTransform::Copy {
                            source: src_attr.name.clone(),
                            destination: attr.name.clone(),
                        });
                } else if src_attr.kind.converts_to(&attr.kind) {
                    mapping.transforms.push(AttributeTransform::Convert {
                        source: src_attr.name.clone(),
                        destination: attr.name.clone(),
                        to_kind: attr.kind,
                    });
                } else {
                    return Err(MigrationError::IncompatibleKinds {
                        entity: destination.name.clone(),
                        attribute: attr.name.clone(),
                        from_kind: src_attr.kind,
                        to_kind: attr.kind,
                    });
                }
            }
            None => {
                if let Some(default) = &attr.default {
                    mapping.transforms.push(AttributeTransform::SetDefault {
                        destination: attr.name.clone(),
                        value: default.clone(),
                    });
                } else if attr.optional {
                    mapping.transforms.push(AttributeTransform::SetDefault {
                        destination: attr.name.clone(),
                        value: AttributeValue::Null,
                    });
                } else {
                    return Err(MigrationError::CannotInferMapping {
                        entity: destination.name.clone(),
                        attribute: attr.name.clone(),
                        reason: "no source attribute and no derivable default for required attribute"
                            .to_string(),
                    });
                }
            }
        }
    }

    Ok(mapping)
}

/// Build a full stage between two models: matched entities are inferred (or
/// taken from `explicit` when provided), new entities are inserted, vanished
/// entities are dropped.
fn build_stage(
    from: &ModelVersion,
    to: &ModelVersion,
    explicit: &[EntityMapping],
) -> Result<MappingStage, MigrationError> {
    let mut mappings = Vec::new();
    let mut consumed_sources: Vec<&str> = Vec::new();

    for entity in &to.entities {
        if let Some(custom) = explicit
            .iter()
            .find(|m| m.destination_entity.as_deref() == Some(entity.name.as_str()))
        {
            if let Some(src) = custom.source_entity.as_deref() {
                consumed_sources.push(src);
            }
            mappings.push(custom.clone());
            continue;
        }

        match from.get_entity(entity.matching_identifier()) {
            Some(source) => {
                consumed_sources.push(source.name.as_str());
                mappings.push(infer_entity_mapping(source, entity)?);
            }
            None => mappings.push(EntityMapping::insert(&entity.name)),
        }
    }

    for source in &from.entities {
        let explicitly_dropped = explicit.iter().any(|m| {
            m.destination_entity.is_none()
                && m.source_entity.as_deref() == Some(source.name.as_str())
        });
        if !consumed_sources.contains(&source.name.as_str()) || explicitly_dropped {
            mappings.push(EntityMapping::drop_entity(&source.name));
        }
    }

    Ok(MappingStage::new(mappings))
}

/// Algorithmically derived mapping: entities and attributes matched by
/// renaming identifier first, then by name, with default transforms for
/// kind-compatible attributes.
#[derive(Debug)]
pub struct InferredMapping {
    source: SchemaVersion,
    destination: SchemaVersion,
}

impl InferredMapping {
    /// Create an inferred mapping for one hop.
    pub fn new(source: impl Into<SchemaVersion>, destination: impl Into<SchemaVersion>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl MappingProvider for InferredMapping {
    fn source_version(&self) -> &SchemaVersion {
        &self.source
    }

    fn destination_version(&self) -> &SchemaVersion {
        &self.destination
    }

    fn produce_mapping(
        &self,
        models: &dyn ModelResolver,
    ) -> Result<MappingModel, MigrationError> {
        let from = models.resolve(&self.source)?;
        let to = models.resolve(&self.destination)?;
        let stage = build_stage(from, to, &[])?;
        Ok(MappingModel {
            source: self.source.clone(),
            destination: self.destination.clone(),
            stages: vec![stage],
        })
    }
}

/// Explicit, user-declared mapping for one exact (from, to) pair.
///
/// Entities not named by any declared mapping fall back to inference, so a
/// custom mapping only has to describe what inference cannot produce.
#[derive(Debug)]
pub struct CustomMapping {
    source: SchemaVersion,
    destination: SchemaVersion,
    mappings: Vec<EntityMapping>,
}

impl CustomMapping {
    /// Create a custom mapping for one hop.
    pub fn new(source: impl Into<SchemaVersion>, destination: impl Into<SchemaVersion>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mappings: Vec::new(),
        }
    }

    /// Declare an entity mapping.
    pub fn with_entity_mapping(mut self, mapping: EntityMapping) -> Self {
        self.mappings.push(mapping);
        self
    }
}

impl MappingProvider for CustomMapping {
    fn source_version(&self) -> &SchemaVersion {
        &self.source
    }

    fn destination_version(&self) -> &SchemaVersion {
        &self.destination
    }

    fn produce_mapping(
        &self,
        models: &dyn ModelResolver,
    ) -> Result<MappingModel, MigrationError> {
        let from = models.resolve(&self.source)?;
        let to = models.resolve(&self.destination)?;
        let stage = build_stage(from, to, &self.mappings)?;
        Ok(MappingModel {
            source: self.source.clone(),
            destination: self.destination.clone(),
            stages: vec![stage],
        })
    }
}

/// A fixed ordered sequence of providers composed end-to-end.
///
/// Each consecutive pair's destination must equal the next source; violations
/// fail at construction, never at migration time.
pub struct ChainedMappings {
    providers: Vec<Box<dyn MappingProvider>>,
}

impl ChainedMappings {
    /// Compose providers, verifying adjacency.
    pub fn new(providers: Vec<Box<dyn MappingProvider>>) -> Result<Self, MigrationError> {
        if providers.is_empty() {
            return Err(MigrationError::InvalidChain {
                reason: "chained mapping composes no providers".to_string(),
            });
        }
        for (index, pair) in providers.windows(2).enumerate() {
            let found = pair[0].destination_version();
            let expected = pair[1].source_version();
            if found != expected {
                return Err(MigrationError::MappingChainMismatch {
                    index,
                    found: found.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        Ok(Self { providers })
    }
}

impl MappingProvider for ChainedMappings {
    fn source_version(&self) -> &SchemaVersion {
        // Invariant: non-empty, checked at construction.
        self.providers[0].source_version()
    }

    fn destination_version(&self) -> &SchemaVersion {
        self.providers[self.providers.len() - 1].destination_version()
    }

    fn produce_mapping(
        &self,
        models: &dyn ModelResolver,
    ) -> Result<MappingModel, MigrationError> {
        let mut stages = Vec::new();
        for provider in &self.providers {
            stages.extend(provider.produce_mapping(models)?.stages);
        }
        Ok(MappingModel {
            source: self.source_version().clone(),
            destination: self.destination_version().clone(),
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeDef;

    fn v1() -> ModelVersion {
        ModelVersion::new(
            "v1",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("name", AttributeKind::String))
                .with_attribute(AttributeDef::new("age", AttributeKind::Int32))],
        )
    }

    fn v2() -> ModelVersion {
        // name stays, age widens, email appears optional, handle is a rename.
        ModelVersion::new(
            "v2",
            vec![EntityDef::new("User")
                .with_attribute(
                    AttributeDef::new("handle", AttributeKind::String)
                        .with_renaming_identifier("name"),
                )
                .with_attribute(AttributeDef::new("age", AttributeKind::Int64))
                .with_attribute(AttributeDef::optional("email", AttributeKind::String))],
        )
    }

    fn sample_record() -> Record {
        Record::new([1u8; 16])
            .with_value("name", AttributeValue::String("Ada".into()))
            .with_value("age", AttributeValue::Int32(36))
    }

    #[test]
    fn test_inferred_mapping_end_to_end() {
        let models = [v1(), v2()];
        let provider = InferredMapping::new("v1", "v2");
        let model = provider.produce_mapping(&models).unwrap();

        assert_eq!(model.stages.len(), 1);
        let mapping = model.stages[0].mapping_for_source("User").unwrap();
        let migrated = mapping.apply(&sample_record()).unwrap();

        assert_eq!(
            migrated.get("handle"),
            Some(&AttributeValue::String("Ada".into()))
        );
        assert_eq!(migrated.get("age"), Some(&AttributeValue::Int64(36)));
        assert_eq!(migrated.get("email"), Some(&AttributeValue::Null));
        assert!(migrated.get("name").is_none());
    }

    #[test]
    fn test_inferred_mapping_rejects_incompatible_kinds() {
        let from = ModelVersion::new(
            "v1",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("avatar", AttributeKind::String))],
        );
        let to = ModelVersion::new(
            "v2",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("avatar", AttributeKind::Binary))],
        );

        let models = [from, to];
        let provider = InferredMapping::new("v1", "v2");
        let result = provider.produce_mapping(&models);
        assert!(matches!(
            result,
            Err(MigrationError::IncompatibleKinds { .. })
        ));
    }

    #[test]
    fn test_inferred_mapping_requires_default_for_required_attribute() {
        let from = ModelVersion::new("v1", vec![EntityDef::new("User")]);
        let to = ModelVersion::new(
            "v2",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("name", AttributeKind::String))],
        );

        let models = [from, to];
        let provider = InferredMapping::new("v1", "v2");
        let result = provider.produce_mapping(&models);
        assert!(matches!(
            result,
            Err(MigrationError::CannotInferMapping { .. })
        ));
    }

    #[test]
    fn test_new_and_vanished_entities() {
        let from = ModelVersion::new(
            "v1",
            vec![EntityDef::new("Legacy")
                .with_attribute(AttributeDef::new("x", AttributeKind::Int32))],
        );
        let to = ModelVersion::new("v2", vec![EntityDef::new("Fresh")]);

        let models = [from, to];
        let model = InferredMapping::new("v1", "v2")
            .produce_mapping(&models)
            .unwrap();

        let stage = &model.stages[0];
        assert!(stage
            .mappings
            .iter()
            .any(|m| m.source_entity.is_none()
                && m.destination_entity.as_deref() == Some("Fresh")));
        assert!(stage
            .mappings
            .iter()
            .any(|m| m.destination_entity.is_none()
                && m.source_entity.as_deref() == Some("Legacy")));
    }

    #[test]
    fn test_custom_mapping_compute() {
        let provider = CustomMapping::new("v1", "v2").with_entity_mapping(
            EntityMapping::transform("User", "User")
                .with_copy("age", "age")
                .with_compute(
                    "handle",
                    ComputeFn::new(|record| {
                        let name = match record.get("name") {
                            Some(AttributeValue::String(s)) => s.clone(),
                            _ => String::new(),
                        };
                        Ok(AttributeValue::String(name.to_lowercase()))
                    }),
                ),
        );

        let models = [v1(), v2()];
        let model = provider.produce_mapping(&models).unwrap();
        let mapping = model.stages[0].mapping_for_source("User").unwrap();
        let migrated = mapping.apply(&sample_record()).unwrap();

        assert_eq!(
            migrated.get("handle"),
            Some(&AttributeValue::String("ada".into()))
        );
        // Copy carries the Int32 through untouched; the custom mapping chose to.
        assert_eq!(migrated.get("age"), Some(&AttributeValue::Int32(36)));
    }

    #[test]
    fn test_chained_mappings_adjacency_checked_at_construction() {
        let good = ChainedMappings::new(vec![
            Box::new(InferredMapping::new("v1", "v2")),
            Box::new(InferredMapping::new("v2", "v3")),
        ]);
        assert!(good.is_ok());

        let bad = ChainedMappings::new(vec![
            Box::new(InferredMapping::new("v1", "v2")),
            Box::new(InferredMapping::new("v3", "v4")),
        ]);
        assert!(matches!(
            bad,
            Err(MigrationError::MappingChainMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn test_chained_mappings_concatenates_stages() {
        let v3 = ModelVersion::new(
            "v3",
            vec![EntityDef::new("User")
                .with_attribute(AttributeDef::new("handle", AttributeKind::String))
                .with_attribute(AttributeDef::new("age", AttributeKind::Int64))
                .with_attribute(AttributeDef::optional("email", AttributeKind::String))],
        );
        let models = [v1(), v2(), v3];

        let chained = ChainedMappings::new(vec![
            Box::new(InferredMapping::new("v1", "v2")),
            Box::new(InferredMapping::new("v2", "v3")),
        ])
        .unwrap();

        assert_eq!(chained.source_version().as_str(), "v1");
        assert_eq!(chained.destination_version().as_str(), "v3");

        let model = chained.produce_mapping(&models).unwrap();
        assert_eq!(model.stages.len(), 2);
    }

    #[test]
    fn test_convert_transform_failure_names_record() {
        let mapping = EntityMapping::transform("User", "User").with_copy("name", "name");
        let mut broken = mapping.clone();
        broken.transforms.push(AttributeTransform::Convert {
            source: "name".to_string(),
            destination: "name_len".to_string(),
            to_kind: AttributeKind::Int64,
        });

        let result = broken.apply(&sample_record());
        assert!(matches!(
            result,
            Err(MigrationError::TransformFailed { .. })
        ));
    }
}
