//! Schema history: every known version of one logical model, plus the
//! migration chain connecting them.

use super::lock::VersionLock;
use super::version::{ModelVersion, SchemaVersion};
use crate::migration::chain::MigrationChain;
use crate::migration::error::MigrationError;
use crate::storage::StoreMetadata;

/// All known versions of a logical model, the chain between them, and the
/// version the model currently targets.
///
/// Construction validates everything eagerly: duplicate version names, chain
/// cycles, ambiguous reconvergence, and chain edges naming unknown versions
/// all fail here rather than mid-migration.
pub struct SchemaHistory {
    model_name: String,
    versions: Vec<(ModelVersion, VersionLock)>,
    chain: MigrationChain,
    current: SchemaVersion,
}

impl SchemaHistory {
    /// Build a history, inferring the current version.
    ///
    /// With an empty chain the last declared version is current ("no
    /// migration support; only the latest version is openable"). With a
    /// non-empty chain the single leaf version is current; a chain with
    /// multiple leaves requires [`SchemaHistory::with_target`].
    pub fn new(
        model_name: impl Into<String>,
        versions: Vec<ModelVersion>,
        chain: MigrationChain,
    ) -> Result<Self, MigrationError> {
        let current = Self::infer_current(&versions, &chain)?;
        Self::build(model_name.into(), versions, chain, current)
    }

    /// Build a history targeting an explicitly chosen version.
    ///
    /// The target must be a known version and, for a non-empty chain, one of
    /// the chain's leaf versions.
    pub fn with_target(
        model_name: impl Into<String>,
        versions: Vec<ModelVersion>,
        chain: MigrationChain,
        target: impl Into<SchemaVersion>,
    ) -> Result<Self, MigrationError> {
        let target = target.into();
        if !chain.is_empty() && !chain.leaf_versions().contains(&target) {
            return Err(MigrationError::InvalidChain {
                reason: format!("target version {target} is not a leaf of the migration chain"),
            });
        }
        Self::build(model_name.into(), versions, chain, target)
    }

    fn infer_current(
        versions: &[ModelVersion],
        chain: &MigrationChain,
    ) -> Result<SchemaVersion, MigrationError> {
        if chain.is_empty() {
            return versions
                .last()
                .map(|v| v.version.clone())
                .ok_or_else(|| MigrationError::InvalidChain {
                    reason: "schema history declares no versions".to_string(),
                });
        }
        let leaves = chain.leaf_versions();
        match leaves.len() {
            1 => Ok(leaves.into_iter().next().unwrap_or_else(|| unreachable!())),
            n => Err(MigrationError::InvalidChain {
                reason: format!(
                    "migration chain has {n} leaf versions; pick one with with_target"
                ),
            }),
        }
    }

    fn build(
        model_name: String,
        versions: Vec<ModelVersion>,
        chain: MigrationChain,
        current: SchemaVersion,
    ) -> Result<Self, MigrationError> {
        let mut names: Vec<&SchemaVersion> = versions.iter().map(|v| &v.version).collect();
        names.sort();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(MigrationError::InvalidChain {
                reason: format!("version {} declared more than once", pair[0]),
            });
        }

        let known: Vec<SchemaVersion> = versions.iter().map(|v| v.version.clone()).collect();
        chain.validate(&known)?;

        if !known.contains(&current) {
            return Err(MigrationError::ModelNotFound {
                name: current.to_string(),
            });
        }

        let versions = versions
            .into_iter()
            .map(|v| {
                let lock = v.lock();
                (v, lock)
            })
            .collect();

        Ok(Self {
            model_name,
            versions,
            chain,
            current,
        })
    }

    /// The logical model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The migration chain.
    pub fn chain(&self) -> &MigrationChain {
        &self.chain
    }

    /// The version this history migrates stores toward.
    pub fn current_version(&self) -> &ModelVersion {
        // Invariant: `current` is validated against `versions` in build().
        self.versions
            .iter()
            .map(|(v, _)| v)
            .find(|v| v.version == self.current)
            .unwrap_or_else(|| unreachable!("current version validated at construction"))
    }

    /// The precomputed lock of the current version.
    pub fn current_lock(&self) -> &VersionLock {
        self.versions
            .iter()
            .find(|(v, _)| v.version == self.current)
            .map(|(_, l)| l)
            .unwrap_or_else(|| unreachable!("current version validated at construction"))
    }

    /// Look up a version's model by name.
    pub fn version(&self, name: &SchemaVersion) -> Result<&ModelVersion, MigrationError> {
        self.versions
            .iter()
            .map(|(v, _)| v)
            .find(|v| &v.version == name)
            .ok_or_else(|| MigrationError::ModelNotFound {
                name: name.to_string(),
            })
    }

    /// Look up a version's precomputed lock by name.
    pub fn lock_for(&self, name: &SchemaVersion) -> Result<&VersionLock, MigrationError> {
        self.versions
            .iter()
            .find(|(v, _)| &v.version == name)
            .map(|(_, l)| l)
            .ok_or_else(|| MigrationError::ModelNotFound {
                name: name.to_string(),
            })
    }

    /// Identify which known version an existing store was written with.
    ///
    /// Compares the entity hashes persisted in the store's metadata against
    /// every known version's lock. Exactly one version must match; zero or
    /// multiple matches mean the store's origin cannot be determined and
    /// migration would be unsafe.
    pub fn identify_version(
        &self,
        metadata: &StoreMetadata,
    ) -> Result<&ModelVersion, MigrationError> {
        let store_lock = metadata.lock();

        let matches: Vec<&ModelVersion> = self
            .versions
            .iter()
            .filter(|(_, lock)| *lock == store_lock)
            .map(|(v, _)| v)
            .collect();

        match matches.len() {
            1 => Ok(matches[0]),
            n => Err(MigrationError::AmbiguousVersion {
                model: self.model_name.clone(),
                matched: n,
            }),
        }
    }

    /// Iterate over all declared versions in declaration order.
    pub fn versions(&self) -> impl Iterator<Item = &ModelVersion> {
        self.versions.iter().map(|(v, _)| v)
    }
}
