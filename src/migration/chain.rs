//! Migration chain: the directed graph of supported upgrade paths.

use super::error::MigrationError;
use crate::model::SchemaVersion;
use std::collections::{BTreeMap, BTreeSet};

/// A set of directed edges between schema versions.
///
/// A valid chain is a forest of out-trees: a version may fan out to several
/// destinations, but no version has two distinct incoming edges and no
/// directed cycle exists. An empty chain is valid and means "no migration
/// support; only the latest version is openable".
#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    edges: BTreeMap<SchemaVersion, BTreeSet<SchemaVersion>>,
}

impl MigrationChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from (from, to) pairs.
    pub fn from_edges<I, V>(edges: I) -> Self
    where
        I: IntoIterator<Item = (V, V)>,
        V: Into<SchemaVersion>,
    {
        let mut chain = Self::new();
        for (from, to) in edges {
            chain.insert(from, to);
        }
        chain
    }

    /// Add a directed edge.
    pub fn insert(&mut self, from: impl Into<SchemaVersion>, to: impl Into<SchemaVersion>) {
        self.edges
            .entry(from.into())
            .or_default()
            .insert(to.into());
    }

    /// Check if the chain has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|d| d.len()).sum()
    }

    /// Every version mentioned by any edge.
    pub fn versions(&self) -> BTreeSet<SchemaVersion> {
        let mut all = BTreeSet::new();
        for (from, tos) in &self.edges {
            all.insert(from.clone());
            all.extend(tos.iter().cloned());
        }
        all
    }

    /// Versions with no outgoing edge: the "current" targets the chain
    /// supports opening into.
    pub fn leaf_versions(&self) -> BTreeSet<SchemaVersion> {
        self.versions()
            .into_iter()
            .filter(|v| !self.edges.contains_key(v))
            .collect()
    }

    /// Validate the chain against the set of known versions.
    ///
    /// Rejects self-edges, reconvergence (a version with two distinct
    /// incoming edges), directed cycles, and edges naming versions absent
    /// from `known`.
    pub fn validate(&self, known: &[SchemaVersion]) -> Result<(), MigrationError> {
        for version in self.versions() {
            if !known.contains(&version) {
                return Err(MigrationError::InvalidChain {
                    reason: format!("chain names unknown version {version}"),
                });
            }
        }

        let mut incoming: BTreeMap<&SchemaVersion, usize> = BTreeMap::new();
        for (from, tos) in &self.edges {
            for to in tos {
                if from == to {
                    return Err(MigrationError::InvalidChain {
                        reason: format!("self edge on version {from}"),
                    });
                }
                *incoming.entry(to).or_default() += 1;
            }
        }
        if let Some((version, count)) = incoming.iter().find(|(_, c)| **c > 1) {
            return Err(MigrationError::InvalidChain {
                reason: format!("version {version} has {count} incoming edges"),
            });
        }

        // Unique incoming edges make any cycle a simple loop: follow edges
        // from each root-less version and flag a revisit.
        let mut visited = BTreeSet::new();
        for start in self.edges.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut on_path = BTreeSet::new();
            let mut stack = vec![start.clone()];
            while let Some(node) = stack.pop() {
                if on_path.contains(&node) {
                    return Err(MigrationError::InvalidChain {
                        reason: format!("cycle through version {node}"),
                    });
                }
                on_path.insert(node.clone());
                visited.insert(node.clone());
                if let Some(tos) = self.edges.get(&node) {
                    stack.extend(tos.iter().cloned());
                }
            }
        }

        Ok(())
    }

    /// The exact, non-skippable ordered list of versions a store passes
    /// through migrating from `from` to `to`, excluding `from` itself.
    ///
    /// `path(x, x)` is empty: the store is already at the target. The walk
    /// is deterministic (successors visited in sorted order) and never
    /// shortcuts across hops, so every chained mapping stays the one that
    /// was validated for its specific hop.
    pub fn path(
        &self,
        from: &SchemaVersion,
        to: &SchemaVersion,
    ) -> Result<Vec<SchemaVersion>, MigrationError> {
        if from == to {
            return Ok(Vec::new());
        }

        let mut stack: Vec<(SchemaVersion, Vec<SchemaVersion>)> = vec![(from.clone(), Vec::new())];
        while let Some((node, path)) = stack.pop() {
            if let Some(tos) = self.edges.get(&node) {
                // Reverse so the smallest successor is explored first.
                for next in tos.iter().rev() {
                    let mut hops = path.clone();
                    hops.push(next.clone());
                    if next == to {
                        return Ok(hops);
                    }
                    stack.push((next.clone(), hops));
                }
            }
        }

        Err(MigrationError::NoPathFound {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(names: &[&str]) -> Vec<SchemaVersion> {
        names.iter().map(|n| SchemaVersion::from(*n)).collect()
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let chain = MigrationChain::new();
        assert!(chain.validate(&[]).is_ok());
        assert!(chain.is_empty());
        assert!(chain.leaf_versions().is_empty());
    }

    #[test]
    fn test_linear_chain_path() {
        let chain = MigrationChain::from_edges([("A", "B"), ("B", "C")]);
        chain.validate(&versions(&["A", "B", "C"])).unwrap();

        let path = chain
            .path(&SchemaVersion::from("A"), &SchemaVersion::from("C"))
            .unwrap();
        assert_eq!(path, versions(&["B", "C"]));
    }

    #[test]
    fn test_path_to_self_is_empty() {
        let chain = MigrationChain::from_edges([("A", "B")]);
        let path = chain
            .path(&SchemaVersion::from("A"), &SchemaVersion::from("A"))
            .unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_no_path_found() {
        let chain = MigrationChain::from_edges([("A", "B"), ("C", "D")]);
        let result = chain.path(&SchemaVersion::from("A"), &SchemaVersion::from("D"));
        assert!(matches!(result, Err(MigrationError::NoPathFound { .. })));

        // Edges are directed; walking backwards is not a path.
        let result = chain.path(&SchemaVersion::from("B"), &SchemaVersion::from("A"));
        assert!(matches!(result, Err(MigrationError::NoPathFound { .. })));
    }

    #[test]
    fn test_cycle_fails_validation() {
        let chain = MigrationChain::from_edges([("A", "B"), ("B", "A")]);
        let result = chain.validate(&versions(&["A", "B"]));
        assert!(matches!(result, Err(MigrationError::InvalidChain { .. })));
    }

    #[test]
    fn test_self_edge_fails_validation() {
        let chain = MigrationChain::from_edges([("A", "A")]);
        let result = chain.validate(&versions(&["A"]));
        assert!(matches!(result, Err(MigrationError::InvalidChain { .. })));
    }

    #[test]
    fn test_reconvergence_fails_validation() {
        // A→C and B→C give C two incoming edges.
        let chain = MigrationChain::from_edges([("A", "C"), ("B", "C")]);
        let result = chain.validate(&versions(&["A", "B", "C"]));
        assert!(matches!(result, Err(MigrationError::InvalidChain { .. })));
    }

    #[test]
    fn test_tree_shaped_fan_out_is_valid() {
        // One source branching to two distinct leaves forms an out-tree.
        let chain = MigrationChain::from_edges([("A", "B"), ("A", "C"), ("C", "D")]);
        chain.validate(&versions(&["A", "B", "C", "D"])).unwrap();

        let leaves = chain.leaf_versions();
        assert_eq!(leaves, versions(&["B", "D"]).into_iter().collect());

        let path = chain
            .path(&SchemaVersion::from("A"), &SchemaVersion::from("D"))
            .unwrap();
        assert_eq!(path, versions(&["C", "D"]));
    }

    #[test]
    fn test_unknown_version_fails_validation() {
        let chain = MigrationChain::from_edges([("A", "B")]);
        let result = chain.validate(&versions(&["A"]));
        assert!(matches!(result, Err(MigrationError::InvalidChain { .. })));
    }

    #[test]
    fn test_disjoint_forest_is_valid() {
        let chain = MigrationChain::from_edges([("A", "B"), ("C", "D")]);
        chain.validate(&versions(&["A", "B", "C", "D"])).unwrap();
        assert_eq!(chain.edge_count(), 2);
    }
}
