//! Migration coordinator: drives one store through its hop sequence.
//!
//! For a single store open the coordinator resolves the store's current
//! version, computes the hop path, and applies each hop's mapping against a
//! scratch copy. The original store file is never touched until the final
//! hop succeeds, at which point the scratch is atomically swapped in.

use super::error::MigrationError;
use super::mapping::{InferredMapping, MappingProvider};
use super::progress::{MigrationPhase, MigrationProgress, ProgressObserver};
use crate::model::{SchemaHistory, SchemaVersion};
use crate::storage::{StorageEngine, StoreLocation, StoreMetadata};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a completed (or no-op) migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// The version the store was at before migration.
    pub from_version: SchemaVersion,
    /// The version the store is at now.
    pub to_version: SchemaVersion,
    /// Hops applied; zero for an already-current store.
    pub hops_applied: usize,
}

impl MigrationReport {
    /// Check if the store was already at the target version.
    pub fn was_noop(&self) -> bool {
        self.hops_applied == 0
    }
}

/// Coordinates progressive migration of one store toward the history's
/// current version.
pub struct Migrator<'a> {
    history: &'a SchemaHistory,
    engine: &'a dyn StorageEngine,
    providers: &'a [Box<dyn MappingProvider>],
    cancel: Arc<AtomicBool>,
    observer: Option<&'a ProgressObserver>,
}

impl<'a> Migrator<'a> {
    /// Create a coordinator.
    pub fn new(
        history: &'a SchemaHistory,
        engine: &'a dyn StorageEngine,
        providers: &'a [Box<dyn MappingProvider>],
    ) -> Self {
        Self {
            history,
            engine,
            providers,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: None,
        }
    }

    /// Share a cancellation flag; set it to abort cooperatively between hops.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: &'a ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Migrate the store at `location` to the history's current version.
    ///
    /// Synchronous; returns once the store is fully migrated, was already
    /// current, or the attempt aborted. On any hop failure the original
    /// store is left byte-for-byte unmodified and scratch artifacts are
    /// discarded. A cancellation between hops commits the last fully
    /// completed intermediate version, so a later call resumes from there.
    pub fn migrate(&self, location: &StoreLocation) -> Result<MigrationReport, MigrationError> {
        let metadata = self.engine.read_metadata(location)?;
        let current = self.history.identify_version(&metadata)?.version.clone();
        debug!(store = %location, version = %current, "store version detected");
        self.notify(MigrationPhase::VersionDetected, 0, 0);

        let target = self.history.current_version().version.clone();
        if current == target {
            debug!(store = %location, version = %target, "store already current");
            self.notify(MigrationPhase::Completed, 0, 0);
            return Ok(MigrationReport {
                from_version: current,
                to_version: target,
                hops_applied: 0,
            });
        }

        let hops = self.history.chain().path(&current, &target)?;
        let total = hops.len();
        info!(store = %location, from = %current, to = %target, hops = total, "migration path computed");
        self.notify(MigrationPhase::PathComputed, 0, total);

        let mut source = location.clone();
        let mut completed: Option<(StoreLocation, SchemaVersion)> = None;
        let mut previous = current.clone();

        for (index, hop) in hops.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                return self.commit_cancelled(location, completed, previous);
            }

            self.notify(
                MigrationPhase::Migrating {
                    step: index + 1,
                    total,
                },
                index,
                total,
            );

            let scratch = location.scratch_for(hop.as_str());
            match self.apply_hop(&previous, hop, &source, &scratch, &metadata) {
                Ok(()) => {
                    if let Some((old, _)) = completed.take() {
                        self.discard(&old);
                    }
                    info!(store = %location, hop = %hop, step = index + 1, total, "hop applied");
                    completed = Some((scratch.clone(), hop.clone()));
                    source = scratch;
                    previous = hop.clone();
                }
                Err(e) => {
                    self.discard(&scratch);
                    if let Some((old, _)) = completed.take() {
                        self.discard(&old);
                    }
                    warn!(store = %location, hop = %hop, error = %e, "migration aborted");
                    self.notify(MigrationPhase::Aborted, index, total);
                    return Err(e);
                }
            }
        }

        // Invariant: the loop ran at least once, so a scratch exists.
        let (final_scratch, _) = completed.ok_or_else(|| MigrationError::NoPathFound {
            from: current.to_string(),
            to: target.to_string(),
        })?;
        self.engine
            .swap_store(&final_scratch, location)
            .map_err(MigrationError::Storage)?;

        info!(store = %location, from = %current, to = %target, "migration completed");
        self.notify(MigrationPhase::Completed, total, total);

        Ok(MigrationReport {
            from_version: current,
            to_version: target,
            hops_applied: total,
        })
    }

    /// Apply one hop into a fresh scratch store and stamp its metadata.
    fn apply_hop(
        &self,
        from: &SchemaVersion,
        to: &SchemaVersion,
        source: &StoreLocation,
        scratch: &StoreLocation,
        original: &StoreMetadata,
    ) -> Result<(), MigrationError> {
        // A stale scratch from a crashed run would poison apply_mapping.
        self.engine
            .delete_store(scratch)
            .map_err(MigrationError::Storage)?;

        let inferred;
        let provider: &dyn MappingProvider = match self
            .providers
            .iter()
            .find(|p| p.source_version() == from && p.destination_version() == to)
        {
            Some(custom) => custom.as_ref(),
            None => {
                inferred = InferredMapping::new(from.clone(), to.clone());
                &inferred
            }
        };

        let model = provider.produce_mapping(self.history)?;
        self.engine
            .apply_mapping(&model, source, scratch)
            .map_err(MigrationError::Storage)?;

        let lock = self.history.lock_for(to)?.clone();
        let stamped = StoreMetadata::new(
            self.history.model_name(),
            to.as_str(),
            lock,
            original.store_type.clone(),
            original.configuration.clone(),
        );
        self.engine
            .write_metadata(scratch, &stamped)
            .map_err(MigrationError::Storage)?;

        Ok(())
    }

    /// Honor a cancellation observed between hops.
    fn commit_cancelled(
        &self,
        location: &StoreLocation,
        completed: Option<(StoreLocation, SchemaVersion)>,
        at_version: SchemaVersion,
    ) -> Result<MigrationReport, MigrationError> {
        if let Some((scratch, version)) = completed {
            // The completed intermediate is a consistent store at a known
            // version; committing it lets a later run resume from there.
            self.engine
                .swap_store(&scratch, location)
                .map_err(MigrationError::Storage)?;
            info!(store = %location, version = %version, "cancelled; store left at intermediate version");
            self.notify(MigrationPhase::Aborted, 0, 0);
            return Err(MigrationError::Cancelled {
                at_version: version.to_string(),
            });
        }
        info!(store = %location, version = %at_version, "cancelled before any hop");
        self.notify(MigrationPhase::Aborted, 0, 0);
        Err(MigrationError::Cancelled {
            at_version: at_version.to_string(),
        })
    }

    /// Best-effort scratch removal; failures are logged, not propagated, so
    /// they never mask the error that triggered the cleanup.
    fn discard(&self, scratch: &StoreLocation) {
        if let Err(e) = self.engine.delete_store(scratch) {
            warn!(scratch = %scratch, error = %e, "failed to discard scratch store");
        }
    }

    fn notify(&self, phase: MigrationPhase, completed_hops: usize, total_hops: usize) {
        if let Some(observer) = self.observer {
            observer(&MigrationProgress {
                phase,
                completed_hops,
                total_hops,
            });
        }
    }
}
