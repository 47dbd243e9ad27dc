//! DataStack: persistence-store lifecycle facade.
//!
//! Owns one resolved schema history, the migration coordinator wiring, and
//! the mapping from logical store configurations to physical stores.

use crate::migration::{
    MappingProvider, MigrationError, Migrator, ProgressObserver,
};
use crate::model::SchemaHistory;
use crate::storage::{StorageEngine, StoreHandle, StoreLocation, StoreMetadata};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Describes one store to add to a stack.
#[derive(Debug, Clone)]
pub struct StoreDescriptor {
    /// Logical configuration name the store is registered under.
    pub configuration: String,
    /// Physical location.
    pub location: StoreLocation,
    /// Store type tag; must match an existing store's metadata.
    pub store_type: String,
}

impl StoreDescriptor {
    /// Describe a sled-typed store.
    pub fn new(configuration: impl Into<String>, location: StoreLocation) -> Self {
        Self {
            configuration: configuration.into(),
            location,
            store_type: "sled".to_string(),
        }
    }

    /// Override the store type tag.
    pub fn with_store_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = store_type.into();
        self
    }
}

/// Construction-time options for a [`DataStack`].
///
/// All configuration is explicit; there are no process-wide default
/// locations or lookups.
pub struct DataStackConfig {
    /// The resolved schema history (versions + validated migration chain).
    pub history: SchemaHistory,
    /// Custom mapping providers consulted before falling back to inference.
    pub providers: Vec<Box<dyn MappingProvider>>,
    /// Destructive recovery: delete and recreate a store whose migration
    /// fails, instead of surfacing the error. Never a silent default.
    pub reset_on_mismatch: bool,
    /// Optional migration progress observer.
    pub observer: Option<Box<ProgressObserver>>,
}

impl DataStackConfig {
    /// Configure a stack around a schema history.
    pub fn new(history: SchemaHistory) -> Self {
        Self {
            history,
            providers: Vec::new(),
            reset_on_mismatch: false,
            observer: None,
        }
    }

    /// Register a custom mapping provider.
    pub fn with_provider(mut self, provider: Box<dyn MappingProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Enable destructive reset-on-mismatch recovery.
    pub fn with_reset_on_mismatch(mut self) -> Self {
        self.reset_on_mismatch = true;
        self
    }

    /// Attach a migration progress observer.
    pub fn with_observer(mut self, observer: Box<ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Persistence-store lifecycle facade.
///
/// At most one migration runs at a time per stack; store bookkeeping uses a
/// readers-writer discipline so lookups proceed concurrently while
/// registrations exclude everything else.
pub struct DataStack {
    history: SchemaHistory,
    engine: Arc<dyn StorageEngine>,
    providers: Vec<Box<dyn MappingProvider>>,
    reset_on_mismatch: bool,
    observer: Option<Box<ProgressObserver>>,
    stores: RwLock<HashMap<String, Arc<StoreHandle>>>,
    entity_index: RwLock<HashMap<String, BTreeSet<String>>>,
    migration_queue: Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl DataStack {
    /// Create a stack. The history's chain was validated at its own
    /// construction, so misconfiguration has already surfaced by now.
    pub fn new(config: DataStackConfig, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            history: config.history,
            engine,
            providers: config.providers,
            reset_on_mismatch: config.reset_on_mismatch,
            observer: config.observer,
            stores: RwLock::new(HashMap::new()),
            entity_index: RwLock::new(HashMap::new()),
            migration_queue: Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The schema history this stack serves.
    pub fn history(&self) -> &SchemaHistory {
        &self.history
    }

    /// Request cooperative cancellation of any in-flight migration. The
    /// signal is checked between hops, never mid-hop.
    pub fn cancel_migrations(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation request so later `add_store` calls can
    /// resume migrating.
    pub fn resume_migrations(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// Add (open, migrating if needed) a store and register it under its
    /// configuration name.
    ///
    /// Synchronous: blocks until the migration fully completes or fails.
    /// Re-adding an already-registered, matching configuration returns the
    /// same handle without touching the store again.
    pub fn add_store(
        &self,
        descriptor: &StoreDescriptor,
    ) -> Result<Arc<StoreHandle>, MigrationError> {
        if let Some(handle) = self.registered(descriptor)? {
            return Ok(handle);
        }

        // One migration at a time per stack.
        let _serial = self.migration_queue.lock();

        // A racing add_store may have registered while we waited.
        if let Some(handle) = self.registered(descriptor)? {
            return Ok(handle);
        }

        if self.engine.exists(&descriptor.location) {
            self.open_existing(descriptor)?;
        } else {
            self.create_fresh(descriptor)?;
        }

        let handle = Arc::new(
            self.engine
                .open_store(&descriptor.location)
                .map_err(MigrationError::Storage)?,
        );

        let mut stores = self.stores.write();
        stores.insert(descriptor.configuration.clone(), Arc::clone(&handle));
        drop(stores);

        let mut index = self.entity_index.write();
        for entity in &self.history.current_version().entities {
            index
                .entry(entity.name.clone())
                .or_default()
                .insert(descriptor.configuration.clone());
        }
        drop(index);

        info!(
            configuration = %descriptor.configuration,
            location = %descriptor.location,
            "store registered"
        );
        Ok(handle)
    }

    /// The registered store for a configuration, if any.
    pub fn store_for(&self, configuration: &str) -> Option<Arc<StoreHandle>> {
        self.stores.read().get(configuration).cloned()
    }

    /// Every configuration hosting the given entity.
    pub fn configurations_for_entity(&self, entity: &str) -> BTreeSet<String> {
        self.entity_index
            .read()
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Tear the stack down, releasing every registered store handle
    /// deterministically.
    pub fn teardown(self) {
        let mut stores = self.stores.write();
        let count = stores.len();
        stores.clear();
        drop(stores);
        self.entity_index.write().clear();
        info!(stores = count, "data stack torn down");
    }

    fn registered(
        &self,
        descriptor: &StoreDescriptor,
    ) -> Result<Option<Arc<StoreHandle>>, MigrationError> {
        let stores = self.stores.read();
        match stores.get(&descriptor.configuration) {
            Some(handle) => {
                if handle.location == descriptor.location
                    && handle.metadata.store_type == descriptor.store_type
                {
                    Ok(Some(Arc::clone(handle)))
                } else {
                    Err(MigrationError::DifferentStoreExists {
                        location: descriptor.location.to_string(),
                        reason: format!(
                            "configuration {} is already registered with a different store",
                            descriptor.configuration
                        ),
                    })
                }
            }
            None => Ok(None),
        }
    }

    fn open_existing(&self, descriptor: &StoreDescriptor) -> Result<(), MigrationError> {
        let metadata = self
            .engine
            .read_metadata(&descriptor.location)
            .map_err(MigrationError::Storage)?;

        if metadata.store_type != descriptor.store_type {
            return Err(MigrationError::DifferentStoreExists {
                location: descriptor.location.to_string(),
                reason: format!(
                    "store type {} does not match requested {}",
                    metadata.store_type, descriptor.store_type
                ),
            });
        }
        if metadata.configuration != descriptor.configuration {
            return Err(MigrationError::DifferentStoreExists {
                location: descriptor.location.to_string(),
                reason: format!(
                    "store belongs to configuration {}, not {}",
                    metadata.configuration, descriptor.configuration
                ),
            });
        }

        let mut migrator = Migrator::new(&self.history, self.engine.as_ref(), &self.providers)
            .with_cancel_flag(Arc::clone(&self.cancel));
        if let Some(observer) = self.observer.as_deref() {
            migrator = migrator.with_observer(observer);
        }

        match migrator.migrate(&descriptor.location) {
            Ok(report) => {
                if !report.was_noop() {
                    info!(
                        location = %descriptor.location,
                        from = %report.from_version,
                        to = %report.to_version,
                        hops = report.hops_applied,
                        "store migrated"
                    );
                }
                Ok(())
            }
            Err(e) if self.reset_on_mismatch && Self::is_resettable(&e) => {
                warn!(
                    location = %descriptor.location,
                    error = %e,
                    "deleting and recreating store after unmigratable mismatch"
                );
                self.engine
                    .delete_store(&descriptor.location)
                    .map_err(MigrationError::Storage)?;
                self.create_fresh(descriptor)
            }
            Err(e) => Err(e),
        }
    }

    /// Migration failures the destructive recovery path may absorb. I/O and
    /// cancellation must always surface.
    fn is_resettable(error: &MigrationError) -> bool {
        matches!(
            error,
            MigrationError::AmbiguousVersion { .. }
                | MigrationError::NoPathFound { .. }
                | MigrationError::CannotInferMapping { .. }
                | MigrationError::IncompatibleKinds { .. }
                | MigrationError::ModelNotFound { .. }
        )
    }

    fn create_fresh(&self, descriptor: &StoreDescriptor) -> Result<(), MigrationError> {
        let current = self.history.current_version();
        let metadata = StoreMetadata::new(
            self.history.model_name(),
            current.version.as_str(),
            self.history.current_lock().clone(),
            descriptor.store_type.clone(),
            descriptor.configuration.clone(),
        );
        self.engine
            .create_store(&descriptor.location, &metadata)
            .map_err(MigrationError::Storage)?;
        Ok(())
    }
}
