//! Migration phase tracking and progress reporting.

/// Phase of a single store-open migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Nothing has happened yet.
    Idle,
    /// The store's current version was resolved from its metadata.
    VersionDetected,
    /// The hop sequence to the target version was computed.
    PathComputed,
    /// Applying hop `step` of `total`.
    Migrating {
        /// 1-based hop index.
        step: usize,
        /// Total hops in the path.
        total: usize,
    },
    /// The store is at the target version.
    Completed,
    /// The migration aborted; the error carries the cause.
    Aborted,
}

impl MigrationPhase {
    /// Check if the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::Completed | MigrationPhase::Aborted)
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::VersionDetected => write!(f, "version_detected"),
            MigrationPhase::PathComputed => write!(f, "path_computed"),
            MigrationPhase::Migrating { step, total } => {
                write!(f, "migrating ({step}/{total})")
            }
            MigrationPhase::Completed => write!(f, "completed"),
            MigrationPhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// A progress report emitted between hops.
#[derive(Debug, Clone)]
pub struct MigrationProgress {
    /// Current phase.
    pub phase: MigrationPhase,
    /// Hops fully applied so far.
    pub completed_hops: usize,
    /// Total hops in the path.
    pub total_hops: usize,
}

impl MigrationProgress {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_hops == 0 {
            1.0
        } else {
            self.completed_hops as f64 / self.total_hops as f64
        }
    }
}

/// Observer callback invoked at phase transitions and after each hop.
pub type ProgressObserver = dyn Fn(&MigrationProgress) + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminality() {
        assert!(!MigrationPhase::Idle.is_terminal());
        assert!(!MigrationPhase::Migrating { step: 1, total: 3 }.is_terminal());
        assert!(MigrationPhase::Completed.is_terminal());
        assert!(MigrationPhase::Aborted.is_terminal());
    }

    #[test]
    fn test_progress_fraction() {
        let progress = MigrationProgress {
            phase: MigrationPhase::Migrating { step: 2, total: 4 },
            completed_hops: 2,
            total_hops: 4,
        };
        assert_eq!(progress.fraction(), 0.5);

        let noop = MigrationProgress {
            phase: MigrationPhase::Completed,
            completed_hops: 0,
            total_hops: 0,
        };
        assert_eq!(noop.fraction(), 1.0);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            MigrationPhase::Migrating { step: 1, total: 2 }.to_string(),
            "migrating (1/2)"
        );
        assert_eq!(MigrationPhase::Completed.to_string(), "completed");
    }
}
