//! Migration-specific error types

use crate::executor::KeelError;
use crate::migration::Version;
use crate::schema::SchemaChange;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the registry, tracker and applier
///
/// Every variant that concerns a single unit carries its version and name so
/// the caller can report exactly where a run stopped.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two units claim the same version
    #[error("Migration '{name}' reuses version {version}, which is already registered")]
    DuplicateVersion { version: Version, name: String },

    /// A version token that is not a positive integer
    #[error("Invalid migration version: {0}")]
    InvalidVersion(String),

    /// A unit name or file name that does not follow the naming convention
    #[error("Invalid migration name: {0}")]
    InvalidName(String),

    /// A target version that no registered unit carries
    #[error("No migration is registered with version {0}")]
    UnknownVersion(Version),

    /// The tracker lists a version the registry does not know about
    #[error(
        "Applied migration '{name}' (version {version}) is not registered.\n\
         Suggestion: restore the unit, the history is append-only"
    )]
    MissingMigration { version: Version, name: String },

    /// The metadata table could not be read or written
    #[error("Schema state tracker unavailable: {message}")]
    TrackerUnavailable { message: String },

    /// Another run held the advisory lock for the whole timeout
    #[error(
        "Migration lock timeout: could not acquire the lock within {seconds} seconds.\n\
         Another process may be running migrations"
    )]
    LockTimeout { seconds: u64 },

    /// An applied unit no longer produces the changes it was applied with
    #[error(
        "Migration '{name}' (version {version}) has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch {
        version: Version,
        name: String,
        stored: String,
        current: String,
    },

    /// A unit failed; the run halted there
    #[error(
        "Migration '{name}' (version {version}) failed: {cause}{}",
        remediation(.rolled_back)
    )]
    MigrationFailed {
        version: Version,
        name: String,
        cause: String,
        /// Units that completed in this run before the failure
        completed: Vec<Version>,
        /// Whether the failed unit's partial effects were rolled back
        rolled_back: bool,
    },

    /// A revert reached a unit without a `down`
    #[error("Migration '{name}' (version {version}) cannot be reverted: it has no down transformation")]
    IrreversibleMigration { version: Version, name: String },

    /// A revert would drop tables or columns and was not confirmed
    #[error(
        "Reverting migration '{name}' (version {version}) would {change}.\n\
         Pass allow_destructive (--allow-destructive) to proceed"
    )]
    DestructiveRevert {
        version: Version,
        name: String,
        change: SchemaChange,
    },

    /// A unit's `down` does not restore the structure its `up` started from
    #[error("Migration '{name}' (version {version}) down does not invert up: {}", describe(.changes))]
    DownMismatch {
        version: Version,
        name: String,
        changes: Vec<SchemaChange>,
    },

    /// The live structure differs from what the applied units produce
    #[error("Schema drift detected: {}", describe(.changes))]
    DriftDetected { changes: Vec<SchemaChange> },

    /// The run was cancelled between units
    #[error("Migration run cancelled after {} unit(s)", .completed.len())]
    Cancelled { completed: Vec<Version> },

    /// A structural change did not fit, or the backend rejected it
    #[error(transparent)]
    Schema(#[from] KeelError),

    /// Snapshot file could not be read or written
    #[error("Snapshot file error: {0}")]
    Snapshot(#[from] std::io::Error),

    /// The run finished but its snapshot could not be regenerated or saved
    #[error(
        "Snapshot {} not written after {} unit(s) completed: {cause}",
        .path.display(),
        .completed.len()
    )]
    SnapshotNotWritten {
        path: PathBuf,
        cause: String,
        completed: Vec<Version>,
    },
}

impl MigrationError {
    /// Versions that completed before the run stopped, where known
    pub fn completed(&self) -> &[Version] {
        match self {
            MigrationError::MigrationFailed { completed, .. }
            | MigrationError::Cancelled { completed }
            | MigrationError::SnapshotNotWritten { completed, .. } => completed,
            _ => &[],
        }
    }

    pub(crate) fn tracker(error: KeelError) -> Self {
        MigrationError::TrackerUnavailable {
            message: error.to_string(),
        }
    }
}

fn remediation(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        " (rolled back)"
    } else {
        "\nThe unit was not rolled back; manual remediation is required before re-running"
    }
}

fn describe(changes: &[SchemaChange]) -> String {
    changes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn version(v: i64) -> Version {
        Version::new(v).unwrap()
    }

    #[test]
    fn test_failed_message_mentions_remediation() {
        let err = MigrationError::MigrationFailed {
            version: version(20180405124532),
            name: "add_reference_to_post_tags".into(),
            cause: "column already exists".into(),
            completed: vec![version(20180306153650)],
            rolled_back: false,
        };
        let message = err.to_string();
        assert!(message.contains("20180405124532"));
        assert!(message.contains("column already exists"));
        assert!(message.contains("manual remediation"));
        assert_eq!(err.completed(), &[version(20180306153650)]);
    }

    #[test]
    fn test_rolled_back_message() {
        let err = MigrationError::MigrationFailed {
            version: version(20180405124532),
            name: "add_reference_to_post_tags".into(),
            cause: "boom".into(),
            completed: vec![],
            rolled_back: true,
        };
        assert!(err.to_string().ends_with("(rolled back)"));
    }

    #[test]
    fn test_drift_lists_changes() {
        let err = MigrationError::DriftDetected {
            changes: vec![SchemaChange::AddColumn {
                table: "post_images".into(),
                column: Column::integer("position").default(0),
            }],
        };
        assert_eq!(
            err.to_string(),
            "Schema drift detected: add column post_images.position integer default 0"
        );
    }

    #[test]
    fn test_unwritten_snapshot_keeps_completed_units() {
        let err = MigrationError::SnapshotNotWritten {
            path: PathBuf::from("db/schema.json"),
            cause: "Not a directory".into(),
            completed: vec![version(20180306153650)],
        };
        assert_eq!(
            err.to_string(),
            "Snapshot db/schema.json not written after 1 unit(s) completed: Not a directory"
        );
        assert_eq!(err.completed(), &[version(20180306153650)]);
    }

    #[test]
    fn test_storage_errors_convert() {
        let err: MigrationError = KeelError::Schema("table posts does not exist".into()).into();
        assert!(matches!(err, MigrationError::Schema(_)));
        assert!(err.completed().is_empty());
    }
}
