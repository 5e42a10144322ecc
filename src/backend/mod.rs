//! Storage backends
//!
//! The migration machinery talks to storage through two traits:
//! [`SchemaBackend`] executes structural changes and reports the live
//! structure, [`StateStore`] persists tracker rows and provides the advisory
//! lock. [`PostgresDatabase`] implements both over one connection;
//! [`MemoryDatabase`] implements both in process.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryDatabase;
pub use self::postgres::PostgresDatabase;

use crate::executor::KeelError;
use crate::migration::{MigrationRecord, Version};
use crate::schema::{SchemaChange, SchemaSnapshot};

/// Executes structural changes against a database
pub trait SchemaBackend: Send + Sync {
    /// Apply one change
    ///
    /// # Errors
    ///
    /// Returns `KeelError` if the database rejects the change.
    fn apply_change(&self, change: &SchemaChange) -> Result<(), KeelError>;

    /// Read the live structure, excluding the tracker's own table
    ///
    /// # Errors
    ///
    /// Returns `KeelError` if the catalog cannot be read.
    fn introspect(&self) -> Result<SchemaSnapshot, KeelError>;

    /// Whether DDL can be rolled back, so a unit and its tracker row can
    /// commit together
    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn begin_unit(&self) -> Result<(), KeelError> {
        Ok(())
    }

    fn commit_unit(&self) -> Result<(), KeelError> {
        Ok(())
    }

    fn rollback_unit(&self) -> Result<(), KeelError> {
        Ok(())
    }
}

/// Persistent set of applied versions, plus the run lock
pub trait StateStore: Send + Sync {
    /// Create the metadata table if it does not exist
    fn ensure(&self) -> Result<(), KeelError>;

    /// Applied records, ascending by version
    fn applied(&self) -> Result<Vec<MigrationRecord>, KeelError>;

    /// Record an applied unit; recording an existing version is a no-op
    fn insert(&self, record: &MigrationRecord) -> Result<(), KeelError>;

    fn remove(&self, version: Version) -> Result<(), KeelError>;

    /// Try once to take the exclusive run lock
    fn try_lock(&self) -> Result<bool, KeelError>;

    fn unlock(&self) -> Result<(), KeelError>;
}
