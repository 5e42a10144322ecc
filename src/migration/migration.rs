//! Migration trait definition

use super::schema_manager::SchemaManager;
use crate::executor::KeelError;

/// A versioned, named unit of schema change
///
/// Units are compiled into the binary and registered explicitly. Once a unit
/// has been applied anywhere its `up` must not change: the tracker stores a
/// checksum of the structural changes it produced and refuses to continue
/// when they differ.
pub trait Migration: Send + Sync {
    /// Human-readable identifier, e.g. `create_posts`
    fn name(&self) -> &str;

    /// Version as a positive integer, conventionally `YYYYMMDDHHMMSS`
    fn version(&self) -> i64;

    /// Move the schema forward
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError>;

    /// Undo exactly what `up` did
    ///
    /// Units that cannot be reverted keep the default, which reports
    /// `KeelError::Irreversible`.
    fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        Err(KeelError::Irreversible)
    }
}
