//! Schema state tracker - the applied-version set

use crate::backend::StateStore;
use crate::migration::{MigrationError, MigrationRecord, Version};

/// Read and write access to the applied-version set
///
/// Thin over a [`StateStore`]; every storage failure becomes
/// `MigrationError::TrackerUnavailable` so a run never proceeds on a guess.
pub struct Tracker<'a> {
    store: &'a dyn StateStore,
}

impl<'a> Tracker<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self { store }
    }

    /// Create the metadata table if missing
    pub fn ensure(&self) -> Result<(), MigrationError> {
        self.store.ensure().map_err(MigrationError::tracker)
    }

    /// Applied records, ascending by version
    pub fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let mut records = self.store.applied().map_err(MigrationError::tracker)?;
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    pub fn is_applied(&self, version: Version) -> Result<bool, MigrationError> {
        Ok(self.applied()?.iter().any(|r| r.version == version))
    }

    /// Record `record` as applied; idempotent
    pub fn mark_applied(&self, record: &MigrationRecord) -> Result<(), MigrationError> {
        self.store.insert(record).map_err(MigrationError::tracker)
    }

    pub fn mark_reverted(&self, version: Version) -> Result<(), MigrationError> {
        self.store.remove(version).map_err(MigrationError::tracker)
    }
}
