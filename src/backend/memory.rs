//! In-process database for dry runs and tests

use super::{SchemaBackend, StateStore};
use crate::executor::KeelError;
use crate::migration::{MigrationRecord, Version};
use crate::schema::{SchemaChange, SchemaSnapshot};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    schema: SchemaSnapshot,
    records: BTreeMap<Version, MigrationRecord>,
    locked: bool,
    tracker_unavailable: bool,
    savepoint: Option<(SchemaSnapshot, BTreeMap<Version, MigrationRecord>)>,
}

/// A database that lives in process memory
///
/// Holds a schema snapshot, the tracker rows and the run lock behind one
/// mutex, so it can be shared between threads through an `Arc`. By default
/// it behaves like an engine without transactional DDL; build it with
/// [`MemoryDatabase::transactional`] to have each unit commit or roll back as
/// a whole.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
    transactional: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A database whose units roll back on failure
    pub fn transactional() -> Self {
        Self {
            state: Mutex::default(),
            transactional: true,
        }
    }

    /// A database already holding `schema`, with no tracker rows
    pub fn with_schema(schema: SchemaSnapshot) -> Self {
        Self::from_state(schema, Vec::new())
    }

    /// A database holding `schema` with `records` already applied
    pub fn from_state(schema: SchemaSnapshot, records: Vec<MigrationRecord>) -> Self {
        let state = MemoryState {
            schema,
            records: records.into_iter().map(|r| (r.version, r)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
            transactional: false,
        }
    }

    /// Current structure
    pub fn schema(&self) -> Result<SchemaSnapshot, KeelError> {
        Ok(self.lock()?.schema.clone())
    }

    /// Tracker rows, ascending by version
    pub fn records(&self) -> Result<Vec<MigrationRecord>, KeelError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    pub fn is_locked(&self) -> bool {
        self.lock().map(|state| state.locked).unwrap_or(false)
    }

    /// Make every tracker operation fail until set back to `true`
    pub fn set_tracker_available(&self, available: bool) {
        if let Ok(mut state) = self.lock() {
            state.tracker_unavailable = !available;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, KeelError> {
        self.state
            .lock()
            .map_err(|e| KeelError::Other(format!("Memory database lock poisoned: {e}")))
    }

    fn tracker(&self) -> Result<MutexGuard<'_, MemoryState>, KeelError> {
        let state = self.lock()?;
        if state.tracker_unavailable {
            return Err(KeelError::QueryError("metadata table is unavailable".to_string()));
        }
        Ok(state)
    }
}

impl SchemaBackend for MemoryDatabase {
    fn apply_change(&self, change: &SchemaChange) -> Result<(), KeelError> {
        self.lock()?.schema.apply(change)
    }

    fn introspect(&self) -> Result<SchemaSnapshot, KeelError> {
        let mut schema = self.schema()?;
        schema.version = None;
        Ok(schema)
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.transactional
    }

    fn begin_unit(&self) -> Result<(), KeelError> {
        let mut state = self.lock()?;
        state.savepoint = Some((state.schema.clone(), state.records.clone()));
        Ok(())
    }

    fn commit_unit(&self) -> Result<(), KeelError> {
        self.lock()?.savepoint = None;
        Ok(())
    }

    fn rollback_unit(&self) -> Result<(), KeelError> {
        let mut state = self.lock()?;
        let (schema, records) = state
            .savepoint
            .take()
            .ok_or_else(|| KeelError::Other("no unit in progress".to_string()))?;
        state.schema = schema;
        state.records = records;
        Ok(())
    }
}

impl StateStore for MemoryDatabase {
    fn ensure(&self) -> Result<(), KeelError> {
        self.tracker().map(|_| ())
    }

    fn applied(&self) -> Result<Vec<MigrationRecord>, KeelError> {
        Ok(self.tracker()?.records.values().cloned().collect())
    }

    fn insert(&self, record: &MigrationRecord) -> Result<(), KeelError> {
        self.tracker()?
            .records
            .entry(record.version)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn remove(&self, version: Version) -> Result<(), KeelError> {
        self.tracker()?.records.remove(&version);
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, KeelError> {
        let mut state = self.tracker()?;
        if state.locked {
            return Ok(false);
        }
        state.locked = true;
        Ok(true)
    }

    fn unlock(&self) -> Result<(), KeelError> {
        self.lock()?.locked = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};
    use chrono::Utc;

    fn create_posts() -> SchemaChange {
        SchemaChange::CreateTable {
            table: Table::new("posts").column(Column::string("title")),
        }
    }

    #[test]
    fn test_rollback_restores_schema_and_records() {
        let database = MemoryDatabase::transactional();
        assert!(database.supports_transactional_ddl());

        database.begin_unit().unwrap();
        database.apply_change(&create_posts()).unwrap();
        database
            .insert(&MigrationRecord::new(Version::new(1).unwrap(), "create_posts", "x", Utc::now(), 0))
            .unwrap();
        database.rollback_unit().unwrap();

        assert!(database.schema().unwrap().is_empty());
        assert!(database.records().unwrap().is_empty());
    }

    #[test]
    fn test_commit_keeps_changes() {
        let database = MemoryDatabase::transactional();
        database.begin_unit().unwrap();
        database.apply_change(&create_posts()).unwrap();
        database.commit_unit().unwrap();
        assert!(database.rollback_unit().is_err());
        assert!(database.schema().unwrap().table("posts").is_some());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let database = MemoryDatabase::new();
        assert!(database.try_lock().unwrap());
        assert!(!database.try_lock().unwrap());
        database.unlock().unwrap();
        assert!(database.try_lock().unwrap());
    }

    #[test]
    fn test_unavailable_tracker_leaves_schema_usable() {
        let database = MemoryDatabase::new();
        database.set_tracker_available(false);
        assert!(database.applied().is_err());
        assert!(database.apply_change(&create_posts()).is_ok());

        database.set_tracker_available(true);
        assert!(database.applied().unwrap().is_empty());
    }
}
