//! SchemaManager - the surface migrations use to change the schema

use crate::backend::SchemaBackend;
use crate::executor::KeelError;
use crate::schema::{Column, Index, SchemaChange, Table};
use std::cell::RefCell;

/// Records and dispatches the structural changes a unit makes
///
/// Every call is turned into a [`SchemaChange`], handed to the backend and
/// recorded. The recorded list is what the tracker checksums and what the
/// snapshot generator replays. A manager built with [`SchemaManager::recording`]
/// has no backend and only records, which lets a unit be inspected without
/// touching any database.
pub struct SchemaManager<'a> {
    backend: Option<&'a dyn SchemaBackend>,
    changes: RefCell<Vec<SchemaChange>>,
}

impl<'a> SchemaManager<'a> {
    /// Create a manager that applies changes to `backend`
    pub fn new(backend: &'a dyn SchemaBackend) -> Self {
        Self {
            backend: Some(backend),
            changes: RefCell::new(Vec::new()),
        }
    }

    /// Create a manager that records changes without applying them
    pub fn recording() -> SchemaManager<'static> {
        SchemaManager {
            backend: None,
            changes: RefCell::new(Vec::new()),
        }
    }

    /// Apply one change and record it
    ///
    /// # Errors
    ///
    /// Returns the backend's error; the change is not recorded in that case.
    pub fn apply(&self, change: SchemaChange) -> Result<(), KeelError> {
        if let Some(backend) = self.backend {
            log::debug!("{}", change);
            backend.apply_change(&change)?;
        }
        self.changes.borrow_mut().push(change);
        Ok(())
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// # use keel::migration::SchemaManager;
    /// use keel::schema::{Column, Table};
    ///
    /// # fn run(manager: &SchemaManager<'_>) -> Result<(), keel::KeelError> {
    /// manager.create_table(
    ///     Table::new("influencers")
    ///         .column(Column::string("name"))
    ///         .timestamps(),
    /// )?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: Table) -> Result<(), KeelError> {
        self.apply(SchemaChange::CreateTable { table })
    }

    pub fn drop_table(&self, table: &str) -> Result<(), KeelError> {
        self.apply(SchemaChange::DropTable {
            table: table.to_string(),
        })
    }

    /// Add a column to an existing table
    pub fn add_column(&self, table: &str, column: Column) -> Result<(), KeelError> {
        self.apply(SchemaChange::AddColumn {
            table: table.to_string(),
            column,
        })
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Result<(), KeelError> {
        self.apply(SchemaChange::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    /// Create an index
    ///
    /// # Example
    /// ```rust,no_run
    /// # use keel::migration::SchemaManager;
    /// use keel::schema::Index;
    ///
    /// # fn run(manager: &SchemaManager<'_>) -> Result<(), keel::KeelError> {
    /// manager.add_index("post_likes", Index::on("post_likes", ["post_id", "bukalapak_user_id"]).unique())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_index(&self, table: &str, index: Index) -> Result<(), KeelError> {
        self.apply(SchemaChange::AddIndex {
            table: table.to_string(),
            index,
        })
    }

    pub fn drop_index(&self, table: &str, index: &str) -> Result<(), KeelError> {
        self.apply(SchemaChange::DropIndex {
            table: table.to_string(),
            index: index.to_string(),
        })
    }

    /// Changes applied so far, in order
    pub fn changes(&self) -> Vec<SchemaChange> {
        self.changes.borrow().clone()
    }

    pub fn into_changes(self) -> Vec<SchemaChange> {
        self.changes.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDatabase;

    #[test]
    fn test_recording_manager_only_records() {
        let manager = SchemaManager::recording();
        manager.add_column("post_tags", Column::big_integer("reference_id")).unwrap();
        manager.drop_index("posts", "index_posts_on_deleted_and_published").unwrap();

        let changes = manager.into_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].table(), "post_tags");
    }

    #[test]
    fn test_failed_change_is_not_recorded() {
        let database = MemoryDatabase::new();
        let manager = SchemaManager::new(&database);
        manager
            .create_table(Table::new("influencers").column(Column::string("name")))
            .unwrap();
        let err = manager
            .add_column("posts", Column::integer("influencer_id"))
            .unwrap_err();
        assert!(matches!(err, KeelError::Schema(_)));
        assert_eq!(manager.changes().len(), 1);
        assert!(database.schema().unwrap().table("influencers").is_some());
    }
}
