//! `SchemaSnapshot` - the cumulative structural effect of applied migrations

use super::{Column, Index, SchemaChange, Table};
use crate::executor::KeelError;
use crate::migration::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Columns and indexes of one table
///
/// Columns keep their physical order; indexes are kept sorted by name so
/// that two snapshots of the same structure compare equal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn insert_index(&mut self, index: Index) {
        let position = self
            .indexes
            .binary_search_by(|i| i.name.cmp(&index.name))
            .unwrap_or_else(|p| p);
        self.indexes.insert(position, index);
    }
}

/// Table name → structure, plus the version it reflects
///
/// Replay is strict: a change that does not fit the current structure is an
/// error rather than a no-op, so a snapshot can only be produced by a history
/// that is itself consistent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .is_some_and(|t| t.column(column).is_some())
    }

    /// Apply one change in place
    ///
    /// # Errors
    ///
    /// Returns `KeelError::Schema` when the change does not fit; the snapshot
    /// is left untouched in that case.
    pub fn apply(&mut self, change: &SchemaChange) -> Result<(), KeelError> {
        match change {
            SchemaChange::CreateTable { table } => self.create_table(table),
            SchemaChange::DropTable { table } => self
                .tables
                .remove(table)
                .map(|_| ())
                .ok_or_else(|| schema_error(format!("table {table} does not exist"))),
            SchemaChange::AddColumn { table, column } => {
                let schema = self.table_mut(table)?;
                if schema.column(&column.name).is_some() {
                    return Err(schema_error(format!(
                        "column {}.{} already exists",
                        table, column.name
                    )));
                }
                schema.columns.push(column.clone());
                Ok(())
            }
            SchemaChange::DropColumn { table, column } => {
                let schema = self.table_mut(table)?;
                let position = schema
                    .columns
                    .iter()
                    .position(|c| &c.name == column)
                    .ok_or_else(|| {
                        schema_error(format!("column {table}.{column} does not exist"))
                    })?;
                schema.columns.remove(position);
                // Indexes over a dropped column go with it
                schema.indexes.retain(|i| !i.columns.contains(column));
                Ok(())
            }
            SchemaChange::AddIndex { table, index } => self.add_index(table, index),
            SchemaChange::DropIndex { table, index } => {
                let schema = self.table_mut(table)?;
                let position = schema
                    .indexes
                    .iter()
                    .position(|i| &i.name == index)
                    .ok_or_else(|| {
                        schema_error(format!("index {index} on {table} does not exist"))
                    })?;
                schema.indexes.remove(position);
                Ok(())
            }
        }
    }

    /// Apply a sequence of changes, stopping at the first that does not fit
    pub fn replay<'a>(
        &mut self,
        changes: impl IntoIterator<Item = &'a SchemaChange>,
    ) -> Result<(), KeelError> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    /// Read a snapshot written by [`SchemaSnapshot::save`]
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write the snapshot as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        content.push('\n');
        fs::write(path, content)
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableSchema, KeelError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| schema_error(format!("table {table} does not exist")))
    }

    fn create_table(&mut self, table: &Table) -> Result<(), KeelError> {
        if self.tables.contains_key(&table.name) {
            return Err(schema_error(format!("table {} already exists", table.name)));
        }
        let mut schema = TableSchema::default();
        for column in &table.columns {
            if schema.column(&column.name).is_some() {
                return Err(schema_error(format!(
                    "column {}.{} declared twice",
                    table.name, column.name
                )));
            }
            schema.columns.push(column.clone());
        }
        self.tables.insert(table.name.clone(), schema);
        Ok(())
    }

    fn add_index(&mut self, table: &str, index: &Index) -> Result<(), KeelError> {
        // Index names share one namespace across the schema
        if let Some((owner, _)) = self
            .tables
            .iter()
            .find(|(_, t)| t.index(&index.name).is_some())
        {
            return Err(schema_error(format!(
                "index {} already exists on {}",
                index.name, owner
            )));
        }
        if index.columns.is_empty() {
            return Err(schema_error(format!("index {} has no columns", index.name)));
        }
        let schema = self.table_mut(table)?;
        if let Some(missing) = index.columns.iter().find(|c| schema.column(c).is_none()) {
            return Err(schema_error(format!(
                "index {} references missing column {}.{}",
                index.name, table, missing
            )));
        }
        schema.insert_index(index.clone());
        Ok(())
    }
}

fn schema_error(message: String) -> KeelError {
    KeelError::Schema(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn posts() -> SchemaChange {
        SchemaChange::CreateTable {
            table: Table::new("posts")
                .column(Column::string("title"))
                .column(Column::boolean("deleted").default(false))
                .column(Column::boolean("published").default(false)),
        }
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        assert_eq!(
            snapshot.table("posts").unwrap().column_names(),
            vec!["id", "title", "deleted", "published"]
        );

        snapshot
            .apply(&SchemaChange::DropTable { table: "posts".into() })
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_create_existing_table_fails() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        let err = snapshot.apply(&posts()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_add_column_to_missing_table_fails() {
        let mut snapshot = SchemaSnapshot::new();
        let err = snapshot
            .apply(&SchemaChange::AddColumn {
                table: "post_tags".into(),
                column: Column::big_integer("reference_id"),
            })
            .unwrap_err();
        assert!(matches!(err, KeelError::Schema(_)));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_index_requires_existing_columns() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        let err = snapshot
            .apply(&SchemaChange::AddIndex {
                table: "posts".into(),
                index: Index::on("posts", ["influencer_id", "deleted"]),
            })
            .unwrap_err();
        assert!(err.to_string().contains("influencer_id"));
    }

    #[test]
    fn test_index_names_are_schema_wide() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        snapshot
            .apply(&SchemaChange::CreateTable {
                table: Table::new("influencers").column(Column::string("title")),
            })
            .unwrap();
        let index = Index::new("index_on_title", ["title"]);
        snapshot
            .apply(&SchemaChange::AddIndex { table: "posts".into(), index: index.clone() })
            .unwrap();
        assert!(snapshot
            .apply(&SchemaChange::AddIndex { table: "influencers".into(), index })
            .is_err());
    }

    #[test]
    fn test_drop_column_drops_dependent_indexes() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        snapshot
            .apply(&SchemaChange::AddIndex {
                table: "posts".into(),
                index: Index::on("posts", ["deleted", "published"]),
            })
            .unwrap();
        snapshot
            .apply(&SchemaChange::DropColumn {
                table: "posts".into(),
                column: "published".into(),
            })
            .unwrap();
        assert!(snapshot.table("posts").unwrap().indexes.is_empty());
    }

    #[test]
    fn test_indexes_sorted_by_name() {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        for index in [Index::new("z_idx", ["title"]), Index::new("a_idx", ["deleted"])] {
            snapshot
                .apply(&SchemaChange::AddIndex { table: "posts".into(), index })
                .unwrap();
        }
        let names: Vec<_> = snapshot.table("posts").unwrap().indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a_idx", "z_idx"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("schema.json");

        let mut snapshot = SchemaSnapshot::new();
        snapshot.apply(&posts()).unwrap();
        snapshot.version = Some(Version::new(20180306153650).unwrap());
        snapshot.save(&path).unwrap();

        let loaded = SchemaSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }
}
