//! Structural diff between two snapshots

use super::{Index, SchemaChange, SchemaSnapshot, Table, TableSchema};
use std::collections::HashSet;

/// Changes that turn `from` into `to`
///
/// Order: new tables (with their indexes), then per existing table dropped
/// indexes, dropped columns, added columns and added indexes, then dropped
/// tables. A column whose definition changed appears as a drop followed by
/// an add; indexes over such a column are dropped and re-added around it.
/// The snapshot `version` is not compared.
pub fn diff(from: &SchemaSnapshot, to: &SchemaSnapshot) -> Vec<SchemaChange> {
    let mut changes = Vec::new();

    for (name, table) in &to.tables {
        if !from.tables.contains_key(name) {
            changes.push(SchemaChange::CreateTable {
                table: Table {
                    name: name.clone(),
                    columns: table.columns.clone(),
                },
            });
            changes.extend(table.indexes.iter().map(|index| SchemaChange::AddIndex {
                table: name.clone(),
                index: index.clone(),
            }));
        }
    }

    for (name, before) in &from.tables {
        if let Some(after) = to.tables.get(name) {
            diff_table(name, before, after, &mut changes);
        }
    }

    for name in from.tables.keys() {
        if !to.tables.contains_key(name) {
            changes.push(SchemaChange::DropTable { table: name.clone() });
        }
    }

    changes
}

fn diff_table(name: &str, before: &TableSchema, after: &TableSchema, changes: &mut Vec<SchemaChange>) {
    let replaced_columns: HashSet<&str> = before
        .columns
        .iter()
        .filter(|column| after.column(&column.name) != Some(*column))
        .map(|column| column.name.as_str())
        .collect();

    let index_survives = |index: &Index, other: &TableSchema| {
        other.index(&index.name) == Some(index)
            && !index.columns.iter().any(|c| replaced_columns.contains(c.as_str()))
    };

    for index in &before.indexes {
        if !index_survives(index, after) {
            changes.push(SchemaChange::DropIndex {
                table: name.to_string(),
                index: index.name.clone(),
            });
        }
    }

    for column in &before.columns {
        if replaced_columns.contains(column.name.as_str()) {
            changes.push(SchemaChange::DropColumn {
                table: name.to_string(),
                column: column.name.clone(),
            });
        }
    }

    for column in &after.columns {
        if before.column(&column.name) != Some(column) {
            changes.push(SchemaChange::AddColumn {
                table: name.to_string(),
                column: column.clone(),
            });
        }
    }

    for index in &after.indexes {
        if !index_survives(index, before) {
            changes.push(SchemaChange::AddIndex {
                table: name.to_string(),
                index: index.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn snapshot(changes: &[SchemaChange]) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new();
        snapshot.replay(changes).unwrap();
        snapshot
    }

    fn post_tags() -> Vec<SchemaChange> {
        vec![
            SchemaChange::CreateTable {
                table: Table::new("post_tags")
                    .column(Column::integer("post_id"))
                    .column(Column::string("name"))
                    .timestamps(),
            },
            SchemaChange::AddIndex {
                table: "post_tags".into(),
                index: Index::on("post_tags", ["post_id"]),
            },
        ]
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        let a = snapshot(&post_tags());
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_new_table_is_created_with_indexes() {
        let to = snapshot(&post_tags());
        let changes = diff(&SchemaSnapshot::new(), &to);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], SchemaChange::CreateTable { table } if table.name == "post_tags"));
        assert!(matches!(&changes[1], SchemaChange::AddIndex { index, .. } if index.name == "index_post_tags_on_post_id"));
    }

    #[test]
    fn test_added_column_reported() {
        let from = snapshot(&post_tags());
        let mut to = from.clone();
        to.apply(&SchemaChange::AddColumn {
            table: "post_tags".into(),
            column: Column::integer("post_image_id"),
        })
        .unwrap();

        assert_eq!(
            diff(&from, &to),
            vec![SchemaChange::AddColumn {
                table: "post_tags".into(),
                column: Column::integer("post_image_id"),
            }]
        );
        assert_eq!(
            diff(&to, &from),
            vec![SchemaChange::DropColumn {
                table: "post_tags".into(),
                column: "post_image_id".into(),
            }]
        );
    }

    #[test]
    fn test_changed_column_rebuilds_its_indexes() {
        let from = snapshot(&post_tags());
        let mut to = from.clone();
        let table = to.tables.get_mut("post_tags").unwrap();
        table.columns[1].column_type = ColumnType::BigInteger;

        let changes = diff(&from, &to);
        assert_eq!(changes.len(), 4, "{changes:?}");
        assert!(matches!(&changes[0], SchemaChange::DropIndex { .. }));
        assert!(matches!(&changes[1], SchemaChange::DropColumn { column, .. } if column == "post_id"));
        assert!(matches!(&changes[2], SchemaChange::AddColumn { column, .. } if column.name == "post_id"));
        assert!(matches!(&changes[3], SchemaChange::AddIndex { .. }));

        let mut replayed = from.clone();
        replayed.replay(&changes).unwrap();
        assert!(diff(&replayed, &to).is_empty());
    }

    #[test]
    fn test_dropped_table_comes_last() {
        let mut changes = post_tags();
        changes.push(SchemaChange::CreateTable {
            table: Table::new("influencers").column(Column::string("name")),
        });
        let from = snapshot(&changes);
        let to = snapshot(&[SchemaChange::CreateTable {
            table: Table::new("influencers")
                .column(Column::string("name"))
                .timestamps(),
        }]);

        let changes = diff(&from, &to);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.last(), Some(&SchemaChange::DropTable { table: "post_tags".into() }));
    }
}
