//! Structural schema model
//!
//! A [`SchemaChange`] is one structural operation on one table. Migrations
//! express themselves as a sequence of changes, a [`SchemaSnapshot`] is the
//! cumulative effect of replaying them, and [`diff`] turns two snapshots back
//! into the changes that separate them.

pub mod diff;
pub mod snapshot;
pub mod sql;

pub use diff::diff;
pub use snapshot::{SchemaSnapshot, TableSchema};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column storage types used by the content store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Text,
    Integer,
    BigInteger,
    Float,
    Boolean,
    DateTime,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "bigint",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// Literal column default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Bool(v) => write!(f, "{v}"),
            DefaultValue::Int(v) => write!(f, "{v}"),
            DefaultValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "nullable_by_default")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
}

fn nullable_by_default() -> bool {
    true
}

impl Column {
    /// A nullable column without a default
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    /// Auto-incrementing `bigint` primary key
    pub fn id() -> Self {
        Self {
            name: "id".to_string(),
            column_type: ColumnType::BigInteger,
            nullable: false,
            default: None,
            primary_key: true,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::BigInteger)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// `created_at` and `updated_at`, both required
    pub fn timestamps() -> [Column; 2] {
        [
            Column::date_time("created_at").not_null(),
            Column::date_time("updated_at").not_null(),
        ]
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Bool(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Int(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Int(i64::from(value))
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::Text(value.to_string())
    }
}

/// A secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Index named after its table and columns: `index_posts_on_deleted_and_published`
    pub fn on<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = format!("index_{}_on_{}", table, columns.join("_and_"));
        Self {
            name,
            columns,
            unique: false,
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Definition of a table at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// A table with the conventional `id` primary key
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![Column::id()],
        }
    }

    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn timestamps(mut self) -> Self {
        self.columns.extend(Column::timestamps());
        self
    }
}

/// One structural operation on one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaChange {
    CreateTable { table: Table },
    DropTable { table: String },
    AddColumn { table: String, column: Column },
    DropColumn { table: String, column: String },
    AddIndex { table: String, index: Index },
    DropIndex { table: String, index: String },
}

impl SchemaChange {
    /// The table this change targets
    pub fn table(&self) -> &str {
        match self {
            SchemaChange::CreateTable { table } => &table.name,
            SchemaChange::DropTable { table }
            | SchemaChange::AddColumn { table, .. }
            | SchemaChange::DropColumn { table, .. }
            | SchemaChange::AddIndex { table, .. }
            | SchemaChange::DropIndex { table, .. } => table,
        }
    }

    /// Whether applying this change can destroy stored data
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            SchemaChange::DropTable { .. } | SchemaChange::DropColumn { .. }
        )
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::CreateTable { table } => {
                write!(f, "create table {} ({} columns)", table.name, table.columns.len())
            }
            SchemaChange::DropTable { table } => write!(f, "drop table {table}"),
            SchemaChange::AddColumn { table, column } => {
                write!(f, "add column {}.{} {}", table, column.name, column.column_type)?;
                if !column.nullable {
                    f.write_str(" not null")?;
                }
                if let Some(default) = &column.default {
                    write!(f, " default {default}")?;
                }
                Ok(())
            }
            SchemaChange::DropColumn { table, column } => {
                write!(f, "drop column {table}.{column}")
            }
            SchemaChange::AddIndex { table, index } => write!(
                f,
                "add {}index {} on {} ({})",
                if index.unique { "unique " } else { "" },
                index.name,
                table,
                index.columns.join(", ")
            ),
            SchemaChange::DropIndex { table, index } => {
                write!(f, "drop index {index} on {table}")
            }
        }
    }
}
