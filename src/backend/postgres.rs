//! PostgreSQL backend
//!
//! Structural changes are rendered by [`change_to_sql`] and run through a
//! [`KeelExecutor`]. The tracker lives in a plain table in the same database
//! and runs are serialized with a session-level advisory lock, so the
//! executor must keep one connection for its whole lifetime.

use super::{SchemaBackend, StateStore};
use crate::config::{valid_identifier, MigrationSettings};
use crate::executor::{KeelError, KeelExecutor, PostgresExecutor};
use crate::migration::{state_table, MigrationRecord, Version};
use crate::schema::sql::change_to_sql;
use crate::schema::{Column, ColumnType, DefaultValue, Index, SchemaChange, SchemaSnapshot};

const TABLES_SQL: &str = "SELECT table_name::text
     FROM information_schema.tables
     WHERE table_schema = current_schema()
       AND table_type = 'BASE TABLE'
       AND table_name::text <> $1
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT c.table_name::text, c.column_name::text, c.data_type::text,
            c.is_nullable::text, c.column_default::text
     FROM information_schema.columns c
     JOIN information_schema.tables t
       ON t.table_schema = c.table_schema AND t.table_name = c.table_name
     WHERE c.table_schema = current_schema()
       AND t.table_type = 'BASE TABLE'
       AND c.table_name::text <> $1
     ORDER BY c.table_name, c.ordinal_position";

const INDEXES_SQL: &str = "SELECT t.relname::text, i.relname::text, ix.indisunique, a.attname::text
     FROM pg_index ix
     JOIN pg_class t ON t.oid = ix.indrelid
     JOIN pg_class i ON i.oid = ix.indexrelid
     JOIN pg_namespace n ON n.oid = t.relnamespace
     CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
     WHERE n.nspname = current_schema()
       AND NOT ix.indisprimary
       AND t.relname::text <> $1
     ORDER BY t.relname, i.relname, k.ord";

/// Both storage traits over one PostgreSQL session
pub struct PostgresDatabase {
    executor: Box<dyn KeelExecutor>,
    state_table: String,
    lock_key: i64,
}

impl PostgresDatabase {
    /// Wrap a connected client
    ///
    /// # Errors
    ///
    /// Returns `KeelError::Other` if the configured state table is not a
    /// plain identifier.
    pub fn new(client: ::postgres::Client, settings: &MigrationSettings) -> Result<Self, KeelError> {
        Self::with_executor(Box::new(PostgresExecutor::new(client)), settings)
    }

    pub fn with_executor(executor: Box<dyn KeelExecutor>, settings: &MigrationSettings) -> Result<Self, KeelError> {
        if !valid_identifier(&settings.state_table) {
            return Err(KeelError::Other(format!(
                "'{}' is not a valid state table name (lowercase letters, digits and underscores)",
                settings.state_table
            )));
        }
        Ok(Self {
            executor,
            state_table: settings.state_table.clone(),
            lock_key: settings.lock_key,
        })
    }

    pub fn executor(&self) -> &dyn KeelExecutor {
        self.executor.as_ref()
    }
}

impl SchemaBackend for PostgresDatabase {
    fn apply_change(&self, change: &SchemaChange) -> Result<(), KeelError> {
        let sql = change_to_sql(change);
        log::debug!("{sql}");
        self.executor.execute(&sql, &[])?;
        Ok(())
    }

    fn introspect(&self) -> Result<SchemaSnapshot, KeelError> {
        let mut snapshot = SchemaSnapshot::new();

        for row in self.executor.query_all(TABLES_SQL, &[&self.state_table])? {
            let table: String = row.try_get(0)?;
            snapshot.tables.entry(table).or_default();
        }

        for row in self.executor.query_all(COLUMNS_SQL, &[&self.state_table])? {
            let table: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            let data_type: String = row.try_get(2)?;
            let is_nullable: String = row.try_get(3)?;
            let default: Option<String> = row.try_get(4)?;

            let mut column = Column::new(name, column_type(&data_type)?);
            column.nullable = is_nullable == "YES";
            match default.as_deref() {
                Some(expr) if expr.starts_with("nextval(") => column.primary_key = true,
                Some(expr) => column.default = Some(parse_default(expr)),
                None => {}
            }
            snapshot.tables.entry(table).or_default().columns.push(column);
        }

        let mut indexes: Vec<(String, Index)> = Vec::new();
        for row in self.executor.query_all(INDEXES_SQL, &[&self.state_table])? {
            let table: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            let unique: bool = row.try_get(2)?;
            let column: String = row.try_get(3)?;

            match indexes.last_mut() {
                Some((t, index)) if *t == table && index.name == name => index.columns.push(column),
                _ => {
                    let mut index = Index::new(name, [column]);
                    index.unique = unique;
                    indexes.push((table, index));
                }
            }
        }
        for (table, index) in indexes {
            if let Some(schema) = snapshot.tables.get_mut(&table) {
                schema.indexes.push(index);
            }
        }
        // Catalog order follows the server collation
        for schema in snapshot.tables.values_mut() {
            schema.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(snapshot)
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn begin_unit(&self) -> Result<(), KeelError> {
        self.executor.execute("BEGIN", &[])?;
        Ok(())
    }

    fn commit_unit(&self) -> Result<(), KeelError> {
        self.executor.execute("COMMIT", &[])?;
        Ok(())
    }

    fn rollback_unit(&self) -> Result<(), KeelError> {
        self.executor.execute("ROLLBACK", &[])?;
        Ok(())
    }
}

impl StateStore for PostgresDatabase {
    fn ensure(&self) -> Result<(), KeelError> {
        state_table::initialize_state_table(self.executor(), &self.state_table)
    }

    fn applied(&self) -> Result<Vec<MigrationRecord>, KeelError> {
        state_table::query_applied(self.executor(), &self.state_table)
    }

    fn insert(&self, record: &MigrationRecord) -> Result<(), KeelError> {
        state_table::insert_record(self.executor(), &self.state_table, record)
    }

    fn remove(&self, version: Version) -> Result<(), KeelError> {
        state_table::remove_record(self.executor(), &self.state_table, version)
    }

    fn try_lock(&self) -> Result<bool, KeelError> {
        let row = self
            .executor
            .query_one("SELECT pg_try_advisory_lock($1)", &[&self.lock_key])?;
        Ok(row.try_get(0)?)
    }

    fn unlock(&self) -> Result<(), KeelError> {
        let row = self
            .executor
            .query_one("SELECT pg_advisory_unlock($1)", &[&self.lock_key])?;
        let released: bool = row.try_get(0)?;
        if !released {
            log::warn!("Advisory lock {} was not held by this session", self.lock_key);
        }
        Ok(())
    }
}

fn column_type(data_type: &str) -> Result<ColumnType, KeelError> {
    match data_type {
        "character varying" | "character" => Ok(ColumnType::String),
        "text" => Ok(ColumnType::Text),
        "integer" | "smallint" => Ok(ColumnType::Integer),
        "bigint" => Ok(ColumnType::BigInteger),
        "real" | "double precision" | "numeric" => Ok(ColumnType::Float),
        "boolean" => Ok(ColumnType::Boolean),
        "timestamp without time zone" | "timestamp with time zone" => Ok(ColumnType::DateTime),
        other => Err(KeelError::ParseError(format!("unsupported column type '{other}'"))),
    }
}

/// Turn a stored default expression back into a literal
///
/// PostgreSQL keeps defaults as expressions: `0`, `(-1)`, `false`,
/// `'draft'::character varying`.
fn parse_default(expr: &str) -> DefaultValue {
    let expr = expr.trim();
    match expr {
        "true" => return DefaultValue::Bool(true),
        "false" => return DefaultValue::Bool(false),
        _ => {}
    }

    if let Some((literal, cast)) = quoted_literal(expr) {
        let textual = cast.contains("char") || cast.contains("text");
        return match literal.parse::<i64>() {
            Ok(value) if !textual => DefaultValue::Int(value),
            _ => DefaultValue::Text(literal),
        };
    }

    let unwrapped = expr.trim_start_matches('(').trim_end_matches(')');
    match unwrapped.parse::<i64>() {
        Ok(value) => DefaultValue::Int(value),
        Err(_) => DefaultValue::Text(expr.to_string()),
    }
}

/// Split `'literal'::cast` into the unescaped literal and the cast
fn quoted_literal(expr: &str) -> Option<(String, &str)> {
    let rest = expr.strip_prefix('\'')?;
    let end = rest.rfind('\'')?;
    let cast = rest[end + 1..].trim_start_matches("::");
    Some((rest[..end].replace("''", "'"), cast))
}
