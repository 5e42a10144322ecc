//! Metadata table management for PostgreSQL

use crate::executor::{KeelError, KeelExecutor};
use crate::migration::{MigrationRecord, Version};

/// DDL for the metadata table
///
/// `table` must already be validated as a plain identifier.
pub fn create_state_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL,
            execution_time_ms BIGINT
        )"
    )
}

/// Create the metadata table if it doesn't exist
pub fn initialize_state_table(executor: &dyn KeelExecutor, table: &str) -> Result<(), KeelError> {
    executor.execute(&create_state_table_sql(table), &[])?;
    Ok(())
}

/// Applied records, ascending by version
pub fn query_applied(executor: &dyn KeelExecutor, table: &str) -> Result<Vec<MigrationRecord>, KeelError> {
    let sql = format!(
        "SELECT version, name, checksum, applied_at, execution_time_ms
         FROM {table}
         ORDER BY version ASC"
    );

    executor
        .query_all(&sql, &[])?
        .iter()
        .map(MigrationRecord::from_row)
        .collect()
}

/// Insert a record; an existing version is left as it is
pub fn insert_record(executor: &dyn KeelExecutor, table: &str, record: &MigrationRecord) -> Result<(), KeelError> {
    let sql = format!(
        "INSERT INTO {table} (version, name, checksum, applied_at, execution_time_ms)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (version) DO NOTHING"
    );

    executor.execute(
        &sql,
        &[
            &record.version.get(),
            &record.name,
            &record.checksum,
            &record.applied_at,
            &record.execution_time_ms,
        ],
    )?;
    Ok(())
}

pub fn remove_record(executor: &dyn KeelExecutor, table: &str, version: Version) -> Result<(), KeelError> {
    let sql = format!("DELETE FROM {table} WHERE version = $1");
    executor.execute(&sql, &[&version.get()])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table_ddl() {
        let sql = create_state_table_sql("schema_migrations");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS schema_migrations"));
        assert!(sql.contains("version BIGINT PRIMARY KEY"));
        assert!(sql.contains("checksum VARCHAR(64)"));
        assert!(sql.contains("applied_at TIMESTAMPTZ"));
        assert!(sql.contains("execution_time_ms BIGINT"));
    }
}
