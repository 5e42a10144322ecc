//! `MigrationRecord` - one row of the metadata table

use crate::executor::KeelError;
use crate::migration::Version;
use chrono::{DateTime, Utc};
use postgres::Row;
use serde::{Deserialize, Serialize};

/// An applied unit as recorded by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: Version,

    pub name: String,

    /// `SHA-256` of the structural changes the unit's `up` produced
    pub checksum: String,

    pub applied_at: DateTime<Utc>,

    pub execution_time_ms: i64,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        version: Version,
        name: impl Into<String>,
        checksum: impl Into<String>,
        applied_at: DateTime<Utc>,
        execution_time_ms: i64,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            checksum: checksum.into(),
            applied_at,
            execution_time_ms,
        }
    }

    /// Build a record from a metadata table row
    ///
    /// Expected column order: `version`, `name`, `checksum`, `applied_at`, `execution_time_ms`
    ///
    /// # Errors
    ///
    /// Returns `KeelError::ParseError` if a column is missing, has the wrong type,
    /// or the version is not positive.
    pub fn from_row(row: &Row) -> Result<Self, KeelError> {
        let parse = |e: postgres::Error| KeelError::ParseError(e.to_string());

        let version: i64 = row.try_get(0).map_err(parse)?;
        let version =
            Version::new(version).map_err(|e| KeelError::ParseError(e.to_string()))?;
        let execution_time_ms: Option<i64> = row.try_get(4).map_err(parse)?;

        Ok(Self {
            version,
            name: row.try_get(1).map_err(parse)?,
            checksum: row.try_get(2).map_err(parse)?,
            applied_at: row.try_get(3).map_err(parse)?,
            execution_time_ms: execution_time_ms.unwrap_or_default(),
        })
    }
}
