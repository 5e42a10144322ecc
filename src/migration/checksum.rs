//! Checksums over the structural changes of a unit

use crate::executor::KeelError;
use crate::migration::{Migration, MigrationError, MigrationRecord, SchemaManager, Version};
use crate::schema::SchemaChange;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical JSON form of `changes`, hex encoded
///
/// # Errors
///
/// Returns `KeelError::Other` if the changes cannot be serialized.
pub fn calculate_checksum(changes: &[SchemaChange]) -> Result<String, KeelError> {
    let canonical = serde_json::to_vec(changes)
        .map_err(|e| KeelError::Other(format!("Failed to serialize changes: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checksum of what `migration.up` produces, computed without a database
///
/// # Errors
///
/// Returns `MigrationError::Schema` if the unit's `up` itself fails.
pub fn unit_checksum(migration: &dyn Migration) -> Result<String, MigrationError> {
    let manager = SchemaManager::recording();
    migration.up(&manager)?;
    Ok(calculate_checksum(&manager.into_changes())?)
}

/// Compare a stored checksum with the one the unit produces now
///
/// # Errors
///
/// Returns `MigrationError::ChecksumMismatch` when they differ.
pub fn validate_checksum(record: &MigrationRecord, current: &str) -> Result<(), MigrationError> {
    if record.checksum == current {
        Ok(())
    } else {
        Err(mismatch(record.version, &record.name, &record.checksum, current))
    }
}

fn mismatch(version: Version, name: &str, stored: &str, current: &str) -> MigrationError {
    MigrationError::ChecksumMismatch {
        version,
        name: name.to_string(),
        stored: stored.to_string(),
        current: current.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use chrono::Utc;

    fn add_reference() -> Vec<SchemaChange> {
        vec![
            SchemaChange::AddColumn {
                table: "post_tags".into(),
                column: Column::big_integer("reference_id"),
            },
            SchemaChange::AddColumn {
                table: "post_tags".into(),
                column: Column::string("reference_type"),
            },
        ]
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let first = calculate_checksum(&add_reference()).unwrap();
        let second = calculate_checksum(&add_reference()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_depends_on_order() {
        let mut reversed = add_reference();
        reversed.reverse();
        assert_ne!(
            calculate_checksum(&add_reference()).unwrap(),
            calculate_checksum(&reversed).unwrap()
        );
    }

    #[test]
    fn test_validate_checksum() {
        let checksum = calculate_checksum(&add_reference()).unwrap();
        let record = MigrationRecord::new(
            Version::new(20180405124532).unwrap(),
            "add_reference_to_post_tags",
            checksum.clone(),
            Utc::now(),
            3,
        );
        assert!(validate_checksum(&record, &checksum).is_ok());

        match validate_checksum(&record, "0000") {
            Err(MigrationError::ChecksumMismatch { stored, current, .. }) => {
                assert_eq!(stored, checksum);
                assert_eq!(current, "0000");
            }
            other => panic!("Expected ChecksumMismatch, got {other:?}"),
        }
    }
}
