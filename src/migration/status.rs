//! Migration status reporting

use crate::migration::{MigrationRecord, Version};

/// Applied versus registered units
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Applied and registered, ascending
    pub applied: Vec<MigrationRecord>,

    /// Registered, unapplied, newer than the last applied unit
    pub pending: Vec<PendingMigration>,

    /// Registered, unapplied, older than the last applied unit
    pub out_of_order: Vec<PendingMigration>,

    /// Applied but no longer registered
    pub missing: Vec<MigrationRecord>,
}

/// A registered unit that has not been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: Version,
    pub name: String,
    pub reversible: bool,
}

impl MigrationStatus {
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.out_of_order.is_empty()
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<Version> {
        self.applied
            .iter()
            .chain(self.missing.iter())
            .map(|m| m.version)
            .max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<Version> {
        self.pending.first().map(|m| m.version)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn version(v: i64) -> Version {
        Version::new(v).unwrap()
    }

    #[test]
    fn test_empty_status_is_up_to_date() {
        let status = MigrationStatus::default();
        assert!(status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), None);
        assert_eq!(status.next_pending_version(), None);
    }

    #[test]
    fn test_latest_applied_includes_missing() {
        let status = MigrationStatus {
            applied: vec![MigrationRecord::new(version(1), "a", "x", Utc::now(), 0)],
            missing: vec![MigrationRecord::new(version(5), "gone", "y", Utc::now(), 0)],
            pending: vec![PendingMigration {
                version: version(6),
                name: "b".into(),
                reversible: true,
            }],
            ..MigrationStatus::default()
        };
        assert_eq!(status.latest_applied_version(), Some(version(5)));
        assert_eq!(status.next_pending_version(), Some(version(6)));
        assert!(!status.is_up_to_date());
        assert_eq!(status.applied_count(), 1);
        assert_eq!(status.pending_count(), 1);
    }
}
