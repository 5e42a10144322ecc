//! Migration registry - the ordered set of known units

use crate::migration::{Migration, MigrationError, Version};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered set of migration units, keyed by version
///
/// The registry is an ordinary value: build one, hand it to a
/// [`Migrator`](crate::migration::Migrator), and drop it. Units are always
/// listed in ascending version order regardless of registration order.
#[derive(Default)]
pub struct MigrationRegistry {
    units: BTreeMap<Version, Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` if the unit's version is not
    /// positive, and `MigrationError::DuplicateVersion` if another unit
    /// already uses it. The registry is unchanged on error.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
        let version = Version::new(migration.version())?;

        if self.units.contains_key(&version) {
            return Err(MigrationError::DuplicateVersion {
                version,
                name: migration.name().to_string(),
            });
        }

        self.units.insert(version, migration);
        Ok(())
    }

    /// Builder form of [`MigrationRegistry::register`]
    ///
    /// # Errors
    ///
    /// Same as [`MigrationRegistry::register`].
    pub fn with(mut self, migration: impl Migration + 'static) -> Result<Self, MigrationError> {
        self.register(Box::new(migration))?;
        Ok(self)
    }

    pub fn get(&self, version: Version) -> Option<&dyn Migration> {
        self.units.get(&version).map(|m| m.as_ref())
    }

    pub fn contains(&self, version: Version) -> bool {
        self.units.contains_key(&version)
    }

    /// All units, ascending by version
    pub fn list_units(&self) -> impl DoubleEndedIterator<Item = (Version, &dyn Migration)> + '_ {
        self.units.iter().map(|(v, m)| (*v, m.as_ref()))
    }

    /// Registered versions, ascending
    pub fn versions(&self) -> Vec<Version> {
        self.units.keys().copied().collect()
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.units.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.units.iter().map(|(v, m)| (v, m.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::KeelError;
    use crate::migration::SchemaManager;

    /// Simple test migration implementation
    struct TestMigration {
        version: i64,
        name: String,
    }

    impl TestMigration {
        fn new(version: i64, name: impl Into<String>) -> Self {
            Self {
                version,
                name: name.into(),
            }
        }
    }

    impl Migration for TestMigration {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), KeelError> {
            Ok(())
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_register_migration_success() {
        let mut registry = MigrationRegistry::new();
        registry
            .register(Box::new(TestMigration::new(20180306153650, "create_posts")))
            .expect("Should successfully register migration");

        let version = Version::new(20180306153650).expect("valid version");
        assert!(registry.contains(version));
        assert_eq!(registry.get(version).map(|m| m.name()), Some("create_posts"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_register_duplicate_returns_duplicate_version() {
        let mut registry = MigrationRegistry::new();
        registry
            .register(Box::new(TestMigration::new(20180306153650, "create_posts")))
            .expect("First registration should succeed");

        let result = registry.register(Box::new(TestMigration::new(20180306153650, "create_posts_again")));

        #[allow(clippy::unwrap_used)] // Test code - unwrap_err is acceptable
        match result.unwrap_err() {
            MigrationError::DuplicateVersion { version, name } => {
                assert_eq!(version.get(), 20180306153650, "Error should contain correct version");
                assert_eq!(name, "create_posts_again", "Error should name the rejected unit");
            }
            #[allow(clippy::panic)] // Test code - panic is acceptable
            other => panic!("Expected DuplicateVersion, got {other:?}"),
        }

        // The first registration is untouched
        let version = Version::new(20180306153650).expect("valid version");
        assert_eq!(registry.get(version).map(|m| m.name()), Some("create_posts"));
    }

    #[test]
    fn test_register_rejects_non_positive_version() {
        let mut registry = MigrationRegistry::new();
        let result = registry.register(Box::new(TestMigration::new(0, "zero")));
        assert!(matches!(result, Err(MigrationError::InvalidVersion(_))));
        assert!(registry.is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_units_listed_ascending_regardless_of_registration_order() {
        let registry = MigrationRegistry::new()
            .with(TestMigration::new(20180405124532, "add_reference_to_post_tags"))
            .and_then(|r| r.with(TestMigration::new(20180306153650, "create_posts")))
            .and_then(|r| r.with(TestMigration::new(20180307194030, "create_post_tags")))
            .expect("registration should succeed");

        let names: Vec<_> = registry.list_units().map(|(_, m)| m.name()).collect();
        assert_eq!(
            names,
            vec!["create_posts", "create_post_tags", "add_reference_to_post_tags"]
        );
        assert_eq!(
            registry.latest_version().map(Version::get),
            Some(20180405124532)
        );
        assert_eq!(
            registry.versions().iter().map(|v| v.get()).collect::<Vec<_>>(),
            vec![20180306153650, 20180307194030, 20180405124532]
        );
    }

    #[test]
    fn test_registries_are_independent() {
        let mut first = MigrationRegistry::new();
        let mut second = MigrationRegistry::new();
        assert!(first.register(Box::new(TestMigration::new(1, "a"))).is_ok());
        assert!(second.register(Box::new(TestMigration::new(1, "a"))).is_ok());
        assert!(first.get(Version::new(1).unwrap()).is_some());
    }
}
