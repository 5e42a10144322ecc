//! In-process migration execution helpers

use crate::backend::{SchemaBackend, StateStore};
use crate::config::MigrationSettings;
use crate::migration::{MigrationError, MigrationRegistry, Migrator, Target, Version};

/// Run migrations on application startup
///
/// Acquires the run lock, validates checksums of applied units and applies
/// everything pending. Meant to be called before a service starts serving:
/// if it fails, the service should not start.
///
/// - **First process wins:** the first process to start takes the lock and runs migrations
/// - **Other processes wait:** they poll for the lock, then find nothing pending
///
/// # Example
///
/// ```rust,no_run
/// use keel::backend::PostgresDatabase;
/// use keel::migration::startup_migrations;
/// use keel::{catalog, connect, KeelConfig};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = KeelConfig::load(None)?;
///     let database = PostgresDatabase::new(connect(&config.database.connection_string())?, &config.migrations)?;
///
///     startup_migrations(catalog::registry()?, &database, &database, &config.migrations)?;
///
///     // Continue with application startup...
///     Ok(())
/// }
/// ```
pub fn startup_migrations(
    registry: MigrationRegistry,
    backend: &dyn SchemaBackend,
    store: &dyn StateStore,
    settings: &MigrationSettings,
) -> Result<Vec<Version>, MigrationError> {
    let migrator = Migrator::new(registry, backend, store).with_settings(settings);
    let applied = migrator.apply(Target::Latest)?;

    if applied.is_empty() {
        log::debug!("No pending migrations to apply");
    } else {
        log::info!("Applied {} migration(s) on startup", applied.len());
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDatabase;
    use crate::catalog;

    #[test]
    fn test_startup_applies_catalog_once() {
        let database = MemoryDatabase::new();
        let settings = MigrationSettings::default();

        let first = startup_migrations(catalog::registry().unwrap(), &database, &database, &settings).unwrap();
        assert_eq!(first.len(), catalog::registry().unwrap().len());

        let second = startup_migrations(catalog::registry().unwrap(), &database, &database, &settings).unwrap();
        assert!(second.is_empty());
    }
}
