//! # Keel
//!
//! Versioned schema migrations for the content store: an ordered registry of
//! migration units, a tracker persisted next to the data, an applier that
//! moves the schema forward and back under an advisory lock, and a snapshot
//! generator used to detect drift.
//!
//! ```rust,no_run
//! use keel::backend::PostgresDatabase;
//! use keel::migration::{Migrator, Target};
//! use keel::{catalog, connect, KeelConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KeelConfig::load(None)?;
//! let client = connect(&config.database.connection_string())?;
//! let database = PostgresDatabase::new(client, &config.migrations)?;
//!
//! let migrator = Migrator::new(catalog::registry()?, &database, &database)
//!     .with_settings(&config.migrations);
//! let executed = migrator.apply(Target::Latest)?;
//! println!("applied {} migration(s)", executed.len());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod schema;

pub use config::{DatabaseConfig, KeelConfig, MigrationSettings, RevertPolicy};
pub use connection::{connect, ConnectionError};
pub use executor::{KeelError, KeelExecutor, PostgresExecutor};
