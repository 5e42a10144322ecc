//! Migration system for Keel
//!
//! This module provides the schema evolution machinery:
//! - the [`Migration`] trait and the [`SchemaManager`] units write through
//! - the [`MigrationRegistry`] of known units, ordered by [`Version`]
//! - the [`Tracker`] over the applied-version set and the run lock
//! - the [`Migrator`], which applies, reverts, regenerates and verifies
//!
//! # Example
//!
//! ```rust,no_run
//! use keel::migration::{Migration, SchemaManager};
//! use keel::schema::{Column, Index, Table};
//! use keel::KeelError;
//!
//! pub struct CreateInfluencers;
//!
//! impl Migration for CreateInfluencers {
//!     fn name(&self) -> &str {
//!         "create_influencers"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20180724142646
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
//!         manager.create_table(
//!             Table::new("influencers")
//!                 .column(Column::string("name"))
//!                 .timestamps(),
//!         )?;
//!         manager.add_index("influencers", Index::on("influencers", ["name"]))
//!     }
//!
//!     fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
//!         manager.drop_table("influencers")
//!     }
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod file;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod registry;
pub mod schema_manager;
pub mod startup;
pub mod state_table;
pub mod status;
pub mod tracker;
pub mod version;

pub use checksum::{calculate_checksum, unit_checksum, validate_checksum};
pub use error::MigrationError;
pub use file::MigrationFile;
pub use lock::MigrationLockGuard;
pub use migration::Migration;
pub use migrator::{Migrator, VerifyReport};
pub use record::MigrationRecord;
pub use registry::MigrationRegistry;
pub use schema_manager::SchemaManager;
pub use startup::startup_migrations;
pub use status::{MigrationStatus, PendingMigration};
pub use tracker::Tracker;
pub use version::{Target, Version};
