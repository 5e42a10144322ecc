//! Configuration for the database connection and migration runs.
//!
//! Settings come from `config/config.toml` (optional) overlaid by environment
//! variables prefixed with `KEEL_`, using `__` between nested keys:
//!
//! ```toml
//! [database]
//! host = "localhost"
//! name = "content"
//!
//! [migrations]
//! lock_timeout_seconds = 60
//! snapshot_path = "db/schema.json"
//! revert_policy = "require_confirmation"
//! ```
//!
//! `KEEL_DATABASE__URL=postgres://...` overrides the assembled URL.

use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const DEFAULT_CONFIG_FILE: &str = "config/config.toml";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

/// Whether `name` can be interpolated into SQL as a bare identifier
///
/// Lowercase only: PostgreSQL folds unquoted names, and the folded name must
/// match the one compared against the catalog.
pub(crate) fn valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Root configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct KeelConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrations: MigrationSettings,
}

/// Database connection settings
///
/// Either a full `url` or its parts; `url` wins when both are present.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database_name")]
    pub name: String,
}

/// What a revert may do when a `down` drops tables or columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevertPolicy {
    /// Refuse destructive reverts unless the caller explicitly allows them
    #[default]
    RequireConfirmation,
    /// Run destructive reverts without confirmation
    Destroy,
}

/// Migration run settings
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    /// Name of the metadata table holding applied versions
    #[serde(default = "default_state_table")]
    pub state_table: String,
    /// Key for the PostgreSQL advisory lock serializing runs
    #[serde(default = "default_lock_key")]
    pub lock_key: i64,
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    /// Where the regenerated snapshot is written after each run
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Apply units older than the last applied version instead of skipping them
    #[serde(default)]
    pub allow_out_of_order: bool,
    #[serde(default)]
    pub revert_policy: RevertPolicy,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_username() -> String {
    "postgres".to_string()
}

fn default_database_name() -> String {
    "content".to_string()
}

fn default_state_table() -> String {
    "schema_migrations".to_string()
}

fn default_lock_key() -> i64 {
    // "keel" in ASCII
    0x6b65_656c
}

fn default_lock_timeout_seconds() -> u64 {
    60
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
            name: default_database_name(),
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            state_table: default_state_table(),
            lock_key: default_lock_key(),
            lock_timeout_seconds: default_lock_timeout_seconds(),
            snapshot_path: None,
            allow_out_of_order: false,
            revert_policy: RevertPolicy::default(),
        }
    }
}

impl DatabaseConfig {
    /// The connection string, either `url` as given or assembled from parts
    pub fn connection_string(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.name
        )
    }
}

impl KeelConfig {
    /// Load configuration from `path` (or `config/config.toml`) and `KEEL_*` env vars.
    ///
    /// A missing file is not an error. A file that exists but cannot be
    /// parsed is logged and ignored in favour of the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let environment = || {
            Environment::with_prefix("KEEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
        };

        let settings = match Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(environment())
            .build()
        {
            Ok(settings) => settings,
            Err(err) => {
                if file.exists() {
                    log::warn!(
                        "Failed to load {}, falling back to environment: {}",
                        file.display(),
                        err
                    );
                }
                Config::builder().add_source(environment()).build()?
            }
        };

        let config: KeelConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would be interpolated into SQL unsafely or make runs hang
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_identifier(&self.migrations.state_table) {
            return Err(ConfigError::Message(format!(
                "migrations.state_table '{}' is not a lowercase identifier",
                self.migrations.state_table
            )));
        }
        if self.migrations.lock_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "migrations.lock_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
