//! Version tokens and run targets

use crate::migration::MigrationError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^m?(\d+)(?:_[a-z0-9_]+)?$").expect("version pattern is valid")
});

/// Orderable migration version
///
/// Versions are positive integers, conventionally `YYYYMMDDHHMMSS`. Ordering
/// is numeric and is the only dependency mechanism between units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Version(i64);

impl Version {
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` for zero or negative values.
    pub fn new(value: i64) -> Result<Self, MigrationError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(MigrationError::InvalidVersion(value.to_string()))
        }
    }

    /// Version for a unit generated at `at`
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let stamp = at.format("%Y%m%d%H%M%S").to_string();
        // Fourteen digits always fit in an i64
        Self(stamp.parse().unwrap_or(1))
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Version {
    type Error = MigrationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Version::new(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Accepts `20180306153650` and unit names such as `m20180306153650_create_posts`
impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = VERSION_TOKEN
            .captures(s.trim())
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| MigrationError::InvalidVersion(s.to_string()))?;
        let value = digits
            .as_str()
            .parse::<i64>()
            .map_err(|_| MigrationError::InvalidVersion(s.to_string()))?;
        Version::new(value)
    }
}

/// Where an apply or revert should leave the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every registered unit applied
    Latest,
    /// Every unit up to and including this version applied, none after it
    Version(Version),
    /// No unit applied
    Initial,
}

impl Target {
    /// Whether a unit at `version` belongs on the applied side of this target
    pub fn includes(self, version: Version) -> bool {
        match self {
            Target::Latest => true,
            Target::Version(target) => version <= target,
            Target::Initial => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => f.write_str("latest"),
            Target::Version(version) => write!(f, "{version}"),
            Target::Initial => f.write_str("initial"),
        }
    }
}
