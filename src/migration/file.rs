//! Unit source files: naming and the template written by `keel-migrate new`

use crate::migration::{MigrationError, Version};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^m(\d{14})_([a-z0-9_]+)\.rs$").expect("file name pattern is valid"));

static UNIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("unit name pattern is valid"));

/// A unit's source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub path: PathBuf,
    pub version: Version,
    pub name: String,
}

impl MigrationFile {
    /// The file for a new unit `name` at `version` inside `dir`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidName` if `name` is not snake_case.
    pub fn new(dir: &Path, version: Version, name: &str) -> Result<Self, MigrationError> {
        if !UNIT_NAME.is_match(name) {
            return Err(MigrationError::InvalidName(format!(
                "'{name}' must be snake_case"
            )));
        }
        Ok(Self {
            path: dir.join(format!("m{version}_{name}.rs")),
            version,
            name: name.to_string(),
        })
    }

    /// Parse a unit file name
    ///
    /// Expected format: `m{YYYYMMDDHHMMSS}_{name}.rs`
    ///
    /// # Example
    /// - `m20180306153650_create_posts.rs` → version: 20180306153650, name: "create_posts"
    pub fn parse_filename(filename: &str) -> Result<(Version, String), MigrationError> {
        let caps = FILE_NAME.captures(filename).ok_or_else(|| {
            MigrationError::InvalidName(format!(
                "'{filename}' does not match m{{YYYYMMDDHHMMSS}}_{{name}}.rs"
            ))
        })?;
        let version = caps[1].parse::<Version>()?;
        Ok((version, caps[2].to_string()))
    }

    /// Rust struct name for the unit, e.g. `CreatePosts`
    pub fn struct_name(&self) -> String {
        self.name
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// Module name for the unit, e.g. `m20180306153650_create_posts`
    pub fn module_name(&self) -> String {
        format!("m{}_{}", self.version, self.name)
    }

    /// Source for an empty unit, ready to be filled in and registered
    pub fn render(&self) -> String {
        format!(
            r#"use keel::migration::{{Migration, SchemaManager}};
use keel::KeelError;

pub struct {struct_name};

impl Migration for {struct_name} {{
    fn name(&self) -> &str {{
        "{name}"
    }}

    fn version(&self) -> i64 {{
        {version}
    }}

    fn up(&self, _manager: &SchemaManager<'_>) -> Result<(), KeelError> {{
        Ok(())
    }}

    fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), KeelError> {{
        Ok(())
    }}
}}
"#,
            struct_name = self.struct_name(),
            name = self.name,
            version = self.version,
        )
    }
}
