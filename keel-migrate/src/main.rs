//! Keel Migration CLI Tool
//!
//! Command-line interface for applying, reverting and checking the content
//! store's schema migrations. Exits non-zero with the failing version and
//! cause when anything goes wrong, so it can gate CI/CD pipelines.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use keel::backend::{MemoryDatabase, PostgresDatabase};
use keel::migration::{MigrationError, MigrationFile, MigrationStatus, Migrator, Target, Version};
use keel::schema::SchemaSnapshot;
use keel::{catalog, connect, KeelConfig, MigrationSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

const DEFAULT_SNAPSHOT_PATH: &str = "db/schema.json";

#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(about = "Schema migration tool for the Keel content store")]
#[command(version)]
struct Cli {
    /// Configuration file (default: config/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show applied, pending, out-of-order and missing migrations
    Status,

    /// Apply pending migrations
    Apply {
        /// Stop after this version (default: latest)
        #[arg(long)]
        to: Option<Version>,

        /// Show what would be applied without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert applied migrations (default: the last one)
    Revert {
        /// Revert every migration newer than this version
        #[arg(long, conflicts_with_all = ["steps", "all"])]
        to: Option<Version>,

        /// Number of migrations to revert
        #[arg(long, conflicts_with = "all")]
        steps: Option<usize>,

        /// Revert every applied migration
        #[arg(long)]
        all: bool,

        /// Allow reverts that drop tables or columns
        #[arg(long)]
        allow_destructive: bool,

        /// Show what would be reverted without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Regenerate the schema snapshot from the applied migrations
    Snapshot {
        /// Output file (default: migrations.snapshot_path or db/schema.json, `-` for stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare the expected schema with the live database
    Drift {
        /// Compare against a snapshot file instead of the live database
        #[arg(long)]
        against: Option<PathBuf>,
    },

    /// Check that every migration's down undoes its up
    Verify,

    /// Show detailed migration information
    Info {
        /// Show information for a specific migration version
        #[arg(long)]
        version: Option<Version>,
    },

    /// Write a new, empty migration unit
    New {
        /// Migration name (e.g., "add_position_to_post_images")
        name: String,

        /// Directory the unit is written to
        #[arg(long, default_value = "src/catalog")]
        dir: PathBuf,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let completed = completed_before_failure(&e);
        if !completed.is_empty() {
            eprintln!("Completed before the failure: {}", join(completed));
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = KeelConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let settings = &config.migrations;

    // Commands that never touch the database
    match &cli.command {
        Commands::Verify => return handle_verify(),
        Commands::New { name, dir } => return handle_new(dir, name),
        _ => {}
    }

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| config.database.connection_string());
    let client = connect(&database_url).context("Error connecting to database")?;
    let database = PostgresDatabase::new(client, settings)?;
    let migrator = Migrator::new(catalog::registry()?, &database, &database).with_settings(settings);

    match cli.command {
        Commands::Status => handle_status(&migrator),
        Commands::Apply { to, dry_run } => handle_apply(&migrator, settings, to, dry_run),
        Commands::Revert {
            to,
            steps,
            all,
            allow_destructive,
            dry_run,
        } => {
            let scope = match (to, steps, all) {
                (_, _, true) => RevertScope::To(Target::Initial),
                (Some(version), _, _) => RevertScope::To(Target::Version(version)),
                (None, steps, false) => RevertScope::Steps(steps.unwrap_or(1)),
            };
            handle_revert(&migrator, settings, scope, allow_destructive, dry_run)
        }
        Commands::Snapshot { output } => handle_snapshot(&migrator, settings, output),
        Commands::Drift { against } => handle_drift(&migrator, against.as_deref()),
        Commands::Info { version } => handle_info(&migrator, version),
        Commands::Verify | Commands::New { .. } => Ok(()),
    }
}

#[derive(Clone, Copy)]
enum RevertScope {
    To(Target),
    Steps(usize),
}

fn handle_status(migrator: &Migrator<'_>) -> anyhow::Result<()> {
    let status = migrator.status()?;

    println!("\n{}\n", "Migration Status".bold());

    if status.applied.is_empty() {
        println!("Applied: none");
    } else {
        println!("Applied ({}):", status.applied_count());
        for record in &status.applied {
            println!(
                "  {} m{}_{} ({}, {}ms)",
                "✓".green(),
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                record.execution_time_ms
            );
        }
    }

    println!();
    if status.pending.is_empty() {
        println!("Pending: none");
    } else {
        println!("Pending ({}):", status.pending_count());
        for pending in &status.pending {
            println!("  {} m{}_{}", "•".yellow(), pending.version, pending.name);
        }
    }

    if !status.out_of_order.is_empty() {
        println!("\nOut of order ({}), older than the last applied version:", status.out_of_order.len());
        for pending in &status.out_of_order {
            println!("  {} m{}_{}", "!".yellow().bold(), pending.version, pending.name);
        }
    }

    if !status.missing.is_empty() {
        println!("\nMissing ({}), applied but no longer registered:", status.missing.len());
        for record in &status.missing {
            println!("  {} m{}_{}", "✗".red().bold(), record.version, record.name);
        }
    }

    println!(
        "\nSummary: {} applied, {} pending",
        status.applied_count(),
        status.pending_count()
    );
    Ok(())
}

fn handle_apply(
    migrator: &Migrator<'_>,
    settings: &MigrationSettings,
    to: Option<Version>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let target = to.map_or(Target::Latest, Target::Version);

    if dry_run {
        let scratch = migrator.dry_run_database()?;
        let applied = scratch_migrator(&scratch, settings)?.apply(target)?;
        if applied.is_empty() {
            println!("No pending migrations to apply");
        } else {
            println!("Would apply {} migration(s):", applied.len());
            print_units(migrator, &applied);
        }
        return Ok(());
    }

    let applied = migrator.apply(target)?;
    if applied.is_empty() {
        println!("{} Schema is up to date", "✓".green());
    } else {
        println!("{} Applied {} migration(s)", "✓".green(), applied.len());
        print_units(migrator, &applied);
    }
    Ok(())
}

fn handle_revert(
    migrator: &Migrator<'_>,
    settings: &MigrationSettings,
    scope: RevertScope,
    allow_destructive: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let revert = |m: &Migrator<'_>| match scope {
        RevertScope::To(target) => m.revert(target, allow_destructive),
        RevertScope::Steps(steps) => m.revert_steps(steps, allow_destructive),
    };

    if dry_run {
        let scratch = migrator.dry_run_database()?;
        let reverted = revert(&scratch_migrator(&scratch, settings)?)?;
        if reverted.is_empty() {
            println!("No applied migrations to revert");
        } else {
            println!("Would revert {} migration(s):", reverted.len());
            print_units(migrator, &reverted);
        }
        return Ok(());
    }

    let reverted = revert(migrator)?;
    if reverted.is_empty() {
        println!("No applied migrations to revert");
    } else {
        println!("{} Reverted {} migration(s)", "✓".green(), reverted.len());
        print_units(migrator, &reverted);
    }
    Ok(())
}

fn handle_snapshot(
    migrator: &Migrator<'_>,
    settings: &MigrationSettings,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let snapshot = migrator.regenerate()?;
    let path = output
        .or_else(|| settings.snapshot_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

    if path.as_os_str() == "-" {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    snapshot
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} Wrote snapshot of {} table(s) at version {} to {}",
        "✓".green(),
        snapshot.tables.len(),
        snapshot.version.map_or_else(|| "none".to_string(), |v| v.to_string()),
        path.display()
    );
    Ok(())
}

fn handle_drift(migrator: &Migrator<'_>, against: Option<&Path>) -> anyhow::Result<()> {
    match against {
        Some(path) => {
            let actual = SchemaSnapshot::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
            migrator.check_drift_against(&actual)?;
        }
        None => migrator.check_drift()?,
    }
    println!("{} No drift detected", "✓".green());
    Ok(())
}

fn handle_verify() -> anyhow::Result<()> {
    let scratch = MemoryDatabase::new();
    let report = Migrator::new(catalog::registry()?, &scratch, &scratch).verify()?;

    println!(
        "{} {} migration(s) revert cleanly",
        "✓".green(),
        report.reversible.len()
    );
    if !report.irreversible.is_empty() {
        println!(
            "{} Irreversible: {}",
            "!".yellow().bold(),
            join(&report.irreversible)
        );
    }
    Ok(())
}

fn handle_info(migrator: &Migrator<'_>, version: Option<Version>) -> anyhow::Result<()> {
    let status = migrator.status()?;

    let Some(version) = version else {
        print_summary(migrator, &status);
        return Ok(());
    };

    if let Some(record) = status
        .applied
        .iter()
        .chain(status.missing.iter())
        .find(|r| r.version == version)
    {
        println!("\n{}\n", "Migration Information".bold());
        println!("Version: {}", record.version);
        println!("Name: {}", record.name);
        println!("Checksum: {}", record.checksum);
        println!("Applied At: {}", record.applied_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("Execution Time: {}ms", record.execution_time_ms);
        if !migrator.registry().contains(version) {
            println!("Status: {}", "Missing from the registry".red());
        }
        return Ok(());
    }

    let Some(pending) = status
        .pending
        .iter()
        .chain(status.out_of_order.iter())
        .find(|p| p.version == version)
    else {
        bail!(MigrationError::UnknownVersion(version));
    };
    println!("\n{}\n", "Migration Information (Pending)".bold());
    println!("Version: {}", pending.version);
    println!("Name: {}", pending.name);
    println!("Reversible: {}", if pending.reversible { "yes" } else { "no" });
    if status.out_of_order.iter().any(|p| p.version == version) {
        println!("Status: Out of order");
    } else {
        println!("Status: Pending");
    }
    Ok(())
}

fn print_summary(migrator: &Migrator<'_>, status: &MigrationStatus) {
    println!("\n{}\n", "Migration System Information".bold());
    println!("Total Migrations: {}", migrator.registry().len());
    println!("Applied: {}", status.applied_count());
    println!("Pending: {}", status.pending_count());
    if !status.out_of_order.is_empty() {
        println!("Out of order: {}", status.out_of_order.len());
    }
    if !status.missing.is_empty() {
        println!("Missing: {}", status.missing.len());
    }
    if let Some(latest) = status.latest_applied_version() {
        println!("Latest Applied Version: {latest}");
    }
    if let Some(next) = status.next_pending_version() {
        println!("Next Pending Version: {next}");
    }
}

fn handle_new(dir: &Path, name: &str) -> anyhow::Result<()> {
    let file = MigrationFile::new(dir, Version::from_datetime(Utc::now()), name)?;
    if file.path.exists() {
        bail!("{} already exists", file.path.display());
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    fs::write(&file.path, file.render())
        .with_context(|| format!("Failed to write {}", file.path.display()))?;

    println!("{} Generated migration: {}", "✓".green(), file.path.display());
    println!(
        "   Declare `mod {};` and register `{}` in the catalog",
        file.module_name(),
        file.struct_name()
    );
    Ok(())
}

/// A migrator over a throwaway copy of the database, for dry runs
fn scratch_migrator<'a>(
    scratch: &'a MemoryDatabase,
    settings: &MigrationSettings,
) -> Result<Migrator<'a>, MigrationError> {
    Ok(Migrator::new(catalog::registry()?, scratch, scratch)
        .with_settings(settings)
        .with_snapshot_path(None))
}

fn print_units(migrator: &Migrator<'_>, versions: &[Version]) {
    for (i, version) in versions.iter().enumerate() {
        let name = migrator.registry().get(*version).map_or("", |unit| unit.name());
        println!("  {}. m{}_{}", i + 1, version, name);
    }
}

/// Versions a failed or cancelled run had already finished
fn completed_before_failure(error: &anyhow::Error) -> &[Version] {
    error
        .downcast_ref::<MigrationError>()
        .map(MigrationError::completed)
        .unwrap_or_default()
}

fn join(versions: &[Version]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: i64) -> Version {
        Version::new(v).unwrap()
    }

    #[test]
    fn test_cancelled_run_reports_completed_units() {
        let error = anyhow::Error::new(MigrationError::Cancelled {
            completed: vec![version(20180306153650), version(20180307194030)],
        })
        .context("apply failed");
        assert_eq!(
            completed_before_failure(&error),
            &[version(20180306153650), version(20180307194030)]
        );
        assert_eq!(join(completed_before_failure(&error)), "20180306153650, 20180307194030");
    }

    #[test]
    fn test_other_errors_report_nothing() {
        let error = anyhow::anyhow!("Error connecting to database");
        assert!(completed_before_failure(&error).is_empty());
    }
}
