//! Migrator - Core migration execution engine

use crate::backend::{MemoryDatabase, SchemaBackend, StateStore};
use crate::config::{MigrationSettings, RevertPolicy};
use crate::executor::KeelError;
use crate::migration::checksum::{calculate_checksum, validate_checksum};
use crate::migration::{
    Migration, MigrationError, MigrationLockGuard, MigrationRecord, MigrationRegistry,
    MigrationStatus, PendingMigration, SchemaManager, Target, Tracker, Version,
};
use crate::schema::{diff, SchemaChange, SchemaSnapshot};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Result of [`Migrator::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Units whose `down` restores the structure their `up` started from
    pub reversible: Vec<Version>,
    /// Units without a `down`
    pub irreversible: Vec<Version>,
}

enum RevertScope {
    To(Target),
    Steps(usize),
}

/// Core migration execution engine
///
/// The `Migrator` owns the registry and borrows a schema backend and a state
/// store, usually the same database object. Every apply or revert holds the
/// store's run lock from the first tracker read to the last tracker write.
pub struct Migrator<'a> {
    registry: MigrationRegistry,
    backend: &'a dyn SchemaBackend,
    store: &'a dyn StateStore,
    lock_timeout_seconds: u64,
    allow_out_of_order: bool,
    revert_policy: RevertPolicy,
    snapshot_path: Option<PathBuf>,
    cancellation: Option<Arc<AtomicBool>>,
}

impl<'a> Migrator<'a> {
    /// Create a migrator with default settings
    pub fn new(
        registry: MigrationRegistry,
        backend: &'a dyn SchemaBackend,
        store: &'a dyn StateStore,
    ) -> Self {
        let defaults = MigrationSettings::default();
        Self {
            registry,
            backend,
            store,
            lock_timeout_seconds: defaults.lock_timeout_seconds,
            allow_out_of_order: defaults.allow_out_of_order,
            revert_policy: defaults.revert_policy,
            snapshot_path: defaults.snapshot_path,
            cancellation: None,
        }
    }

    /// Take lock timeout, out-of-order handling, revert policy and snapshot
    /// path from `settings`
    #[must_use]
    pub fn with_settings(mut self, settings: &MigrationSettings) -> Self {
        self.lock_timeout_seconds = settings.lock_timeout_seconds;
        self.allow_out_of_order = settings.allow_out_of_order;
        self.revert_policy = settings.revert_policy;
        self.snapshot_path = settings.snapshot_path.clone();
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, seconds: u64) -> Self {
        self.lock_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn allow_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    #[must_use]
    pub fn with_revert_policy(mut self, policy: RevertPolicy) -> Self {
        self.revert_policy = policy;
        self
    }

    /// Write the regenerated snapshot here after each successful run
    #[must_use]
    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    /// Stop between units once `flag` is set
    #[must_use]
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Applied, pending, out-of-order and missing units
    ///
    /// # Errors
    ///
    /// Returns `TrackerUnavailable` if the tracker cannot be read and
    /// `ChecksumMismatch` if an applied unit has changed since it was applied.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let tracker = self.tracker();
        tracker.ensure()?;
        self.classify(tracker.applied()?)
    }

    /// Apply pending units up to `target`, ascending, one at a time
    ///
    /// Returns the versions applied by this run. A second run with the same
    /// target applies nothing.
    ///
    /// # Errors
    ///
    /// Halts on the first failing unit with `MigrationFailed`, listing the
    /// units that completed before it. See [`MigrationError`] for the rest.
    pub fn apply(&self, target: Target) -> Result<Vec<Version>, MigrationError> {
        self.check_target(target)?;
        let tracker = self.tracker();
        tracker.ensure()?;
        let _lock = MigrationLockGuard::acquire(self.store, self.lock_timeout_seconds)?;

        let status = self.classify(tracker.applied()?)?;
        refuse_missing(&status)?;

        let mut plan: Vec<&PendingMigration> = status
            .pending
            .iter()
            .filter(|p| target.includes(p.version))
            .collect();
        for unit in status.out_of_order.iter().filter(|p| target.includes(p.version)) {
            if self.allow_out_of_order {
                plan.push(unit);
            } else {
                log::warn!(
                    "Skipping out-of-order migration {} {}: it is older than the last applied version",
                    unit.version,
                    unit.name
                );
            }
        }
        plan.sort_by_key(|p| p.version);

        if plan.is_empty() {
            log::info!("Schema is up to date");
        }

        let mut completed = Vec::new();
        for pending in plan {
            self.check_cancelled(&completed)?;
            let unit = self.unit(pending.version, &pending.name)?;
            self.apply_unit(&tracker, pending.version, unit, &completed)?;
            completed.push(pending.version);
        }

        self.write_snapshot(&tracker, &completed)?;
        Ok(completed)
    }

    /// Revert applied units newer than `target`, descending
    ///
    /// Every targeted `down` is dry-run against the in-memory snapshot first,
    /// so an irreversible unit or an unconfirmed destructive revert fails
    /// before anything is touched.
    ///
    /// # Errors
    ///
    /// `IrreversibleMigration`, `DestructiveRevert` and `UnknownVersion` leave
    /// the applied set unchanged. `MigrationFailed` lists the units reverted
    /// before the failure.
    pub fn revert(&self, target: Target, allow_destructive: bool) -> Result<Vec<Version>, MigrationError> {
        self.check_target(target)?;
        self.revert_scope(RevertScope::To(target), allow_destructive)
    }

    /// Revert the last `steps` applied units
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::revert`].
    pub fn revert_steps(&self, steps: usize, allow_destructive: bool) -> Result<Vec<Version>, MigrationError> {
        self.revert_scope(RevertScope::Steps(steps), allow_destructive)
    }

    /// Replay every applied unit in memory and return the resulting structure
    ///
    /// # Errors
    ///
    /// Returns `MissingMigration` if an applied unit is not registered and
    /// `ChecksumMismatch` if one has changed.
    pub fn regenerate(&self) -> Result<SchemaSnapshot, MigrationError> {
        let tracker = self.tracker();
        tracker.ensure()?;
        let status = self.classify(tracker.applied()?)?;
        refuse_missing(&status)?;
        self.replay(&status.applied)
    }

    /// Check that every registered unit's `down` undoes its `up`
    ///
    /// Units are replayed from an empty schema; nothing touches the database.
    ///
    /// # Errors
    ///
    /// Returns `DownMismatch` naming the first unit whose `down` leaves a
    /// different structure behind.
    pub fn verify(&self) -> Result<VerifyReport, MigrationError> {
        let scratch = MemoryDatabase::new();
        let mut report = VerifyReport::default();

        for (version, unit) in self.registry.list_units() {
            let before = scratch.schema()?;
            unit.up(&SchemaManager::new(&scratch))
                .map_err(|e| replay_failed(version, unit, "up", e))?;

            let probe = MemoryDatabase::with_schema(scratch.schema()?);
            match unit.down(&SchemaManager::new(&probe)) {
                Ok(()) => {}
                Err(KeelError::Irreversible) => {
                    log::warn!("Migration {} {} has no down", version, unit.name());
                    report.irreversible.push(version);
                    continue;
                }
                Err(e) => return Err(replay_failed(version, unit, "down", e)),
            }

            let changes = diff(&probe.schema()?, &before);
            if !changes.is_empty() {
                return Err(MigrationError::DownMismatch {
                    version,
                    name: unit.name().to_string(),
                    changes,
                });
            }
            report.reversible.push(version);
        }

        Ok(report)
    }

    /// Compare the expected snapshot with the backend's live structure
    ///
    /// # Errors
    ///
    /// Returns `DriftDetected` with the changes that turn the expected
    /// structure into the live one. Drift is reported, never corrected.
    pub fn check_drift(&self) -> Result<(), MigrationError> {
        let actual = self.backend.introspect()?;
        self.check_drift_against(&actual)
    }

    /// Compare the expected snapshot with `actual`
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::check_drift`].
    pub fn check_drift_against(&self, actual: &SchemaSnapshot) -> Result<(), MigrationError> {
        let expected = self.regenerate()?;
        let changes = diff(&expected, actual);
        if changes.is_empty() {
            return Ok(());
        }
        for change in &changes {
            log::warn!("Drift: {}", change);
        }
        Err(MigrationError::DriftDetected { changes })
    }

    /// A throwaway in-memory copy of the current state, for dry runs
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::regenerate`].
    pub fn dry_run_database(&self) -> Result<MemoryDatabase, MigrationError> {
        let tracker = self.tracker();
        tracker.ensure()?;
        let status = self.classify(tracker.applied()?)?;
        refuse_missing(&status)?;
        let snapshot = self.replay(&status.applied)?;
        Ok(MemoryDatabase::from_state(snapshot, status.applied))
    }

    fn tracker(&self) -> Tracker<'a> {
        Tracker::new(self.store)
    }

    fn classify(&self, records: Vec<MigrationRecord>) -> Result<MigrationStatus, MigrationError> {
        let mut status = MigrationStatus::default();

        for record in records {
            match self.registry.get(record.version) {
                Some(unit) => {
                    validate_checksum(&record, &crate::migration::unit_checksum(unit)?)?;
                    status.applied.push(record);
                }
                None => status.missing.push(record),
            }
        }

        let last_applied = status.latest_applied_version();
        for (version, unit) in self.registry.list_units() {
            if status.applied.iter().any(|r| r.version == version) {
                continue;
            }
            let pending = PendingMigration {
                version,
                name: unit.name().to_string(),
                reversible: is_reversible(unit),
            };
            if last_applied.is_some_and(|last| version < last) {
                status.out_of_order.push(pending);
            } else {
                status.pending.push(pending);
            }
        }

        Ok(status)
    }

    fn check_target(&self, target: Target) -> Result<(), MigrationError> {
        match target {
            Target::Version(version) if !self.registry.contains(version) => {
                Err(MigrationError::UnknownVersion(version))
            }
            _ => Ok(()),
        }
    }

    fn check_cancelled(&self, completed: &[Version]) -> Result<(), MigrationError> {
        match &self.cancellation {
            Some(flag) if flag.load(Ordering::SeqCst) => {
                log::warn!("Migration run cancelled after {} unit(s)", completed.len());
                Err(MigrationError::Cancelled {
                    completed: completed.to_vec(),
                })
            }
            _ => Ok(()),
        }
    }

    fn unit(&self, version: Version, name: &str) -> Result<&dyn Migration, MigrationError> {
        self.registry
            .get(version)
            .ok_or_else(|| MigrationError::MissingMigration {
                version,
                name: name.to_string(),
            })
    }

    fn apply_unit(
        &self,
        tracker: &Tracker<'_>,
        version: Version,
        unit: &dyn Migration,
        completed: &[Version],
    ) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("keel.apply", version = version.get(), name = unit.name()).entered();

        log::info!("Applying {} {}", version, unit.name());
        let start = Instant::now();

        let outcome = self.in_unit(version, unit, completed, || {
            let manager = SchemaManager::new(self.backend);
            unit.up(&manager)?;
            let checksum = calculate_checksum(&manager.into_changes())?;
            let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
            let record = MigrationRecord::new(version, unit.name(), checksum, Utc::now(), elapsed);
            tracker.mark_applied(&record)
        });

        if outcome.is_ok() {
            log::info!("Applied {} {} in {:?}", version, unit.name(), start.elapsed());
        }
        outcome
    }

    fn revert_unit(
        &self,
        tracker: &Tracker<'_>,
        version: Version,
        unit: &dyn Migration,
        completed: &[Version],
    ) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("keel.revert", version = version.get(), name = unit.name()).entered();

        log::info!("Reverting {} {}", version, unit.name());
        let start = Instant::now();

        let outcome = self.in_unit(version, unit, completed, || {
            unit.down(&SchemaManager::new(self.backend))?;
            tracker.mark_reverted(version)
        });

        if outcome.is_ok() {
            log::info!("Reverted {} {} in {:?}", version, unit.name(), start.elapsed());
        }
        outcome
    }

    /// Run `body` as one unit: inside a transaction where the backend
    /// supports transactional DDL, otherwise directly
    fn in_unit(
        &self,
        version: Version,
        unit: &dyn Migration,
        completed: &[Version],
        body: impl FnOnce() -> Result<(), MigrationError>,
    ) -> Result<(), MigrationError> {
        let transactional = self.backend.supports_transactional_ddl();
        let failed = |cause: String, rolled_back: bool| MigrationError::MigrationFailed {
            version,
            name: unit.name().to_string(),
            cause,
            completed: completed.to_vec(),
            rolled_back,
        };

        if transactional {
            self.backend
                .begin_unit()
                .map_err(|e| failed(format!("could not begin transaction: {e}"), false))?;
        }

        match body() {
            Ok(()) => {
                if transactional {
                    if let Err(e) = self.backend.commit_unit() {
                        let rolled_back = self.rollback_unit();
                        return Err(failed(format!("commit failed: {e}"), rolled_back));
                    }
                }
                Ok(())
            }
            Err(err) => {
                let rolled_back = transactional && self.rollback_unit();
                match err {
                    MigrationError::TrackerUnavailable { .. } => {
                        if !rolled_back {
                            log::error!(
                                "Migration {} {} ran but the tracker could not record it; manual remediation is required",
                                version,
                                unit.name()
                            );
                        }
                        Err(failed(err.to_string(), rolled_back))
                    }
                    MigrationError::Schema(cause) => Err(failed(cause.to_string(), rolled_back)),
                    other => Err(failed(other.to_string(), rolled_back)),
                }
            }
        }
    }

    fn rollback_unit(&self) -> bool {
        match self.backend.rollback_unit() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Rollback failed: {}", e);
                false
            }
        }
    }

    fn revert_scope(&self, scope: RevertScope, allow_destructive: bool) -> Result<Vec<Version>, MigrationError> {
        let tracker = self.tracker();
        tracker.ensure()?;
        let _lock = MigrationLockGuard::acquire(self.store, self.lock_timeout_seconds)?;

        let status = self.classify(tracker.applied()?)?;
        refuse_missing(&status)?;

        let targeted: Vec<&MigrationRecord> = match scope {
            RevertScope::To(target) => status
                .applied
                .iter()
                .rev()
                .filter(|r| !target.includes(r.version))
                .collect(),
            RevertScope::Steps(steps) => status.applied.iter().rev().take(steps).collect(),
        };

        if targeted.is_empty() {
            log::info!("Nothing to revert");
            return Ok(Vec::new());
        }

        self.plan_revert(&status.applied, &targeted, allow_destructive)?;

        let mut completed = Vec::new();
        for record in targeted {
            self.check_cancelled(&completed)?;
            let unit = self.unit(record.version, &record.name)?;
            self.revert_unit(&tracker, record.version, unit, &completed)?;
            completed.push(record.version);
        }

        self.write_snapshot(&tracker, &completed)?;
        Ok(completed)
    }

    /// Dry-run every targeted `down` against the expected snapshot
    fn plan_revert(
        &self,
        applied: &[MigrationRecord],
        targeted: &[&MigrationRecord],
        allow_destructive: bool,
    ) -> Result<(), MigrationError> {
        let scratch = MemoryDatabase::with_schema(self.replay(applied)?);
        let mut destructive: Option<(Version, &str, SchemaChange)> = None;

        for record in targeted {
            let unit = self.unit(record.version, &record.name)?;
            let manager = SchemaManager::new(&scratch);
            match unit.down(&manager) {
                Ok(()) => {}
                Err(KeelError::Irreversible) => {
                    return Err(MigrationError::IrreversibleMigration {
                        version: record.version,
                        name: unit.name().to_string(),
                    })
                }
                Err(e) => return Err(replay_failed(record.version, unit, "down", e)),
            }
            if destructive.is_none() {
                if let Some(change) = manager.into_changes().into_iter().find(SchemaChange::is_destructive) {
                    destructive = Some((record.version, unit.name(), change));
                }
            }
        }

        match destructive {
            Some((version, name, change))
                if self.revert_policy == RevertPolicy::RequireConfirmation && !allow_destructive =>
            {
                Err(MigrationError::DestructiveRevert {
                    version,
                    name: name.to_string(),
                    change,
                })
            }
            Some((version, _, change)) => {
                log::warn!("Destructive revert confirmed: {} will {}", version, change);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Replay `applied` from an empty schema, checking each unit's checksum
    fn replay(&self, applied: &[MigrationRecord]) -> Result<SchemaSnapshot, MigrationError> {
        let scratch = MemoryDatabase::new();

        for record in applied {
            let unit = self.unit(record.version, &record.name)?;
            let manager = SchemaManager::new(&scratch);
            unit.up(&manager)
                .map_err(|e| replay_failed(record.version, unit, "up", e))?;
            validate_checksum(record, &calculate_checksum(&manager.into_changes())?)?;
        }

        let mut snapshot = scratch.schema()?;
        snapshot.version = applied.iter().map(|r| r.version).max();
        Ok(snapshot)
    }

    /// Units in `completed` are already applied or reverted, so a failure
    /// here still reports them
    fn write_snapshot(&self, tracker: &Tracker<'_>, completed: &[Version]) -> Result<(), MigrationError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let written = tracker
            .applied()
            .and_then(|applied| self.replay(&applied))
            .and_then(|snapshot| snapshot.save(path).map_err(MigrationError::from));
        match written {
            Ok(()) => {
                log::info!("Wrote schema snapshot to {}", path.display());
                Ok(())
            }
            Err(e) => Err(MigrationError::SnapshotNotWritten {
                path: path.clone(),
                cause: e.to_string(),
                completed: completed.to_vec(),
            }),
        }
    }
}

fn refuse_missing(status: &MigrationStatus) -> Result<(), MigrationError> {
    match status.missing.first() {
        Some(record) => Err(MigrationError::MissingMigration {
            version: record.version,
            name: record.name.clone(),
        }),
        None => Ok(()),
    }
}

fn is_reversible(unit: &dyn Migration) -> bool {
    !matches!(
        unit.down(&SchemaManager::recording()),
        Err(KeelError::Irreversible)
    )
}

fn replay_failed(version: Version, unit: &dyn Migration, direction: &str, error: KeelError) -> MigrationError {
    MigrationError::MigrationFailed {
        version,
        name: unit.name().to_string(),
        cause: format!("{direction} does not fit the recorded schema: {error}"),
        completed: Vec::new(),
        rolled_back: false,
    }
}
