//! Advisory run lock

use crate::backend::StateStore;
use crate::migration::MigrationError;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lock guard that releases the run lock when dropped
///
/// Only one apply or revert may run against a database at a time. A second
/// run polls until the holder finishes or the timeout elapses, then re-reads
/// the tracker, so it sees whatever the first run applied.
pub struct MigrationLockGuard<'a> {
    store: &'a dyn StateStore,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock, polling every 100ms for up to `timeout_seconds`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock is still held when
    /// the timeout elapses, and `MigrationError::TrackerUnavailable` if the
    /// store fails while trying.
    pub fn acquire(store: &'a dyn StateStore, timeout_seconds: u64) -> Result<Self, MigrationError> {
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_seconds);
        let mut waited = false;

        loop {
            if store.try_lock().map_err(MigrationError::tracker)? {
                log::debug!("Acquired migration lock after {:?}", start.elapsed());
                return Ok(Self { store });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout {
                    seconds: timeout_seconds,
                });
            }

            if !waited {
                log::info!("Waiting for another migration run to release the lock");
                waited = true;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        // Errors cannot propagate out of drop
        if let Err(e) = self.store.unlock() {
            log::warn!("Failed to release migration lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDatabase;

    #[test]
    fn test_lock_released_on_drop() {
        let database = MemoryDatabase::new();
        {
            let _guard = MigrationLockGuard::acquire(&database, 1).unwrap();
            assert!(database.is_locked());
        }
        assert!(!database.is_locked());
        assert!(MigrationLockGuard::acquire(&database, 1).is_ok());
    }

    #[test]
    fn test_lock_timeout_when_held() {
        let database = MemoryDatabase::new();
        let _guard = MigrationLockGuard::acquire(&database, 1).unwrap();

        let start = Instant::now();
        let err = MigrationLockGuard::acquire(&database, 1).err().unwrap();
        assert!(matches!(err, MigrationError::LockTimeout { seconds: 1 }));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_lock_unavailable_store() {
        let database = MemoryDatabase::new();
        database.set_tracker_available(false);
        assert!(matches!(
            MigrationLockGuard::acquire(&database, 1),
            Err(MigrationError::TrackerUnavailable { .. })
        ));
    }
}
