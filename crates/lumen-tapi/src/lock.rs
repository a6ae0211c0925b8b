//! Per-service serialization.
//!
//! Every read→compute→write round trip on a connectivity service runs while
//! holding that service's lock. Locks are in-process, keyed by service id and
//! created on first use. Unrelated services proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use lumen_core::ServiceId;

use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock registry poisoned")
}

/// Guard held for the duration of one service update.
pub type ServiceGuard = OwnedMutexGuard<()>;

/// Keyed async mutexes, one per service id.
#[derive(Debug, Default)]
pub struct ServiceLocks {
    locks: StdMutex<HashMap<ServiceId, Arc<Mutex<()>>>>,
}

impl ServiceLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and acquires the lock for `service_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the registry mutex is poisoned.
    pub async fn acquire(&self, service_id: &ServiceId) -> Result<ServiceGuard> {
        let lock = {
            let mut locks = self.locks.lock().map_err(poison_err)?;
            Arc::clone(locks.entry(service_id.clone()).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Drops registry entries that nobody holds or waits on.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the registry mutex is poisoned.
    pub fn prune(&self) -> Result<usize> {
        let mut locks = self.locks.lock().map_err(poison_err)?;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(before - locks.len())
    }

    /// Returns the number of registered locks.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the registry mutex is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.locks.lock().map_err(poison_err)?.len())
    }
}
