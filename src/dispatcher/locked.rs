//! Read/write-locked strategy.
//!
//! ## Lookup
//!
//! 1. Take the read lock; exact probe, then cache probe. A hit is resolved
//!    under the read lock and returned.
//! 2. On a miss, release the read lock and take the write lock. This upgrade
//!    is not atomic: another thread may register, unregister, or fill the
//!    cache in between, so both probes are repeated under the write lock.
//! 3. Still a miss: run the longest-prefix scan. Nothing can mutate the table
//!    while it runs, because every mutation also takes the write lock.
//! 4. Downgrade atomically to a read lock and resolve the pool under it.
//!
//! Mutations build their pool before locking, then bind under the write lock.

use super::core::{build_pool, DispatchManager, DispatchState, Resolution};
use crate::config::{DispatchConfig, Strategy};
use crate::error::DispatchError;
use crate::pool::Registration;
use crate::table::AdHocOutcome;
use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::debug;

/// Dispatch manager guarded by a read/write lock
pub struct LockedDispatcher<H> {
    state: DispatchState<H>,
    lock: RwLock<()>,
}

impl<H> LockedDispatcher<H> {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            state: DispatchState::new(config),
            lock: RwLock::new(()),
        }
    }
}

impl<H> Default for LockedDispatcher<H> {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl<H: Send + Sync + 'static> DispatchManager<H> for LockedDispatcher<H> {
    fn strategy(&self) -> Strategy {
        Strategy::Locked
    }

    fn state(&self) -> &DispatchState<H> {
        &self.state
    }

    fn resolve(&self, request_path: &str) -> Resolution<H> {
        {
            let _read = self.lock.read();
            if let Some(lookup) = self.state.probe(request_path) {
                return self.state.finish(request_path, lookup);
            }
        }

        let write = self.lock.write();
        let lookup = match self.state.probe(request_path) {
            Some(lookup) => {
                debug!(
                    request_path = %request_path,
                    "Resolved by another writer during lock upgrade"
                );
                lookup
            }
            None => {
                let epoch = self.state.cache().epoch();
                self.state.scan(request_path, epoch)
            }
        };
        let _read = RwLockWriteGuard::downgrade(write);
        self.state.finish(request_path, lookup)
    }

    fn register(&self, registration: Registration<H>) -> Result<(), DispatchError> {
        let (pool, force) = build_pool(registration);
        let _write = self.lock.write();
        self.state.bind(pool, force)
    }

    fn unregister(&self, path: &str) -> bool {
        let _write = self.lock.write();
        self.state.unbind(path)
    }

    fn put_ad_hoc(&self, path: &str, handler: H) -> Result<AdHocOutcome, DispatchError> {
        let _write = self.lock.write();
        self.state.put_ad_hoc(path, handler)
    }
}
