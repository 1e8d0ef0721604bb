//! Lock-free-by-omission strategy: only the concurrent maps' own atomicity.
//!
//! Exact probes and single-path mutations are atomic. A prefix scan may
//! observe a registration that lands mid-scan or miss one that is removed
//! mid-scan; use it only where that is tolerable. Cache entries are still
//! epoch-checked, so a racing scan never leaves a stale cached result behind.

use super::core::{build_pool, DispatchManager, DispatchState, Resolution};
use crate::config::{DispatchConfig, Strategy};
use crate::error::DispatchError;
use crate::pool::Registration;
use crate::table::AdHocOutcome;

/// Dispatch manager with no lock of its own
pub struct PlainDispatcher<H> {
    state: DispatchState<H>,
}

impl<H> PlainDispatcher<H> {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            state: DispatchState::new(config),
        }
    }
}

impl<H> Default for PlainDispatcher<H> {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl<H: Send + Sync + 'static> DispatchManager<H> for PlainDispatcher<H> {
    fn strategy(&self) -> Strategy {
        Strategy::Plain
    }

    fn state(&self) -> &DispatchState<H> {
        &self.state
    }

    fn resolve(&self, request_path: &str) -> Resolution<H> {
        let epoch = self.state.cache().epoch();
        let lookup = match self.state.probe(request_path) {
            Some(lookup) => lookup,
            None => self.state.scan(request_path, epoch),
        };
        self.state.finish(request_path, lookup)
    }

    fn register(&self, registration: Registration<H>) -> Result<(), DispatchError> {
        let (pool, force) = build_pool(registration);
        self.state.bind(pool, force)
    }

    fn unregister(&self, path: &str) -> bool {
        self.state.unbind(path)
    }

    fn put_ad_hoc(&self, path: &str, handler: H) -> Result<AdHocOutcome, DispatchError> {
        self.state.put_ad_hoc(path, handler)
    }
}
