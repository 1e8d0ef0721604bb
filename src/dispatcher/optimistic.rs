//! Non-blocking strategy built on [`SeqLock`].
//!
//! Readers take a stamp, run the exact probe, cache probe and, if needed, the
//! prefix scan without any lock, then validate the stamp. A failed validation
//! means a writer ran; the result is discarded and the lookup retried. Nothing
//! in the optimistic phase touches a pool, so discarding is free: the pool is
//! only asked for an instance once the stamp has validated.
//!
//! After `max_optimistic_retries` failed validations the reader escalates: it
//! takes the writer mutex (without bumping the generation) and completes the
//! lookup exclusively, bounding starvation under sustained write pressure.

use super::core::{build_pool, DispatchManager, DispatchState, Lookup, Resolution};
use super::seqlock::SeqLock;
use crate::config::{DispatchConfig, Strategy};
use crate::error::DispatchError;
use crate::pool::Registration;
use crate::table::AdHocOutcome;
use tracing::{debug, warn};

/// Dispatch manager whose readers never block
pub struct OptimisticDispatcher<H> {
    state: DispatchState<H>,
    seq: SeqLock,
}

impl<H> OptimisticDispatcher<H> {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            state: DispatchState::new(config),
            seq: SeqLock::new(),
        }
    }

    /// The generation counter, for observability
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.seq.generation()
    }

    fn lookup(&self, request_path: &str) -> Lookup<H> {
        let epoch = self.state.cache().epoch();
        match self.state.probe(request_path) {
            Some(lookup) => lookup,
            None => self.state.scan(request_path, epoch),
        }
    }
}

impl<H> Default for OptimisticDispatcher<H> {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl<H: Send + Sync + 'static> DispatchManager<H> for OptimisticDispatcher<H> {
    fn strategy(&self) -> Strategy {
        Strategy::Optimistic
    }

    fn state(&self) -> &DispatchState<H> {
        &self.state
    }

    fn resolve(&self, request_path: &str) -> Resolution<H> {
        let max_retries = self.state.config().max_optimistic_retries;

        for attempt in 0..=max_retries {
            let stamp = self.seq.acquire_read();
            if !stamp.is_writing() {
                let lookup = self.lookup(request_path);
                if self.seq.release_read(stamp) {
                    return self.state.finish(request_path, lookup);
                }
            }
            self.state.metrics().record_stale_read();
            debug!(
                request_path = %request_path,
                attempt = attempt,
                generation = stamp.generation(),
                "Stale optimistic read; retrying"
            );
            std::hint::spin_loop();
        }

        self.state.metrics().record_escalation();
        warn!(
            request_path = %request_path,
            max_retries = max_retries,
            "Optimistic retries exhausted; escalating to writer lock"
        );
        let _exclusive = self.seq.read_exclusive();
        let lookup = self.lookup(request_path);
        self.state.finish(request_path, lookup)
    }

    fn register(&self, registration: Registration<H>) -> Result<(), DispatchError> {
        let (pool, force) = build_pool(registration);
        let _write = self.seq.acquire_write();
        self.state.bind(pool, force)
    }

    fn unregister(&self, path: &str) -> bool {
        let _write = self.seq.acquire_write();
        self.state.unbind(path)
    }

    fn put_ad_hoc(&self, path: &str, handler: H) -> Result<AdHocOutcome, DispatchError> {
        let _write = self.seq.acquire_write();
        self.state.put_ad_hoc(path, handler)
    }
}
