//! Dispatcher core - state and operations shared by every strategy.
//!
//! Strategies differ only in *how* they serialize access to
//! [`DispatchState`]; the lookup steps and mutation bookkeeping live here.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::cache::{Cached, ImplierCache};
use crate::config::{DispatchConfig, Strategy};
use crate::error::{DispatchError, ErrorHandler, PoolError};
use crate::metrics::DispatchMetrics;
use crate::pool::{HandlerInstance, HandlerPool, PoolStats, Registration, Target};
use crate::table::{AdHocOutcome, BindOutcome, DispatchTable, UnbindOutcome};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a resolution found its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The request path is itself a registered path
    Exact,
    /// Longest-prefix scan
    Prefix,
    /// Longest-prefix result served from the implier cache
    CachedPrefix,
    /// Nothing matched; the target is the not-found error handler
    NotFound,
}

/// The outcome of resolving one request path
///
/// Hold it while the handler runs, then hand it back through
/// [`DispatchManager::release`]. Dropping a resolution of a FIFO pool instead
/// of releasing it permanently shrinks that pool.
pub struct Resolution<H> {
    target: Target<H>,
    matched: Option<Arc<str>>,
    kind: MatchKind,
    pool: Option<Arc<HandlerPool<H>>>,
}

impl<H> Resolution<H> {
    #[must_use]
    pub fn target(&self) -> &Target<H> {
        &self.target
    }

    /// The handler instance, unless the target is an error handler
    #[must_use]
    pub fn instance(&self) -> Option<&HandlerInstance<H>> {
        match &self.target {
            Target::Handler(instance) => Some(instance),
            Target::Error(_) => None,
        }
    }

    #[must_use]
    pub fn handler(&self) -> Option<&H> {
        self.instance().map(HandlerInstance::handler)
    }

    /// Mutable access to an exclusively held FIFO instance
    ///
    /// `None` for singletons and error handlers. Changes persist in the
    /// instance after it is released back to its pool.
    #[must_use]
    pub fn handler_mut(&mut self) -> Option<&mut H> {
        match &mut self.target {
            Target::Handler(instance) => instance.handler_mut(),
            Target::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorHandler> {
        match &self.target {
            Target::Error(handler) => Some(handler),
            Target::Handler(_) => None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.target, Target::Error(_))
    }

    /// The registration that served this path
    #[must_use]
    pub fn matched(&self) -> Option<&str> {
        self.matched.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> MatchKind {
        self.kind
    }
}

impl<H> fmt::Debug for Resolution<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Resolution");
        s.field("matched", &self.matched).field("kind", &self.kind);
        match &self.target {
            Target::Handler(instance) => s.field("instance", &instance.id()),
            Target::Error(handler) => s.field("error", &handler.kind()),
        };
        s.finish()
    }
}

/// A lookup result before the pool has been asked for an instance
///
/// Producing one has no side effect on any pool, so optimistic readers can
/// throw it away and retry.
pub(crate) enum Lookup<H> {
    Pool {
        matched: Arc<str>,
        pool: Arc<HandlerPool<H>>,
        kind: MatchKind,
    },
    NotFound(Arc<ErrorHandler>),
}

/// Dispatch table, implier cache and counters behind one manager
pub struct DispatchState<H> {
    table: DispatchTable<H>,
    cache: ImplierCache<H>,
    metrics: DispatchMetrics,
    config: DispatchConfig,
}

impl<H> DispatchState<H> {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            table: DispatchTable::new(),
            cache: ImplierCache::with_max_entries(config.max_cached_paths),
            metrics: DispatchMetrics::new(),
            config,
        }
    }

    #[must_use]
    pub fn table(&self) -> &DispatchTable<H> {
        &self.table
    }

    #[must_use]
    pub fn cache(&self) -> &ImplierCache<H> {
        &self.cache
    }

    #[must_use]
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Exact probe, then cache probe
    pub(crate) fn probe(&self, request_path: &str) -> Option<Lookup<H>> {
        if let Some((matched, pool)) = self.table.get_key_value(request_path) {
            return Some(Lookup::Pool {
                matched,
                pool,
                kind: MatchKind::Exact,
            });
        }
        match self.cache.get(request_path)? {
            Cached::Pool { matched, pool } => Some(Lookup::Pool {
                matched,
                pool,
                kind: MatchKind::CachedPrefix,
            }),
            Cached::NotFound(handler) => Some(Lookup::NotFound(handler)),
        }
    }

    /// Longest-prefix scan; singleton and not-found results are memoized
    ///
    /// `epoch` must be read from the cache before the scan starts.
    pub(crate) fn scan(&self, request_path: &str, epoch: u64) -> Lookup<H> {
        self.metrics.record_prefix_scan();
        match self.table.longest_match(request_path) {
            Some((matched, pool)) => {
                if pool.is_singleton() {
                    self.cache.insert(
                        request_path,
                        Cached::Pool {
                            matched: Arc::clone(&matched),
                            pool: Arc::clone(&pool),
                        },
                        epoch,
                    );
                }
                debug!(
                    request_path = %request_path,
                    matched = %matched,
                    singleton = pool.is_singleton(),
                    "Prefix scan matched"
                );
                Lookup::Pool {
                    matched,
                    pool,
                    kind: MatchKind::Prefix,
                }
            }
            None => {
                let handler = Arc::new(ErrorHandler::not_found(request_path));
                self.cache
                    .insert(request_path, Cached::NotFound(Arc::clone(&handler)), epoch);
                debug!(request_path = %request_path, "Prefix scan found no registration");
                Lookup::NotFound(handler)
            }
        }
    }

    /// Turn a validated lookup into a resolution, dequeuing if needed
    pub(crate) fn finish(&self, request_path: &str, lookup: Lookup<H>) -> Resolution<H> {
        match lookup {
            Lookup::Pool {
                matched,
                pool,
                kind,
            } => {
                match kind {
                    MatchKind::Exact => self.metrics.record_exact_hit(),
                    MatchKind::CachedPrefix => self.metrics.record_cache_hit(),
                    MatchKind::Prefix => self.metrics.record_prefix_hit(),
                    MatchKind::NotFound => self.metrics.record_not_found(),
                }
                let target = pool.resolve(request_path);
                Resolution {
                    target,
                    matched: Some(matched),
                    kind,
                    pool: Some(pool),
                }
            }
            Lookup::NotFound(handler) => {
                self.metrics.record_not_found();
                Resolution {
                    target: Target::Error(handler),
                    matched: None,
                    kind: MatchKind::NotFound,
                    pool: None,
                }
            }
        }
    }

    /// Bind a built pool; caller holds the strategy's exclusive section
    pub(crate) fn bind(&self, pool: Arc<HandlerPool<H>>, force: bool) -> Result<(), DispatchError> {
        let path: Arc<str> = Arc::from(pool.path());
        let degraded = pool.is_degraded();
        let kind = pool.kind();

        let outcome = self.table.bind(&path, pool, force).map_err(|e| {
            warn!(path = %path, error = %e, "Registration rejected");
            e
        })?;
        self.cache.clear();
        self.metrics.record_registration(degraded);

        match outcome {
            BindOutcome::Bound => info!(
                path = %path,
                kind = ?kind,
                degraded = degraded,
                total_paths = self.table.len(),
                "Handler registered"
            ),
            BindOutcome::Overridden { depth } => {
                self.metrics.record_override();
                info!(
                    path = %path,
                    kind = ?kind,
                    degraded = degraded,
                    parked_depth = depth,
                    "Handler overridden; previous pool parked"
                );
            }
        }
        Ok(())
    }

    /// Unbind a path; caller holds the strategy's exclusive section
    pub(crate) fn unbind(&self, path: &str) -> bool {
        match self.table.unbind(path) {
            UnbindOutcome::NotBound => {
                warn!(path = %path, "Unregister of unbound path ignored");
                false
            }
            UnbindOutcome::Unbound(removed) => {
                self.cache.clear();
                self.metrics.record_unregistration();
                info!(
                    path = %path,
                    available = removed.available(),
                    total_paths = self.table.len(),
                    "Handler unregistered"
                );
                true
            }
            UnbindOutcome::Restored { removed, depth } => {
                self.cache.clear();
                self.metrics.record_unregistration();
                self.metrics.record_restore();
                info!(
                    path = %path,
                    removed_kind = ?removed.kind(),
                    parked_depth = depth,
                    "Handler unregistered; parked pool reinstated"
                );
                true
            }
        }
    }

    /// Ad-hoc put; caller holds the strategy's exclusive section
    pub(crate) fn put_ad_hoc(&self, path: &str, handler: H) -> Result<AdHocOutcome, DispatchError> {
        match self
            .table
            .put_ad_hoc(path, handler, self.config.default_capacity)
        {
            Ok(AdHocOutcome::Created) => {
                self.cache.clear();
                self.metrics.record_registration(false);
                info!(
                    path = %path,
                    capacity = self.config.default_capacity,
                    "Ad-hoc FIFO pool created"
                );
                Ok(AdHocOutcome::Created)
            }
            Ok(AdHocOutcome::IgnoredSingleton) => {
                debug!(path = %path, "Ad-hoc put ignored; path has a singleton binding");
                Ok(AdHocOutcome::IgnoredSingleton)
            }
            Ok(outcome) => {
                debug!(path = %path, "Ad-hoc instance enqueued");
                Ok(outcome)
            }
            Err(e) => {
                match &e {
                    DispatchError::PoolOverflow { .. } => {
                        self.metrics.record_overflow();
                        error!(path = %path, error = %e, "Ad-hoc put overflowed pool - CALLER BUG");
                    }
                    DispatchError::InstanceRejected { .. } => {
                        warn!(path = %path, error = %e, "Ad-hoc instance rejected by initializer");
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    /// Return a resolution's instance to the pool it came from
    pub(crate) fn release(&self, resolution: Resolution<H>) -> Result<(), DispatchError> {
        let Resolution { target, pool, .. } = resolution;
        let (Target::Handler(instance), Some(pool)) = (target, pool) else {
            return Ok(());
        };
        let instance_id = instance.id();
        pool.release(instance).map_err(|e| {
            self.metrics.record_overflow();
            error!(
                path = %pool.path(),
                instance_id = %instance_id,
                error = %e,
                "Release overflowed pool - CALLER BUG"
            );
            let capacity = match e {
                PoolError::Overflow { capacity } => capacity,
                PoolError::Empty | PoolError::Rejected { .. } => 0,
            };
            DispatchError::PoolOverflow {
                path: pool.path().to_string(),
                capacity,
            }
        })
    }
}

/// The contract every dispatch strategy implements
///
/// All methods take `&self`; managers are shared across request threads
/// behind an `Arc`.
pub trait DispatchManager<H>: Send + Sync {
    /// Which concurrency discipline this manager uses
    fn strategy(&self) -> Strategy;

    /// Shared state, for the provided methods
    fn state(&self) -> &DispatchState<H>;

    /// Resolve a request path to a handler target
    ///
    /// Never fails: unmatched paths resolve to the not-found error handler.
    fn resolve(&self, request_path: &str) -> Resolution<H>;

    /// Build the registration's pool and bind it
    ///
    /// Fails with [`DispatchError::AlreadyRegistered`] if the path is bound
    /// and the registration is not forced.
    fn register(&self, registration: Registration<H>) -> Result<(), DispatchError>;

    /// Remove a path's binding, restoring a parked pool if one exists
    ///
    /// Returns false (and logs) if the path was not bound.
    fn unregister(&self, path: &str) -> bool;

    /// Offer a ready-made instance for a path
    fn put_ad_hoc(&self, path: &str, handler: H) -> Result<AdHocOutcome, DispatchError>;

    /// Hand a resolution back after use
    ///
    /// No-op for singletons and error handlers.
    fn release(&self, resolution: Resolution<H>) -> Result<(), DispatchError> {
        self.state().release(resolution)
    }

    #[must_use]
    fn registered_paths(&self) -> Vec<String> {
        self.state().table().paths()
    }

    #[must_use]
    fn parked_depth(&self, path: &str) -> usize {
        self.state().table().parked_depth(path)
    }

    #[must_use]
    fn pool_stats(&self, path: &str) -> Option<PoolStats> {
        self.state().table().get(path).map(|pool| pool.stats())
    }

    #[must_use]
    fn cache_len(&self) -> usize {
        self.state().cache().len()
    }

    #[must_use]
    fn metrics<'a>(&'a self) -> &'a DispatchMetrics
    where
        H: 'a,
    {
        self.state().metrics()
    }
}

/// Build the pool for a registration outside any lock
pub(crate) fn build_pool<H>(registration: Registration<H>) -> (Arc<HandlerPool<H>>, bool) {
    let force = registration.is_forced();
    (Arc::new(HandlerPool::build(registration)), force)
}
