//! # Handler Pool Module
//!
//! A [`HandlerPool`] owns the handler instances for exactly one registered path.
//!
//! ## Kinds
//!
//! - **Singleton**: one shared instance, handed out on every resolution and
//!   never removed. Singleton resolutions are cacheable.
//! - **FIFO** (`PoolKind::Fifo { capacity }`): up to `capacity` pooled
//!   instances. A resolution dequeues one instance, and nobody else sees it
//!   until the caller releases it. If the queue is empty and the pool has a
//!   factory, a fresh instance is created on demand. Surplus instances are
//!   retired on release once the queue is full again.
//!
//! ## Lifecycle
//!
//! Pools are built from a [`Registration`] before the dispatch table is locked.
//! Every instance runs through the optional [`HandlerInitializer`] exactly once
//! before it is first enqueued. Instances whose factory or initializer fails
//! are logged and skipped; if nothing usable is left, the pool degrades to a
//! singleton that serves an [`ErrorHandler`] for its path.

use crate::error::{ErrorHandler, ErrorKind, PoolError};
use crate::ids::InstanceId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

/// Creates handler instances for a registered path
///
/// Invoked eagerly at registration time to pre-populate a pool, or lazily
/// when a pool is empty. Any `Fn(&str) -> anyhow::Result<H>` closure works.
pub trait HandlerFactory<H>: Send + Sync {
    /// Build a new, uninitialized handler for `path`
    fn create(&self, path: &str) -> anyhow::Result<H>;
}

impl<H, F> HandlerFactory<H> for F
where
    F: Fn(&str) -> anyhow::Result<H> + Send + Sync,
{
    fn create(&self, path: &str) -> anyhow::Result<H> {
        self(path)
    }
}

/// Per-instance initialization step (configuration injection)
pub trait HandlerInitializer<H>: Send + Sync {
    /// Prepare `handler` to serve `path`; called once per instance
    fn initialize(&self, path: &str, handler: &mut H) -> anyhow::Result<()>;
}

impl<H, F> HandlerInitializer<H> for F
where
    F: Fn(&str, &mut H) -> anyhow::Result<()> + Send + Sync,
{
    fn initialize(&self, path: &str, handler: &mut H) -> anyhow::Result<()> {
        self(path, handler)
    }
}

/// A handler instance owned by a pool
///
/// Not `Clone`: a FIFO instance is exclusively held by whoever dequeued it,
/// who may mutate it through [`handler_mut`](Self::handler_mut). Singleton
/// pools hand out internal copies that share the same id and the same
/// underlying allocation.
pub struct HandlerInstance<H> {
    id: InstanceId,
    handler: Arc<H>,
}

impl<H> HandlerInstance<H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            id: InstanceId::new(),
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn share(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access while this value is the only holder of the handler
    ///
    /// Always `Some` for an instance dequeued from a FIFO pool; `None` for a
    /// singleton, whose handler is shared with every other resolution.
    #[must_use]
    pub fn handler_mut(&mut self) -> Option<&mut H> {
        Arc::get_mut(&mut self.handler)
    }

    /// True if both values refer to the same underlying handler
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl<H> Deref for HandlerInstance<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handler
    }
}

impl<H> fmt::Debug for HandlerInstance<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance").field("id", &self.id).finish()
    }
}

/// What a pool hands back for a resolution
#[derive(Debug)]
pub enum Target<H> {
    /// A usable handler instance
    Handler(HandlerInstance<H>),
    /// The synthetic error handler for this path
    Error(Arc<ErrorHandler>),
}

impl<H> Target<H> {
    pub(crate) fn share(&self) -> Self {
        match self {
            Target::Handler(instance) => Target::Handler(instance.share()),
            Target::Error(handler) => Target::Error(Arc::clone(handler)),
        }
    }
}

/// Pool discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolKind {
    /// One shared instance, never exclusive
    Singleton,
    /// Up to `capacity` instances, each used by one caller at a time
    Fifo {
        /// Maximum number of queued instances
        capacity: usize,
    },
}

/// When a factory-backed pool creates its instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Populate {
    /// Build every instance at registration time
    #[default]
    Eager,
    /// Build instances on first resolution
    Lazy,
}

impl Populate {
    /// Parse populate mode from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "eager" => Some(Self::Eager),
            "lazy" => Some(Self::Lazy),
            _ => None,
        }
    }
}

enum Source<H> {
    Instances(Vec<H>),
    Factory(Arc<dyn HandlerFactory<H>>),
}

/// Everything needed to register one path
///
/// ```rust
/// use pathdispatch::pool::Registration;
///
/// let reg = Registration::factory("/jobs", |_path: &str| -> anyhow::Result<String> {
///     Ok(String::from("worker"))
/// })
///     .pooled(8)
///     .lazy();
/// assert_eq!(reg.path(), "/jobs");
/// ```
pub struct Registration<H> {
    path: String,
    source: Source<H>,
    kind: PoolKind,
    populate: Populate,
    force: bool,
    initializer: Option<Arc<dyn HandlerInitializer<H>>>,
}

impl<H> Registration<H> {
    /// A singleton binding around a ready-made handler
    pub fn singleton(path: impl Into<String>, handler: H) -> Self {
        Self::with_source(path, Source::Instances(vec![handler]), PoolKind::Singleton)
    }

    /// A singleton binding whose handler comes from `factory`
    ///
    /// Call [`pooled`](Self::pooled) to turn it into a FIFO pool.
    pub fn factory<F>(path: impl Into<String>, factory: F) -> Self
    where
        F: HandlerFactory<H> + 'static,
    {
        Self::from_factory(path, Arc::new(factory))
    }

    /// Like [`factory`](Self::factory) for a factory shared between paths
    pub fn from_factory(path: impl Into<String>, factory: Arc<dyn HandlerFactory<H>>) -> Self {
        Self::with_source(path, Source::Factory(factory), PoolKind::Singleton)
    }

    /// A FIFO pool over a fixed set of instances, with no factory
    pub fn instances(path: impl Into<String>, handlers: Vec<H>) -> Self {
        let capacity = handlers.len().max(1);
        Self::with_source(path, Source::Instances(handlers), PoolKind::Fifo { capacity })
    }

    fn with_source(path: impl Into<String>, source: Source<H>, kind: PoolKind) -> Self {
        Self {
            path: path.into(),
            source,
            kind,
            populate: Populate::Eager,
            force: false,
            initializer: None,
        }
    }

    /// Serve the path from a FIFO pool of `capacity` instances
    #[must_use]
    pub fn pooled(mut self, capacity: usize) -> Self {
        self.kind = PoolKind::Fifo { capacity };
        self
    }

    #[must_use]
    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate = populate;
        self
    }

    #[must_use]
    pub fn lazy(self) -> Self {
        self.populate(Populate::Lazy)
    }

    /// Allow replacing an existing binding; the old pool is parked
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn initializer<I>(mut self, initializer: I) -> Self
    where
        I: HandlerInitializer<H> + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.force
    }
}

enum Shared<H> {
    Ready(HandlerInstance<H>),
    Failed(Arc<ErrorHandler>),
}

enum Slot<H> {
    Shared(OnceLock<Shared<H>>),
    Fifo {
        queue: Mutex<VecDeque<HandlerInstance<H>>>,
        capacity: usize,
    },
}

/// Point-in-time view of a pool for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub path: String,
    pub kind: PoolKind,
    /// Instances currently queued (always 1 for a ready singleton)
    pub available: usize,
    /// Instances the pool currently owns, queued or in flight
    pub live: usize,
    /// Instances ever built for this pool
    pub created: u64,
    /// Instances built because the queue was empty at resolution time
    pub created_on_demand: u64,
    /// Releases rejected because the queue was already full
    pub overflows: u64,
    pub degraded: bool,
}

/// The instances serving one registered path
pub struct HandlerPool<H> {
    path: Arc<str>,
    slot: Slot<H>,
    factory: Option<Arc<dyn HandlerFactory<H>>>,
    initializer: Option<Arc<dyn HandlerInitializer<H>>>,
    live: AtomicUsize,
    created: AtomicU64,
    created_on_demand: AtomicU64,
    overflows: AtomicU64,
}

impl<H> HandlerPool<H> {
    /// Build a pool from a registration, running factories and initializers
    ///
    /// Never fails: per-instance failures are logged, and a pool left with no
    /// usable instance and no way to make one degrades to an error singleton.
    #[must_use]
    pub fn build(registration: Registration<H>) -> Self {
        let Registration {
            path,
            source,
            kind,
            populate,
            initializer,
            ..
        } = registration;
        let path: Arc<str> = Arc::from(path);

        match kind {
            PoolKind::Singleton => Self::build_singleton(path, source, populate, initializer),
            PoolKind::Fifo { capacity } => {
                Self::build_fifo(path, source, capacity, populate, initializer)
            }
        }
    }

    fn empty(
        path: Arc<str>,
        slot: Slot<H>,
        factory: Option<Arc<dyn HandlerFactory<H>>>,
        initializer: Option<Arc<dyn HandlerInitializer<H>>>,
    ) -> Self {
        Self {
            path,
            slot,
            factory,
            initializer,
            live: AtomicUsize::new(0),
            created: AtomicU64::new(0),
            created_on_demand: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// A singleton pool serving only the given error handler
    #[must_use]
    pub fn degraded(path: &str, handler: ErrorHandler) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(Shared::Failed(Arc::new(handler)));
        Self::empty(Arc::from(path), Slot::Shared(slot), None, None)
    }

    /// A FIFO pool holding a single caller-supplied instance, with no factory
    #[must_use]
    pub fn ad_hoc(path: &str, handler: H, capacity: usize) -> Self {
        let pool = Self::empty(
            Arc::from(path),
            Slot::Fifo {
                queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                capacity: capacity.max(1),
            },
            None,
            None,
        );
        match pool.prepare(handler) {
            Ok(instance) => pool.push_new(instance),
            Err(e) => pool.log_build_failure(&e),
        }
        pool
    }

    fn build_singleton(
        path: Arc<str>,
        source: Source<H>,
        populate: Populate,
        initializer: Option<Arc<dyn HandlerInitializer<H>>>,
    ) -> Self {
        match source {
            Source::Instances(handlers) => {
                if handlers.len() > 1 {
                    warn!(
                        path = %path,
                        supplied = handlers.len(),
                        "Singleton registration given several instances; keeping the first"
                    );
                }
                let pool = Self::empty(path, Slot::Shared(OnceLock::new()), None, initializer);
                let state = match handlers.into_iter().next() {
                    Some(handler) => pool.prepare(handler),
                    None => Err(anyhow::anyhow!("no handler instance supplied")),
                };
                pool.settle_singleton(state);
                pool
            }
            Source::Factory(factory) => {
                let pool = Self::empty(
                    path,
                    Slot::Shared(OnceLock::new()),
                    Some(factory),
                    initializer,
                );
                if populate == Populate::Eager {
                    let state = pool.create_instance();
                    pool.settle_singleton(state);
                }
                pool
            }
        }
    }

    fn build_fifo(
        path: Arc<str>,
        source: Source<H>,
        capacity: usize,
        populate: Populate,
        initializer: Option<Arc<dyn HandlerInitializer<H>>>,
    ) -> Self {
        let capacity = if capacity == 0 {
            warn!(path = %path, "FIFO pool registered with capacity 0; using 1");
            1
        } else {
            capacity
        };
        let slot = Slot::Fifo {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        };

        let pool = match source {
            Source::Instances(handlers) => {
                let pool = Self::empty(Arc::clone(&path), slot, None, initializer);
                if handlers.len() > capacity {
                    warn!(
                        path = %path,
                        supplied = handlers.len(),
                        capacity = capacity,
                        "More instances than capacity; extras dropped"
                    );
                }
                for handler in handlers.into_iter().take(capacity) {
                    match pool.prepare(handler) {
                        Ok(instance) => pool.push_new(instance),
                        Err(e) => pool.log_build_failure(&e),
                    }
                }
                pool
            }
            Source::Factory(factory) => {
                let pool = Self::empty(Arc::clone(&path), slot, Some(factory), initializer);
                if populate == Populate::Eager {
                    for _ in 0..capacity {
                        match pool.create_instance() {
                            Ok(instance) => pool.push_new(instance),
                            Err(e) => pool.log_build_failure(&e),
                        }
                    }
                }
                pool
            }
        };

        let starved = pool.available() == 0
            && (pool.factory.is_none() || populate == Populate::Eager);
        if starved {
            error!(
                path = %path,
                capacity = capacity,
                "No handler instance could be built; serving error handler"
            );
            return Self::degraded(
                &path,
                ErrorHandler::new(
                    ErrorKind::InitializationFailed,
                    &path,
                    format!("handler for '{}' failed to initialize", path),
                ),
            );
        }

        info!(
            path = %path,
            capacity = capacity,
            available = pool.available(),
            populate = ?populate,
            "FIFO handler pool built"
        );
        pool
    }

    fn prepare(&self, mut handler: H) -> anyhow::Result<HandlerInstance<H>> {
        if let Some(initializer) = &self.initializer {
            initializer.initialize(&self.path, &mut handler)?;
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(HandlerInstance::new(handler))
    }

    fn create_instance(&self) -> anyhow::Result<HandlerInstance<H>> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("pool has no factory"))?;
        let handler = factory.create(&self.path)?;
        self.prepare(handler)
    }

    fn log_build_failure(&self, err: &anyhow::Error) {
        error!(
            path = %self.path,
            error = %err,
            "Handler instance failed to build; not enqueued"
        );
    }

    fn settle_singleton(&self, state: anyhow::Result<HandlerInstance<H>>) {
        if let Slot::Shared(cell) = &self.slot {
            let _ = cell.get_or_init(|| self.shared_from(state));
        }
    }

    fn shared_from(&self, state: anyhow::Result<HandlerInstance<H>>) -> Shared<H> {
        match state {
            Ok(instance) => {
                self.live.store(1, Ordering::Relaxed);
                Shared::Ready(instance)
            }
            Err(e) => {
                self.log_build_failure(&e);
                Shared::Failed(Arc::new(ErrorHandler::new(
                    ErrorKind::InitializationFailed,
                    &self.path,
                    format!("handler for '{}' failed to initialize: {}", self.path, e),
                )))
            }
        }
    }

    fn push_new(&self, instance: HandlerInstance<H>) {
        if let Slot::Fifo { queue, .. } = &self.slot {
            queue.lock().push_back(instance);
            self.live.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> PoolKind {
        match &self.slot {
            Slot::Shared(_) => PoolKind::Singleton,
            Slot::Fifo { capacity, .. } => PoolKind::Fifo {
                capacity: *capacity,
            },
        }
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        matches!(self.slot, Slot::Shared(_))
    }

    /// True if this pool only ever serves an error handler
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(&self.slot, Slot::Shared(cell) if matches!(cell.get(), Some(Shared::Failed(_))))
    }

    #[must_use]
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Number of instances ready to be handed out
    #[must_use]
    pub fn available(&self) -> usize {
        match &self.slot {
            Slot::Shared(cell) => usize::from(matches!(cell.get(), Some(Shared::Ready(_)))),
            Slot::Fifo { queue, .. } => queue.lock().len(),
        }
    }

    /// Add a new instance to a FIFO pool
    ///
    /// Fails with [`PoolError::Overflow`] if the queue is full. Singleton pools
    /// are immutable once bound, so this is a no-op for them.
    pub fn enqueue(&self, instance: HandlerInstance<H>) -> Result<(), PoolError> {
        let Slot::Fifo { queue, capacity } = &self.slot else {
            debug!(path = %self.path, "Enqueue on singleton pool ignored");
            return Ok(());
        };
        let mut queue = queue.lock();
        if queue.len() >= *capacity {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Overflow {
                capacity: *capacity,
            });
        }
        queue.push_back(instance);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Initialize a caller-supplied handler and enqueue it
    ///
    /// The instance goes through the pool's initializer like any other. If the
    /// initializer fails the handler is dropped and [`PoolError::Rejected`] is
    /// returned; a full queue yields [`PoolError::Overflow`] without running it.
    pub fn adopt(&self, handler: H) -> Result<(), PoolError> {
        let Slot::Fifo { queue, capacity } = &self.slot else {
            debug!(path = %self.path, "Adopt on singleton pool ignored");
            return Ok(());
        };
        if queue.lock().len() >= *capacity {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Overflow {
                capacity: *capacity,
            });
        }
        let instance = self.prepare(handler).map_err(|e| {
            self.log_build_failure(&e);
            PoolError::Rejected {
                message: e.to_string(),
            }
        })?;
        self.enqueue(instance)
    }

    /// Remove one available instance without consulting the factory
    pub fn dequeue(&self) -> Result<HandlerInstance<H>, PoolError> {
        match &self.slot {
            Slot::Shared(_) => Err(PoolError::Empty),
            Slot::Fifo { queue, .. } => queue.lock().pop_front().ok_or(PoolError::Empty),
        }
    }

    /// Obtain a handler for a request routed to this pool
    ///
    /// Singletons return their shared instance. FIFO pools dequeue, falling
    /// back to the factory when empty; with no factory the caller gets a
    /// `PoolExhausted` error handler.
    pub fn resolve(&self, request_path: &str) -> Target<H> {
        match &self.slot {
            Slot::Shared(cell) => {
                let shared = cell.get_or_init(|| self.shared_from(self.create_instance()));
                match shared {
                    Shared::Ready(instance) => Target::Handler(instance.share()),
                    Shared::Failed(handler) => Target::Error(Arc::clone(handler)),
                }
            }
            Slot::Fifo { capacity, .. } => match self.dequeue() {
                Ok(instance) => Target::Handler(instance),
                Err(_) if self.factory.is_some() => match self.create_instance() {
                    Ok(instance) => {
                        self.created_on_demand.fetch_add(1, Ordering::Relaxed);
                        self.live.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            path = %self.path,
                            request_path = %request_path,
                            instance_id = %instance.id(),
                            "Pool empty; created instance on demand"
                        );
                        Target::Handler(instance)
                    }
                    Err(e) => {
                        self.log_build_failure(&e);
                        Target::Error(Arc::new(ErrorHandler::new(
                            ErrorKind::InitializationFailed,
                            request_path,
                            format!("handler for '{}' failed to initialize: {}", self.path, e),
                        )))
                    }
                },
                Err(_) => {
                    warn!(
                        path = %self.path,
                        request_path = %request_path,
                        capacity = *capacity,
                        "Pool exhausted and has no factory"
                    );
                    Target::Error(Arc::new(ErrorHandler::new(
                        ErrorKind::PoolExhausted,
                        request_path,
                        format!("all {} handlers for '{}' are busy", capacity, self.path),
                    )))
                }
            },
        }
    }

    /// Return an instance obtained from [`resolve`](Self::resolve)
    ///
    /// No-op for singletons. For FIFO pools the instance is re-enqueued; if the
    /// queue is already full, an instance created on demand is retired, and
    /// anything else is a [`PoolError::Overflow`].
    pub fn release(&self, instance: HandlerInstance<H>) -> Result<(), PoolError> {
        let Slot::Fifo { queue, capacity } = &self.slot else {
            return Ok(());
        };
        let mut queue = queue.lock();
        if queue.len() < *capacity {
            queue.push_back(instance);
            return Ok(());
        }
        drop(queue);

        if self.live.load(Ordering::Relaxed) > *capacity {
            self.live.fetch_sub(1, Ordering::Relaxed);
            debug!(
                path = %self.path,
                instance_id = %instance.id(),
                "Queue full; retired surplus instance"
            );
            return Ok(());
        }

        self.overflows.fetch_add(1, Ordering::Relaxed);
        Err(PoolError::Overflow {
            capacity: *capacity,
        })
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            path: self.path.to_string(),
            kind: self.kind(),
            available: self.available(),
            live: self.live.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            created_on_demand: self.created_on_demand.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
        }
    }
}

impl<H> fmt::Debug for HandlerPool<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerPool")
            .field("path", &self.path)
            .field("kind", &self.kind())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_factory(counter: Arc<AtomicUsize>) -> impl HandlerFactory<usize> {
        move |_path: &str| -> anyhow::Result<usize> { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
    }

    #[test]
    fn singleton_returns_same_instance() {
        let pool = HandlerPool::build(Registration::singleton("/a", 7u32));
        let (Target::Handler(a), Target::Handler(b)) = (pool.resolve("/a"), pool.resolve("/a"))
        else {
            panic!("expected handlers");
        };
        assert_eq!(a.id(), b.id());
        assert!(a.ptr_eq(&b));
        assert_eq!(*a, 7);
        assert!(pool.release(a).is_ok());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn eager_fifo_prepopulates_capacity() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = HandlerPool::build(
            Registration::factory("/jobs", counting_factory(Arc::clone(&counter))).pooled(3),
        );
        assert_eq!(pool.available(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(pool.kind(), PoolKind::Fifo { capacity: 3 });
    }

    #[test]
    fn lazy_fifo_creates_on_first_resolve() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = HandlerPool::build(
            Registration::factory("/jobs", counting_factory(Arc::clone(&counter)))
                .pooled(2)
                .lazy(),
        );
        assert_eq!(pool.available(), 0);
        let Target::Handler(instance) = pool.resolve("/jobs") else {
            panic!("expected handler");
        };
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.release(instance).unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.stats().created_on_demand, 1);
    }

    #[test]
    fn dequeued_instance_is_exclusive_until_released() {
        let pool = HandlerPool::build(Registration::instances("/x", vec![1u8, 2u8]));
        let Target::Handler(first) = pool.resolve("/x") else {
            panic!("expected handler");
        };
        let Target::Handler(second) = pool.resolve("/x") else {
            panic!("expected handler");
        };
        assert_ne!(first.id(), second.id());

        // No factory: a third caller gets the exhausted error handler
        match pool.resolve("/x") {
            Target::Error(handler) => assert_eq!(handler.kind(), ErrorKind::PoolExhausted),
            Target::Handler(_) => panic!("pool should be exhausted"),
        }

        let first_id = first.id();
        pool.release(first).unwrap();
        let Target::Handler(again) = pool.resolve("/x") else {
            panic!("expected handler");
        };
        assert_eq!(again.id(), first_id);
        pool.release(again).unwrap();
        pool.release(second).unwrap();
    }

    #[test]
    fn dequeue_without_factory_reports_empty() {
        let pool = HandlerPool::build(Registration::instances("/x", vec![1u8]));
        let held = pool.dequeue().unwrap();
        assert_eq!(pool.dequeue().unwrap_err(), PoolError::Empty);
        pool.release(held).unwrap();
    }

    #[test]
    fn enqueue_into_full_pool_overflows() {
        let pool = HandlerPool::build(Registration::instances("/x", vec![1u8]));
        let extra = HandlerInstance::new(2u8);
        assert_eq!(
            pool.enqueue(extra).unwrap_err(),
            PoolError::Overflow { capacity: 1 }
        );
        assert_eq!(pool.stats().overflows, 1);
    }

    #[test]
    fn adopted_instances_run_the_initializer() {
        let pool = HandlerPool::build(
            Registration::instances("/adopt", vec![0u32])
                .pooled(3)
                .initializer(|_p: &str, h: &mut u32| -> anyhow::Result<()> {
                    if *h % 2 == 1 {
                        anyhow::bail!("odd handler");
                    }
                    *h += 1000;
                    Ok(())
                }),
        );
        pool.adopt(4).unwrap();
        assert_eq!(
            pool.adopt(5).unwrap_err(),
            PoolError::Rejected {
                message: "odd handler".to_string()
            }
        );
        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.created, 2);

        let first = pool.dequeue().unwrap();
        let second = pool.dequeue().unwrap();
        assert_eq!((*first, *second), (1000, 1004));
        pool.release(first).unwrap();
        pool.release(second).unwrap();
    }

    #[test]
    fn adopt_into_full_pool_skips_initializer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pool = HandlerPool::build(Registration::instances("/full", vec![1u8]).initializer(
            move |_p: &str, _h: &mut u8| -> anyhow::Result<()> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ));
        assert_eq!(
            pool.adopt(2).unwrap_err(),
            PoolError::Overflow { capacity: 1 }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dequeued_instance_is_mutable_and_keeps_changes() {
        let pool = HandlerPool::build(Registration::instances("/count", vec![0u32]));
        for _ in 0..3 {
            let mut instance = pool.dequeue().unwrap();
            *instance.handler_mut().unwrap() += 1;
            pool.release(instance).unwrap();
        }
        assert_eq!(*pool.dequeue().unwrap(), 3);

        let single = HandlerPool::build(Registration::singleton("/one", 1u8));
        let Target::Handler(mut shared) = single.resolve("/one") else {
            panic!("expected handler");
        };
        assert!(shared.handler_mut().is_none());
    }

    #[test]
    fn surplus_on_demand_instances_are_retired() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = HandlerPool::build(
            Registration::factory("/jobs", counting_factory(Arc::clone(&counter))).pooled(1),
        );
        let Target::Handler(a) = pool.resolve("/jobs") else {
            panic!("expected handler");
        };
        let Target::Handler(b) = pool.resolve("/jobs") else {
            panic!("expected handler");
        };
        assert_eq!(pool.stats().live, 2);
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.overflows, 0);
    }

    #[test]
    fn initializer_runs_once_per_instance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pool = HandlerPool::build(
            Registration::factory("/init", |_p: &str| -> anyhow::Result<usize> { Ok(0) })
                .pooled(4)
                .initializer(move |_p: &str, h: &mut usize| -> anyhow::Result<()> {
                    *h = seen.fetch_add(1, Ordering::SeqCst) + 100;
                    Ok(())
                }),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let Target::Handler(instance) = pool.resolve("/init") else {
            panic!("expected handler");
        };
        assert!(*instance >= 100);
        pool.release(instance).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failing_initializer_degrades_singleton() {
        let pool = HandlerPool::build(
            Registration::singleton("/broken", 1u8)
                .initializer(|_p: &str, _h: &mut u8| -> anyhow::Result<()> {
                    Err(anyhow::anyhow!("bad config"))
                }),
        );
        assert!(pool.is_degraded());
        assert!(pool.is_singleton());
        match pool.resolve("/broken") {
            Target::Error(handler) => {
                assert_eq!(handler.kind(), ErrorKind::InitializationFailed);
                assert!(handler.message().contains("bad config"));
            }
            Target::Handler(_) => panic!("expected error handler"),
        }
    }

    #[test]
    fn partial_factory_failures_keep_good_instances() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = HandlerPool::build(
            Registration::factory("/flaky", move |_p: &str| -> anyhow::Result<usize> {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    Ok(n)
                } else {
                    Err(anyhow::anyhow!("odd instance"))
                }
            })
            .pooled(4),
        );
        assert!(!pool.is_degraded());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn all_instances_failing_degrades_fifo_to_singleton() {
        let pool = HandlerPool::build(
            Registration::factory("/dead", |_p: &str| -> anyhow::Result<u8> {
                Err(anyhow::anyhow!("unavailable"))
            })
            .pooled(3),
        );
        assert!(pool.is_singleton());
        assert!(pool.stats().degraded);
    }

    #[test]
    fn populate_parse() {
        assert_eq!(Populate::parse("LAZY"), Some(Populate::Lazy));
        assert_eq!(Populate::parse("eager"), Some(Populate::Eager));
        assert_eq!(Populate::parse("sometimes"), None);
    }
}
