//! # Implier Cache Module
//!
//! Memoizes longest-prefix resolutions for request paths that have no exact
//! registration, so the O(registrations) scan runs once per distinct path
//! between structural changes.
//!
//! ## Rules
//!
//! - Only singleton results are stored: a prefix match onto a singleton pool,
//!   or the synthetic not-found handler. Caching a FIFO pool would let callers
//!   skip its dequeue/release discipline.
//! - Every registration, unregistration and forced override clears the cache.
//! - The cache holds at most `max_entries` paths. Unmatched paths are cached
//!   too, so a stream of distinct unknown paths would otherwise grow it until
//!   the next mutation; reaching the bound clears it.
//!
//! ## Epochs
//!
//! `clear()` bumps an epoch counter before emptying the map, and each entry
//! remembers the epoch it was computed under. A lookup that raced with a
//! mutation (it read the epoch, scanned the old table, and inserted after the
//! clear) leaves behind an entry from an old epoch, which `get` never returns.
//! Writers must clear *after* mutating the table for this to hold.

use crate::error::ErrorHandler;
use crate::pool::HandlerPool;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Bound used by [`ImplierCache::new`]
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// A memoized resolution
pub enum Cached<H> {
    /// Prefix match onto a singleton pool
    Pool {
        matched: Arc<str>,
        pool: Arc<HandlerPool<H>>,
    },
    /// No registration matches this path
    NotFound(Arc<ErrorHandler>),
}

impl<H> Clone for Cached<H> {
    fn clone(&self) -> Self {
        match self {
            Cached::Pool { matched, pool } => Cached::Pool {
                matched: Arc::clone(matched),
                pool: Arc::clone(pool),
            },
            Cached::NotFound(handler) => Cached::NotFound(Arc::clone(handler)),
        }
    }
}

struct Slot<H> {
    epoch: u64,
    entry: Cached<H>,
}

/// Request path → memoized resolution
pub struct ImplierCache<H> {
    entries: DashMap<Arc<str>, Slot<H>>,
    epoch: AtomicU64,
    max_entries: usize,
}

impl<H> Default for ImplierCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ImplierCache<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            epoch: AtomicU64::new(0),
            max_entries: max_entries.max(1),
        }
    }

    /// Current epoch; read it *before* scanning the table
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn get(&self, request_path: &str) -> Option<Cached<H>> {
        let current = self.epoch();
        let slot = self.entries.get(request_path)?;
        if slot.epoch != current {
            return None;
        }
        Some(slot.entry.clone())
    }

    /// Store a resolution computed under `epoch`
    ///
    /// Returns false if the entry was refused: a non-singleton pool, an
    /// epoch that a clear has already superseded, or a full cache (which is
    /// cleared instead).
    pub fn insert(&self, request_path: &str, entry: Cached<H>, epoch: u64) -> bool {
        if let Cached::Pool { pool, .. } = &entry {
            if !pool.is_singleton() {
                debug!(
                    request_path = %request_path,
                    matched = %pool.path(),
                    "Refusing to cache FIFO pool resolution"
                );
                return false;
            }
        }
        if epoch != self.epoch() {
            debug!(
                request_path = %request_path,
                epoch = epoch,
                "Dropping cache entry from superseded epoch"
            );
            return false;
        }
        if !self.entries.contains_key(request_path) && self.entries.len() >= self.max_entries {
            info!(max_entries = self.max_entries, "Implier cache full; clearing");
            self.clear();
            return false;
        }
        self.entries
            .insert(Arc::from(request_path), Slot { epoch, entry });
        true
    }

    /// Invalidate every entry
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// Number of live (current-epoch) entries
    #[must_use]
    pub fn len(&self) -> usize {
        let current = self.epoch();
        self.entries.iter().filter(|s| s.epoch == current).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
