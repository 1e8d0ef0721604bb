//! # Dispatch Table Module
//!
//! The exact-match registry: registered path → active [`HandlerPool`], plus a
//! [`ParkedPoolStack`] per path holding pools displaced by forced overrides.
//!
//! Each mutating method is one logical transaction on a single path. It holds
//! the path's map entry for the whole operation, so a concurrent exact probe
//! sees either the old binding or the new one, never a gap. The dispatch
//! managers additionally serialize mutations with their own lock discipline.
//!
//! Lock order is always `pools` entry first, then `parked`.

use crate::error::{DispatchError, PoolError};
use crate::pool::{HandlerPool, PoolKind};
use crate::router::PathResolver;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// LIFO history of pools displaced from one path by forced overrides
pub struct ParkedPoolStack<H> {
    stack: SmallVec<[Arc<HandlerPool<H>>; 2]>,
}

impl<H> Default for ParkedPoolStack<H> {
    fn default() -> Self {
        Self {
            stack: SmallVec::new(),
        }
    }
}

impl<H> ParkedPoolStack<H> {
    pub fn push(&mut self, pool: Arc<HandlerPool<H>>) {
        self.stack.push(pool);
    }

    pub fn pop(&mut self) -> Option<Arc<HandlerPool<H>>> {
        self.stack.pop()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Result of binding a pool to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The path was unbound
    Bound,
    /// An existing pool was parked; `depth` is the new stack depth
    Overridden { depth: usize },
}

/// Result of removing a path's active binding
pub enum UnbindOutcome<H> {
    /// The path had no binding
    NotBound,
    /// The binding was removed and the path is now fully unbound
    Unbound(Arc<HandlerPool<H>>),
    /// The binding was removed and the most recently parked pool reinstated
    Restored {
        removed: Arc<HandlerPool<H>>,
        /// Parked pools left after the pop
        depth: usize,
    },
}

/// Result of an ad-hoc put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdHocOutcome {
    /// The path was unbound; a new FIFO pool now holds the instance
    Created,
    /// The instance joined the path's existing FIFO pool
    Enqueued,
    /// The path is bound to a singleton; nothing changed
    IgnoredSingleton,
}

/// Registered path → active pool
pub struct DispatchTable<H> {
    pools: DashMap<Arc<str>, Arc<HandlerPool<H>>>,
    parked: DashMap<Arc<str>, ParkedPoolStack<H>>,
}

impl<H> Default for DispatchTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> DispatchTable<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            parked: DashMap::new(),
        }
    }

    /// Exact-match probe
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<HandlerPool<H>>> {
        self.pools.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Exact-match probe that also hands back the registered key
    #[must_use]
    pub fn get_key_value(&self, path: &str) -> Option<(Arc<str>, Arc<HandlerPool<H>>)> {
        self.pools
            .get(path)
            .map(|entry| (Arc::clone(entry.key()), Arc::clone(entry.value())))
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.pools.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// All registered paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.pools.iter().map(|e| e.key().to_string()).collect();
        paths.sort();
        paths
    }

    /// Longest-prefix scan over every active binding
    #[must_use]
    pub fn longest_match(&self, request_path: &str) -> Option<(Arc<str>, Arc<HandlerPool<H>>)> {
        PathResolver::find_longest_match(
            self.pools
                .iter()
                .map(|e| (Arc::clone(e.key()), Arc::clone(e.value()))),
            request_path,
        )
    }

    /// Depth of the parked stack for `path`
    #[must_use]
    pub fn parked_depth(&self, path: &str) -> usize {
        self.parked.get(path).map_or(0, |stack| stack.len())
    }

    /// Make `pool` the active binding for `path`
    ///
    /// With `force`, an existing binding is parked instead of rejected.
    pub fn bind(
        &self,
        path: &str,
        pool: Arc<HandlerPool<H>>,
        force: bool,
    ) -> Result<BindOutcome, DispatchError> {
        if path.is_empty() {
            return Err(DispatchError::InvalidPath {
                path: path.to_string(),
            });
        }
        let key: Arc<str> = Arc::from(path);
        match self.pools.entry(Arc::clone(&key)) {
            Entry::Occupied(mut occupied) => {
                if !force {
                    return Err(DispatchError::AlreadyRegistered {
                        path: path.to_string(),
                    });
                }
                let displaced = occupied.insert(pool);
                let mut stack = self.parked.entry(key).or_default();
                stack.push(displaced);
                Ok(BindOutcome::Overridden { depth: stack.len() })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pool);
                Ok(BindOutcome::Bound)
            }
        }
    }

    /// Remove the active binding for `path`, reinstating a parked pool if any
    pub fn unbind(&self, path: &str) -> UnbindOutcome<H> {
        let Entry::Occupied(mut occupied) = self.pools.entry(Arc::from(path)) else {
            return UnbindOutcome::NotBound;
        };

        let popped = match self.parked.get_mut(path) {
            Some(mut stack) => stack.pop().map(|pool| (pool, stack.len())),
            None => None,
        };
        self.parked.remove_if(path, |_, stack| stack.is_empty());

        match popped {
            Some((previous, depth)) => {
                let removed = occupied.insert(previous);
                UnbindOutcome::Restored { removed, depth }
            }
            None => UnbindOutcome::Unbound(occupied.remove()),
        }
    }

    /// Offer a ready-made instance for `path`
    ///
    /// Unbound paths get a new FIFO pool of `capacity` holding the instance;
    /// FIFO bindings absorb it; singleton bindings are left untouched.
    pub fn put_ad_hoc(
        &self,
        path: &str,
        handler: H,
        capacity: usize,
    ) -> Result<AdHocOutcome, DispatchError> {
        if path.is_empty() {
            return Err(DispatchError::InvalidPath {
                path: path.to_string(),
            });
        }
        match self.pools.entry(Arc::from(path)) {
            Entry::Occupied(occupied) => {
                let pool = Arc::clone(occupied.get());
                // initializer runs outside the shard lock
                drop(occupied);
                if pool.is_singleton() {
                    return Ok(AdHocOutcome::IgnoredSingleton);
                }
                pool.adopt(handler)
                    .map(|()| AdHocOutcome::Enqueued)
                    .map_err(|e| match e {
                        PoolError::Rejected { message } => DispatchError::InstanceRejected {
                            path: path.to_string(),
                            message,
                        },
                        PoolError::Overflow { .. } | PoolError::Empty => {
                            DispatchError::PoolOverflow {
                                path: path.to_string(),
                                capacity: match pool.kind() {
                                    PoolKind::Fifo { capacity } => capacity,
                                    PoolKind::Singleton => 1,
                                },
                            }
                        }
                    })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(HandlerPool::ad_hoc(path, handler, capacity)));
                Ok(AdHocOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Registration, Target};

    fn singleton(path: &str, value: u32) -> Arc<HandlerPool<u32>> {
        Arc::new(HandlerPool::build(Registration::singleton(path, value)))
    }

    fn value_of(pool: &HandlerPool<u32>) -> u32 {
        match pool.resolve(pool.path()) {
            Target::Handler(instance) => *instance,
            Target::Error(_) => u32::MAX,
        }
    }

    #[test]
    fn bind_rejects_duplicate_without_force() {
        let table = DispatchTable::new();
        assert_eq!(table.bind("/a", singleton("/a", 1), false), Ok(BindOutcome::Bound));
        assert_eq!(
            table.bind("/a", singleton("/a", 2), false),
            Err(DispatchError::AlreadyRegistered {
                path: "/a".to_string()
            })
        );
        assert_eq!(value_of(&table.get("/a").unwrap()), 1);
    }

    #[test]
    fn empty_path_is_invalid() {
        let table = DispatchTable::new();
        assert!(matches!(
            table.bind("", singleton("", 1), false),
            Err(DispatchError::InvalidPath { .. })
        ));
    }

    #[test]
    fn forced_overrides_unwind_in_reverse_order() {
        let table = DispatchTable::new();
        table.bind("/p", singleton("/p", 1), false).unwrap();
        assert_eq!(
            table.bind("/p", singleton("/p", 2), true),
            Ok(BindOutcome::Overridden { depth: 1 })
        );
        assert_eq!(
            table.bind("/p", singleton("/p", 3), true),
            Ok(BindOutcome::Overridden { depth: 2 })
        );
        assert_eq!(value_of(&table.get("/p").unwrap()), 3);

        assert!(matches!(table.unbind("/p"), UnbindOutcome::Restored { depth: 1, .. }));
        assert_eq!(value_of(&table.get("/p").unwrap()), 2);
        assert!(matches!(table.unbind("/p"), UnbindOutcome::Restored { depth: 0, .. }));
        assert_eq!(value_of(&table.get("/p").unwrap()), 1);
        assert_eq!(table.parked_depth("/p"), 0);
        assert!(matches!(table.unbind("/p"), UnbindOutcome::Unbound(_)));
        assert!(!table.contains("/p"));
        assert!(matches!(table.unbind("/p"), UnbindOutcome::NotBound));
    }

    #[test]
    fn put_ad_hoc_respects_existing_bindings() {
        let table = DispatchTable::new();
        table.bind("/s", singleton("/s", 1), false).unwrap();
        assert_eq!(table.put_ad_hoc("/s", 9, 2), Ok(AdHocOutcome::IgnoredSingleton));
        assert_eq!(value_of(&table.get("/s").unwrap()), 1);

        assert_eq!(table.put_ad_hoc("/f", 5, 2), Ok(AdHocOutcome::Created));
        assert_eq!(table.put_ad_hoc("/f", 6, 2), Ok(AdHocOutcome::Enqueued));
        assert_eq!(table.get("/f").unwrap().available(), 2);
        assert_eq!(
            table.put_ad_hoc("/f", 7, 2),
            Err(DispatchError::PoolOverflow {
                path: "/f".to_string(),
                capacity: 2
            })
        );
    }

    #[test]
    fn longest_match_and_paths() {
        let table = DispatchTable::new();
        table.bind("/a*", singleton("/a*", 1), false).unwrap();
        table.bind("/a/b*", singleton("/a/b*", 2), false).unwrap();
        let (matched, pool) = table.longest_match("/a/b/c").unwrap();
        assert_eq!(&*matched, "/a/b*");
        assert_eq!(value_of(&pool), 2);
        assert_eq!(table.paths(), vec!["/a*".to_string(), "/a/b*".to_string()]);
    }
}
