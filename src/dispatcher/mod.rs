//! # Dispatcher Module
//!
//! Resolves request paths to handler instances while registrations change
//! underneath, behind one of three interchangeable concurrency strategies.
//!
//! ## Lookup Order
//!
//! 1. **Exact**: the request path is a registered path.
//! 2. **Cached prefix**: the implier cache remembers an earlier prefix match
//!    (singleton pools and not-found results only).
//! 3. **Prefix scan**: longest registered prefix, ties to the smallest path.
//! 4. **Not found**: a synthetic error handler, cached like a singleton.
//!
//! ## Strategies
//!
//! | Strategy | Readers | Writers |
//! |---|---|---|
//! | [`PlainDispatcher`] | map atomicity only | map atomicity only |
//! | [`LockedDispatcher`] | read lock; upgrade to write on cache miss | write lock |
//! | [`OptimisticDispatcher`] | never block; validate and retry | writer mutex + generation bump |
//!
//! ## Example
//!
//! ```rust
//! use pathdispatch::dispatcher::{DispatchManager, LockedDispatcher, MatchKind};
//! use pathdispatch::pool::Registration;
//!
//! let manager: LockedDispatcher<&'static str> = LockedDispatcher::default();
//! manager.register(Registration::singleton("/files*", "files")).unwrap();
//! manager.register(Registration::singleton("/files/secret", "secret")).unwrap();
//!
//! let exact = manager.resolve("/files/secret");
//! assert_eq!(exact.handler(), Some(&"secret"));
//! assert_eq!(exact.kind(), MatchKind::Exact);
//!
//! let prefix = manager.resolve("/files/public");
//! assert_eq!(prefix.matched(), Some("/files*"));
//!
//! let missing = manager.resolve("/other");
//! assert_eq!(missing.error().map(|e| e.status()), Some(404));
//! ```
//!
//! ## Caller Contract
//!
//! A [`Resolution`] from a FIFO pool holds an instance nobody else can see.
//! Hand it back with [`DispatchManager::release`]; dropping it instead
//! permanently shrinks the pool.

mod core;
mod locked;
mod optimistic;
mod plain;
mod seqlock;

pub use core::{DispatchManager, DispatchState, MatchKind, Resolution};
pub use locked::LockedDispatcher;
pub use optimistic::OptimisticDispatcher;
pub use plain::PlainDispatcher;
pub use seqlock::{ReadStamp, SeqLock, SeqWriteGuard};
