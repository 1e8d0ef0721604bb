//! # pathdispatch
//!
//! **pathdispatch** maps request paths to handler instances, with exact and
//! longest-prefix matching, per-path handler pools, and registrations that can
//! be added, overridden and removed while lookups are in flight.
//!
//! ## Overview
//!
//! A host server asks a [`DispatchManager`] to resolve each incoming path. The
//! manager answers with a [`Resolution`]: either a handler instance from the
//! pool bound to the best-matching registered path, or a synthetic
//! [`ErrorHandler`] (404 for unmatched paths, 503 for an exhausted pool, 500
//! for a registration whose handler could not be built). Resolution never
//! fails and never panics.
//!
//! ## Architecture
//!
//! - **[`router`]** - The path matching rule and deterministic longest-prefix scan
//! - **[`pool`]** - Singleton and FIFO handler pools, factories and initializers
//! - **[`table`]** - Exact path registry plus the stack of overridden (parked) pools
//! - **[`cache`]** - Epoch-tagged memo of prefix results for singleton pools
//! - **[`dispatcher`]** - The `DispatchManager` contract and its three strategies
//! - **[`config`]** - Environment-driven configuration and strategy selection
//! - **[`registry`]** - YAML/TOML route manifests and named handler factories
//! - **[`metrics`]** - Lock-free counters with a serializable snapshot
//! - **[`logging`]** - `tracing-subscriber` setup for applications
//! - **[`cli`]** - The `pathdispatch` command line, driven by [`echo`] handlers
//!
//! ### Lookup Flow
//!
//! ```text
//! resolve("/files/a.txt")
//!   ├─ exact probe ────────── "/files/a.txt" registered? ──► pool
//!   ├─ implier cache ──────── memoized prefix result? ─────► pool / 404
//!   ├─ longest-prefix scan ── "/files*" ───────────────────► pool (cache if singleton)
//!   └─ nothing matched ────── ErrorHandler(NotFound) ──────► cached 404
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use pathdispatch::config::{build_dispatcher, DispatchConfig, Strategy};
//! use pathdispatch::dispatcher::DispatchManager;
//! use pathdispatch::pool::Registration;
//!
//! let manager = build_dispatcher::<String>(&DispatchConfig::new(Strategy::Optimistic));
//!
//! manager.register(Registration::singleton("/static*", "assets".to_string())).unwrap();
//! manager
//!     .register(
//!         Registration::factory("/jobs", |_path: &str| -> anyhow::Result<String> {
//!             Ok("worker".to_string())
//!         })
//!         .pooled(2),
//!     )
//!     .unwrap();
//!
//! let job = manager.resolve("/jobs");
//! assert_eq!(job.handler().map(String::as_str), Some("worker"));
//! manager.release(job).unwrap();
//!
//! let asset = manager.resolve("/static/app.css");
//! assert_eq!(asset.matched(), Some("/static*"));
//! ```
//!
//! ## Strategies
//!
//! `plain` relies on the concurrent maps alone, `locked` serializes prefix
//! scans behind a read/write lock, and `optimistic` lets readers run without
//! blocking and retry when a writer interferes. See [`dispatcher`].
//!
//! ## Caller Contract
//!
//! Every resolution of a FIFO pool must be handed back through
//! [`DispatchManager::release`]. Registrations are immutable once bound:
//! change a path by force-registering over it (the old pool is parked) and
//! unregistering to restore it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod router;
pub mod table;

pub use config::{build_dispatcher, DispatchConfig, Strategy};
pub use dispatcher::{
    DispatchManager, LockedDispatcher, MatchKind, OptimisticDispatcher, PlainDispatcher,
    Resolution,
};
pub use error::{DispatchError, ErrorHandler, ErrorKind};
pub use ids::InstanceId;
pub use pool::{
    HandlerFactory, HandlerInitializer, HandlerInstance, PoolKind, Populate, Registration, Target,
};
pub use registry::{register_manifest, FactoryRegistry, RouteManifest};
