//! # CLI Module
//!
//! Command-line front end over a route manifest, backed by echo handlers.
//!
//! ## Commands
//!
//! ### `resolve`
//!
//! Resolve request paths and print one JSON line per path:
//!
//! ```bash
//! pathdispatch resolve --manifest routes.yaml --strategy optimistic /files/a.txt /jobs
//! ```
//!
//! ### `routes`
//!
//! Print the pool statistics of every registered path:
//!
//! ```bash
//! pathdispatch routes --manifest routes.yaml
//! ```
//!
//! ### `stress`
//!
//! Resolve paths from `--threads` readers while a writer thread repeatedly
//! force-registers and unregisters manifest routes, then print a report with
//! the metrics snapshot:
//!
//! ```bash
//! pathdispatch stress --manifest routes.yaml --threads 8 --iterations 100000 /files/a /jobs
//! ```
//!
//! The dispatch strategy defaults to `PATHDISPATCH_STRATEGY`; see
//! [`crate::config`].

mod commands;


pub use commands::{
    load_manager, resolve_paths, run_cli, run_stress, Cli, Commands, LoadedManifest, StressReport,
};
