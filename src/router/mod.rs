//! # Router Module
//!
//! Path matching for the dispatch layer.
//!
//! ## Matching Rule
//!
//! A registered path either ends in the wildcard marker `*` or it does not:
//!
//! - `"/files*"` has the effective prefix `"/files"` and matches every request
//!   path that starts with `"/files"`.
//! - `"/files"` matches itself exactly, and is *also* eligible as a bare
//!   prefix for deeper request paths such as `"/files/a/b"`.
//!
//! Exact registrations always win; this module only decides which of the
//! remaining registrations is the longest prefix of the request path.
//!
//! ## Tie-break
//!
//! When two registrations match with prefixes of equal length (for example
//! `"/a"` and `"/a*"`), the lexicographically smallest registered path wins.
//! The result never depends on map iteration order.
//!
//! ## Example
//!
//! ```rust
//! use pathdispatch::router::PathResolver;
//!
//! assert!(PathResolver::matches("/a/b*", "/a/b/c"));
//! assert!(PathResolver::matches("/a", "/a/b"));
//! assert!(!PathResolver::matches("/a/b*", "/a"));
//!
//! let entries = vec![("/a*", 1), ("/a/b*", 2)];
//! let best = PathResolver::find_longest_match(entries, "/a/b/c");
//! assert_eq!(best, Some(("/a/b*", 2)));
//! ```

mod core;

pub use core::{PathResolver, WILDCARD};
