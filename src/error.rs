//! Error types and the synthetic error-signaling handler.
//!
//! Two kinds of failure exist in this crate:
//!
//! - **API misuse** on the registration side (`register`, `put_ad_hoc`,
//!   manifest loading) propagates as a typed [`DispatchError`].
//! - **Resolution failures** never propagate. A request path with no route, a
//!   drained pool without a factory, or a registration whose handlers failed to
//!   build all resolve to an [`ErrorHandler`], so the transport layer always has
//!   a deterministic target to invoke.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Errors surfaced to callers of the registration API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The path already has an active binding and `force` was not set
    AlreadyRegistered {
        /// The conflicting registration path
        path: String,
    },
    /// An instance was returned to a FIFO pool that is already full
    ///
    /// This is a caller bug (usually a double release) and is logged at error
    /// level before being returned.
    PoolOverflow {
        /// Path of the pool that overflowed
        path: String,
        /// Configured capacity of that pool
        capacity: usize,
    },
    /// The registration path is empty
    InvalidPath {
        /// The rejected path
        path: String,
    },
    /// An ad-hoc instance failed its pool's initializer and was not enqueued
    InstanceRejected {
        /// Path of the pool that refused the instance
        path: String,
        /// Initializer error message
        message: String,
    },
    /// A route manifest could not be read or parsed
    Manifest {
        /// Manifest location
        source_path: String,
        /// Parser or I/O error message
        message: String,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::AlreadyRegistered { path } => {
                write!(
                    f,
                    "path '{}' is already registered; use force to override the existing binding",
                    path
                )
            }
            DispatchError::PoolOverflow { path, capacity } => {
                write!(
                    f,
                    "handler pool for '{}' is full (capacity {}); instance was released twice or never dequeued",
                    path, capacity
                )
            }
            DispatchError::InvalidPath { path } => {
                write!(f, "invalid registration path '{}'", path)
            }
            DispatchError::InstanceRejected { path, message } => {
                write!(f, "instance offered to '{}' failed to initialize: {}", path, message)
            }
            DispatchError::Manifest {
                source_path,
                message,
            } => {
                write!(f, "failed to load route manifest '{}': {}", source_path, message)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Pool-level discipline violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No instance is available and the pool has no factory
    Empty,
    /// Enqueue would exceed the pool's capacity
    Overflow {
        /// Configured capacity
        capacity: usize,
    },
    /// The pool's initializer refused an offered instance
    Rejected {
        /// Initializer error message
        message: String,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Empty => write!(f, "pool is empty and has no factory"),
            PoolError::Overflow { capacity } => {
                write!(f, "pool capacity {} exceeded", capacity)
            }
            PoolError::Rejected { message } => write!(f, "instance rejected: {}", message),
        }
    }
}

impl std::error::Error for PoolError {}

/// Why a resolution landed on the synthetic error handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No exact or prefix registration matches the request path
    NotFound,
    /// A FIFO pool without a factory had no available instance
    PoolExhausted,
    /// Every handler instance for the registration failed to build
    InitializationFailed,
}

impl ErrorKind {
    /// HTTP-equivalent status code for the transport layer
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::PoolExhausted => 503,
            ErrorKind::InitializationFailed => 500,
        }
    }
}

/// Synthetic handler returned whenever a path cannot be served normally
///
/// Error handlers are singletons: the not-found handler for a given request
/// path is cached like any other singleton resolution, and a degraded
/// registration holds exactly one for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorHandler {
    kind: ErrorKind,
    path: String,
    message: String,
}

impl ErrorHandler {
    #[must_use]
    pub fn new(kind: ErrorKind, path: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            path,
            format!("no handler registered for '{}'", path),
        )
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Render the error the way a JSON transport would send it
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": self.message,
            "kind": self.kind,
            "path": self.path,
            "status": self.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_renders_404_body() {
        let handler = ErrorHandler::not_found("/missing");
        assert_eq!(handler.status(), 404);
        let body = handler.to_json();
        assert_eq!(body["status"], 404);
        assert_eq!(body["kind"], "not_found");
        assert_eq!(body["path"], "/missing");
    }

    #[test]
    fn already_registered_message_names_path() {
        let err = DispatchError::AlreadyRegistered {
            path: "/a".to_string(),
        };
        assert!(err.to_string().contains("'/a'"));
    }
}
