//! # Configuration Module
//!
//! Selects the dispatch strategy and the defaults applied to registrations.
//!
//! ## Environment Variables
//!
//! - `PATHDISPATCH_STRATEGY`: `plain`, `locked` or `optimistic` (default: `locked`)
//! - `PATHDISPATCH_MAX_RETRIES`: optimistic retries before escalating (default: 64)
//! - `PATHDISPATCH_DEFAULT_CAPACITY`: capacity of ad-hoc and manifest FIFO pools
//!   that name none (default: 4)
//! - `PATHDISPATCH_POPULATE`: `eager` or `lazy` (default: `eager`)
//! - `PATHDISPATCH_MAX_CACHED_PATHS`: implier cache bound (default: 10000)
//!
//! Unparseable values fall back to the default.

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::dispatcher::{DispatchManager, LockedDispatcher, OptimisticDispatcher, PlainDispatcher};
use crate::pool::Populate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Concurrency discipline of a dispatch manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// No locking beyond the concurrent maps themselves
    Plain,
    /// Read/write lock; prefix scans run under the write lock
    #[default]
    Locked,
    /// Seqlock: readers validate and retry, writers serialize
    Optimistic,
}

impl Strategy {
    /// Parse strategy from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Some(Self::Plain),
            "locked" => Some(Self::Locked),
            "optimistic" => Some(Self::Optimistic),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Locked => "locked",
            Self::Optimistic => "optimistic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every dispatch manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub strategy: Strategy,
    /// Failed optimistic validations before a reader takes the writer lock
    pub max_optimistic_retries: u32,
    /// Capacity for FIFO pools created without an explicit one
    pub default_capacity: usize,
    /// Populate mode for manifest entries that don't name one
    pub populate: Populate,
    /// Request paths the implier cache holds before it is cleared
    pub max_cached_paths: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_optimistic_retries: 64,
            default_capacity: 4,
            populate: Populate::default(),
            max_cached_paths: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let strategy = std::env::var("PATHDISPATCH_STRATEGY")
            .ok()
            .and_then(|s| Strategy::parse(&s))
            .unwrap_or(defaults.strategy);

        let max_optimistic_retries = std::env::var("PATHDISPATCH_MAX_RETRIES")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_optimistic_retries);

        let default_capacity = std::env::var("PATHDISPATCH_DEFAULT_CAPACITY")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&c: &usize| c > 0)
            .unwrap_or(defaults.default_capacity);

        let populate = std::env::var("PATHDISPATCH_POPULATE")
            .ok()
            .and_then(|s| Populate::parse(s.trim()))
            .unwrap_or(defaults.populate);

        let max_cached_paths = std::env::var("PATHDISPATCH_MAX_CACHED_PATHS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.max_cached_paths);

        Self {
            strategy,
            max_optimistic_retries,
            default_capacity,
            populate,
            max_cached_paths,
        }
    }

    /// Create a custom configuration
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_optimistic_retries = retries;
        self
    }

    #[must_use]
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_populate(mut self, populate: Populate) -> Self {
        self.populate = populate;
        self
    }

    #[must_use]
    pub fn with_max_cached_paths(mut self, max: usize) -> Self {
        self.max_cached_paths = max.max(1);
        self
    }
}

/// Build the dispatch manager named by `config.strategy`
#[must_use]
pub fn build_dispatcher<H: Send + Sync + 'static>(
    config: &DispatchConfig,
) -> Box<dyn DispatchManager<H>> {
    info!(
        strategy = %config.strategy,
        max_optimistic_retries = config.max_optimistic_retries,
        default_capacity = config.default_capacity,
        populate = ?config.populate,
        max_cached_paths = config.max_cached_paths,
        "Dispatch manager created"
    );
    match config.strategy {
        Strategy::Plain => Box::new(PlainDispatcher::new(config.clone())),
        Strategy::Locked => Box::new(LockedDispatcher::new(config.clone())),
        Strategy::Optimistic => Box::new(OptimisticDispatcher::new(config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // from_env reads process-wide state
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clean_env() {
        std::env::remove_var("PATHDISPATCH_STRATEGY");
        std::env::remove_var("PATHDISPATCH_MAX_RETRIES");
        std::env::remove_var("PATHDISPATCH_DEFAULT_CAPACITY");
        std::env::remove_var("PATHDISPATCH_POPULATE");
        std::env::remove_var("PATHDISPATCH_MAX_CACHED_PATHS");
    }

    #[test]
    fn test_defaults_without_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();

        let config = DispatchConfig::from_env();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.strategy, Strategy::Locked);
        assert_eq!(config.max_optimistic_retries, 64);
        assert_eq!(config.default_capacity, 4);
        assert_eq!(config.populate, Populate::Eager);
        assert_eq!(config.max_cached_paths, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();
        std::env::set_var("PATHDISPATCH_STRATEGY", "Optimistic");
        std::env::set_var("PATHDISPATCH_MAX_RETRIES", "3");
        std::env::set_var("PATHDISPATCH_DEFAULT_CAPACITY", "16");
        std::env::set_var("PATHDISPATCH_POPULATE", "lazy");
        std::env::set_var("PATHDISPATCH_MAX_CACHED_PATHS", "256");

        let config = DispatchConfig::from_env();
        clean_env();

        assert_eq!(config.strategy, Strategy::Optimistic);
        assert_eq!(config.max_optimistic_retries, 3);
        assert_eq!(config.default_capacity, 16);
        assert_eq!(config.populate, Populate::Lazy);
        assert_eq!(config.max_cached_paths, 256);
    }

    #[test]
    fn test_invalid_env_falls_back() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clean_env();
        std::env::set_var("PATHDISPATCH_STRATEGY", "spinlock");
        std::env::set_var("PATHDISPATCH_MAX_RETRIES", "-1");
        std::env::set_var("PATHDISPATCH_DEFAULT_CAPACITY", "0");

        let config = DispatchConfig::from_env();
        clean_env();

        assert_eq!(config.strategy, Strategy::Locked);
        assert_eq!(config.max_optimistic_retries, 64);
        assert_eq!(config.default_capacity, 4);
    }

    #[test]
    fn test_strategy_parse_and_display() {
        for strategy in [Strategy::Plain, Strategy::Locked, Strategy::Optimistic] {
            assert_eq!(Strategy::parse(&strategy.to_string()), Some(strategy));
        }
        assert_eq!(Strategy::parse(" PLAIN "), Some(Strategy::Plain));
        assert_eq!(Strategy::parse("nope"), None);
    }

    #[test]
    fn test_build_dispatcher_honours_strategy() {
        for strategy in [Strategy::Plain, Strategy::Locked, Strategy::Optimistic] {
            let manager = build_dispatcher::<u32>(&DispatchConfig::new(strategy));
            assert_eq!(manager.strategy(), strategy);
            assert!(manager.registered_paths().is_empty());
        }
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: DispatchConfig = serde_yaml::from_str("strategy: plain\n").unwrap();
        assert_eq!(config.strategy, Strategy::Plain);
        assert_eq!(config.default_capacity, 4);

        let config: DispatchConfig =
            toml::from_str("strategy = \"optimistic\"\nmax_optimistic_retries = 8\n").unwrap();
        assert_eq!(config.strategy, Strategy::Optimistic);
        assert_eq!(config.max_optimistic_retries, 8);
    }
}
