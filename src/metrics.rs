//! Dispatch counters shared by every strategy.
//!
//! All counters are relaxed atomics; they are for monitoring, not for
//! synchronization.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one dispatch manager
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    exact_hits: AtomicU64,
    cache_hits: AtomicU64,
    prefix_scans: AtomicU64,
    prefix_hits: AtomicU64,
    not_found: AtomicU64,
    stale_reads: AtomicU64,
    escalations: AtomicU64,
    registrations: AtomicU64,
    overrides: AtomicU64,
    unregistrations: AtomicU64,
    restores: AtomicU64,
    degraded_registrations: AtomicU64,
    overflows: AtomicU64,
}

/// Serializable copy of [`DispatchMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub exact_hits: u64,
    pub cache_hits: u64,
    pub prefix_scans: u64,
    pub prefix_hits: u64,
    pub not_found: u64,
    pub stale_reads: u64,
    pub escalations: u64,
    pub registrations: u64,
    pub overrides: u64,
    pub unregistrations: u64,
    pub restores: u64,
    pub degraded_registrations: u64,
    pub overflows: u64,
}

impl MetricsSnapshot {
    /// Total lookups that produced a result
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.exact_hits + self.cache_hits + self.prefix_hits + self.not_found
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_exact_hit(&self) {
        bump(&self.exact_hits);
    }

    pub fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    pub fn record_prefix_scan(&self) {
        bump(&self.prefix_scans);
    }

    pub fn record_prefix_hit(&self) {
        bump(&self.prefix_hits);
    }

    pub fn record_not_found(&self) {
        bump(&self.not_found);
    }

    /// An optimistic read failed validation and was retried
    pub fn record_stale_read(&self) {
        bump(&self.stale_reads);
    }

    /// An optimistic reader gave up and took the writer lock
    pub fn record_escalation(&self) {
        bump(&self.escalations);
    }

    pub fn record_registration(&self, degraded: bool) {
        bump(&self.registrations);
        if degraded {
            bump(&self.degraded_registrations);
        }
    }

    pub fn record_override(&self) {
        bump(&self.overrides);
    }

    pub fn record_unregistration(&self) {
        bump(&self.unregistrations);
    }

    pub fn record_restore(&self) {
        bump(&self.restores);
    }

    pub fn record_overflow(&self) {
        bump(&self.overflows);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            exact_hits: load(&self.exact_hits),
            cache_hits: load(&self.cache_hits),
            prefix_scans: load(&self.prefix_scans),
            prefix_hits: load(&self.prefix_hits),
            not_found: load(&self.not_found),
            stale_reads: load(&self.stale_reads),
            escalations: load(&self.escalations),
            registrations: load(&self.registrations),
            overrides: load(&self.overrides),
            unregistrations: load(&self.unregistrations),
            restores: load(&self.restores),
            degraded_registrations: load(&self.degraded_registrations),
            overflows: load(&self.overflows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_metrics() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());

        metrics.record_exact_hit();
        metrics.record_cache_hit();
        metrics.record_prefix_hit();
        metrics.record_not_found();
        assert_eq!(metrics.snapshot().lookups(), 4);

        metrics.record_registration(true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.registrations, 1);
        assert_eq!(snapshot.degraded_registrations, 1);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["registrations"], 1);
    }
}
