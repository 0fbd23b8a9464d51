//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the promotion controller.
///
/// Uses Relaxed ordering; counters are independent of each other.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    builds_registered: AtomicU64,
    duplicate_registrations: AtomicU64,
    gate_reports: AtomicU64,
    advisory_gate_reports: AtomicU64,
    late_gate_reports: AtomicU64,
    decisions_deploy: AtomicU64,
    decisions_hold: AtomicU64,
    decisions_reject: AtomicU64,
    timeouts: AtomicU64,
    dispatch_failures: AtomicU64,
    records_purged: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Registration

    pub fn increment_builds_registered(&self) {
        self.builds_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicate_registrations(&self) {
        self.duplicate_registrations.fetch_add(1, Ordering::Relaxed);
    }

    // Gates

    pub fn increment_gate_reports(&self) {
        self.gate_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_advisory_gate_reports(&self) {
        self.advisory_gate_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_late_gate_reports(&self) {
        self.late_gate_reports.fetch_add(1, Ordering::Relaxed);
    }

    // Decisions

    pub fn increment_decisions_deploy(&self) {
        self.decisions_deploy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decisions_hold(&self) {
        self.decisions_hold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decisions_reject(&self) {
        self.decisions_reject.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    // Dispatch & housekeeping

    pub fn increment_dispatch_failures(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_purged(&self, count: u64) {
        self.records_purged.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            builds_registered: self.builds_registered.load(Ordering::Relaxed),
            duplicate_registrations: self.duplicate_registrations.load(Ordering::Relaxed),
            gate_reports: self.gate_reports.load(Ordering::Relaxed),
            advisory_gate_reports: self.advisory_gate_reports.load(Ordering::Relaxed),
            late_gate_reports: self.late_gate_reports.load(Ordering::Relaxed),
            decisions_deploy: self.decisions_deploy.load(Ordering::Relaxed),
            decisions_hold: self.decisions_hold.load(Ordering::Relaxed),
            decisions_reject: self.decisions_reject.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            records_purged: self.records_purged.load(Ordering::Relaxed),
        }
    }

    /// Snapshot as a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub builds_registered: u64,
    pub duplicate_registrations: u64,
    pub gate_reports: u64,
    pub advisory_gate_reports: u64,
    pub late_gate_reports: u64,
    pub decisions_deploy: u64,
    pub decisions_hold: u64,
    pub decisions_reject: u64,
    pub timeouts: u64,
    pub dispatch_failures: u64,
    pub records_purged: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_builds_registered();
        registry.increment_builds_registered();
        registry.increment_gate_reports();
        registry.increment_decisions_deploy();
        registry.increment_decisions_reject();
        registry.increment_timeouts();
        registry.add_records_purged(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.builds_registered, 2);
        assert_eq!(snapshot.gate_reports, 1);
        assert_eq!(snapshot.decisions_deploy, 1);
        assert_eq!(snapshot.decisions_reject, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.records_purged, 3);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_decisions_hold();

        let json = registry.to_json();
        assert_eq!(json["decisions_hold"], 1);
        assert_eq!(json["decisions_deploy"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_gate_reports();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().gate_reports, 1000);
    }
}
