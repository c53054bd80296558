//! Process-wide dispatch counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Totals across all backends. Used for reporting, never for selection.
#[derive(Debug, Default)]
pub struct ProcessCounters {
    total_active_connections: AtomicUsize,
    total_requests: AtomicU64,
}

/// Point-in-time copy of [`ProcessCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub total_active_connections: usize,
    pub total_requests: u64,
}

impl ProcessCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_active(&self) {
        self.total_active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec_active(&self) {
        let _ = self
            .total_active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn total_active_connections(&self) -> usize {
        self.total_active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            total_active_connections: self.total_active_connections(),
            total_requests: self.total_requests(),
        }
    }
}
