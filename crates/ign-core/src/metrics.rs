// SPDX-License-Identifier: MIT OR Apache-2.0
//! Metrics contract and the default atomic collector.

use crate::result::SignalStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Duration;

/// Sink for run and signal measurements.
///
/// Implementations must be thread-safe; the coordinator makes no ordering
/// guarantees between metric calls and event emission.
pub trait IgnitionMetrics: Send + Sync {
    /// Record how long a signal's wait was in flight.
    fn record_signal_duration(&self, name: &str, duration: Duration);

    /// Record a signal's terminal status.
    fn record_signal_status(&self, name: &str, status: SignalStatus);

    /// Record the run's total duration.
    fn record_total_duration(&self, duration: Duration);
}

/// Atomic run-level metrics that can be shared across threads.
#[derive(Debug, Default)]
pub struct RunMetrics {
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,
    cancelled: AtomicU64,
    signal_count: AtomicU64,
    cumulative_signal_ms: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl RunMetrics {
    /// Create a new, zero-initialised collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a point-in-time snapshot of the current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let signal_count = self.signal_count.load(Relaxed);
        let cumulative = self.cumulative_signal_ms.load(Relaxed);
        MetricsSnapshot {
            succeeded: self.succeeded.load(Relaxed),
            failed: self.failed.load(Relaxed),
            timed_out: self.timed_out.load(Relaxed),
            skipped: self.skipped.load(Relaxed),
            cancelled: self.cancelled.load(Relaxed),
            average_signal_duration_ms: if signal_count == 0 {
                0
            } else {
                cumulative / signal_count
            },
            total_duration_ms: self.total_duration_ms.load(Relaxed),
        }
    }
}

impl IgnitionMetrics for RunMetrics {
    fn record_signal_duration(&self, _name: &str, duration: Duration) {
        self.signal_count.fetch_add(1, Relaxed);
        self.cumulative_signal_ms
            .fetch_add(duration.as_millis() as u64, Relaxed);
    }

    fn record_signal_status(&self, _name: &str, status: SignalStatus) {
        let counter = match status {
            SignalStatus::Succeeded => &self.succeeded,
            SignalStatus::Failed => &self.failed,
            SignalStatus::TimedOut => &self.timed_out,
            SignalStatus::Skipped => &self.skipped,
            SignalStatus::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Relaxed);
    }

    fn record_total_duration(&self, duration: Duration) {
        self.total_duration_ms
            .store(duration.as_millis() as u64, Relaxed);
    }
}

/// Non-atomic, serialisable snapshot of [`RunMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Signals that succeeded.
    pub succeeded: u64,
    /// Signals that failed.
    pub failed: u64,
    /// Signals that timed out.
    pub timed_out: u64,
    /// Signals that were skipped.
    pub skipped: u64,
    /// Signals that were cancelled.
    pub cancelled: u64,
    /// Running average of signal duration in milliseconds.
    pub average_signal_duration_ms: u64,
    /// The most recently recorded total run duration in milliseconds.
    pub total_duration_ms: u64,
}
