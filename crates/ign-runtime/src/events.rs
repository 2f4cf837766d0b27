// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based event bus for decoupled lifecycle-event distribution.
//!
//! Synchronous observers belong in the hook registry; the bus is for
//! subscribers that want an async stream of [`IgnitionEvent`]s without
//! coupling to the run.

use crate::CoordinatorState;
use ign_core::SignalStatus;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 256;

/// A lifecycle transition observed during a run.
///
/// All offsets are milliseconds from run start.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IgnitionEvent {
    /// A signal's wait began.
    SignalStarted {
        /// The signal's name.
        name: String,
        /// Offset from run start.
        at_ms: u64,
    },
    /// A signal reached a terminal status.
    SignalCompleted {
        /// The signal's name.
        name: String,
        /// The terminal classification.
        status: SignalStatus,
        /// How long the wait was in flight.
        duration_ms: u64,
        /// Offset from run start.
        at_ms: u64,
    },
    /// The global deadline elapsed. Published at most once per run.
    GlobalTimeoutReached {
        /// Offset from run start.
        at_ms: u64,
    },
    /// The run reached a terminal state. Published exactly once per run.
    CoordinatorCompleted {
        /// The coordinator's final state.
        state: CoordinatorState,
        /// Total run duration.
        total_duration_ms: u64,
    },
}

/// Shared statistics counters for an [`EventBus`].
#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// Broadcast-based event bus distributing [`IgnitionEvent`]s to multiple
/// subscribers with built-in statistics tracking.
pub struct EventBus {
    tx: broadcast::Sender<IgnitionEvent>,
    stats: Arc<StatsInner>,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Create a new [`EventSubscription`] that receives future events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If no subscribers are listening the event is silently dropped and
    /// counted in [`EventBusStats::dropped_events`].
    pub fn publish(&self, event: IgnitionEvent) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Return a snapshot of the current bus statistics.
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.tx.receiver_count(),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for receiving events from an [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<IgnitionEvent>,
    stats: Arc<StatsInner>,
}

impl EventSubscription {
    /// Receive the next event, waiting asynchronously.
    ///
    /// Returns `None` when the bus is closed. Lagged events are skipped and
    /// counted in [`EventBusStats::dropped_events`].
    pub async fn recv(&mut self) -> Option<IgnitionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is currently available.
    pub fn try_recv(&mut self) -> Option<IgnitionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Point-in-time statistics for an [`EventBus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBusStats {
    /// Total events published since the bus was created.
    pub total_published: u64,
    /// Number of live subscriptions.
    pub active_subscribers: usize,
    /// Events dropped because nobody listened or a subscriber lagged.
    pub dropped_events: u64,
}
