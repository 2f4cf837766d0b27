// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lifecycle hooks invoked at coordinator and signal boundaries.
//!
//! Register [`LifecycleHook`] implementations with a [`HookRegistry`] to
//! observe a run without modifying the core loop. Hook errors are swallowed
//! and logged; they can never influence the run.

use ign_core::{IgnitionMetrics, IgnitionResult, SignalResult};
use std::sync::Arc;
use tracing::warn;

/// Result type for fallible hook callbacks.
pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Extension point called at well-defined moments of a run.
///
/// All methods have default no-op implementations so hooks only need to
/// override the callbacks they care about. `before_ignition` and
/// `after_ignition` fire exactly once per run, even with no signals
/// registered; `before_signal` and `after_signal` fire once per signal that
/// actually starts.
pub trait LifecycleHook: Send + Sync {
    /// Called before any signal starts.
    ///
    /// # Errors
    ///
    /// Errors are logged at `warn` and otherwise ignored.
    fn before_ignition(&self, _signal_count: usize) -> HookResult {
        Ok(())
    }

    /// Called after the run result is finalized.
    ///
    /// # Errors
    ///
    /// Errors are logged at `warn` and otherwise ignored.
    fn after_ignition(&self, _result: &IgnitionResult) -> HookResult {
        Ok(())
    }

    /// Called just before a signal's wait begins.
    ///
    /// # Errors
    ///
    /// Errors are logged at `warn` and otherwise ignored.
    fn before_signal(&self, _name: &str) -> HookResult {
        Ok(())
    }

    /// Called when a signal reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Errors are logged at `warn` and otherwise ignored.
    fn after_signal(&self, _result: &SignalResult) -> HookResult {
        Ok(())
    }

    /// Human-readable name for this hook (used in logging).
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered collection of [`LifecycleHook`]s fired in registration order.
///
/// The registry never holds a lock while a hook runs.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Hooks fire in the order they are registered.
    pub fn register(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` when no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fire [`LifecycleHook::before_ignition`] on every hook.
    pub fn fire_before_ignition(&self, signal_count: usize) {
        for hook in &self.hooks {
            if let Err(err) = hook.before_ignition(signal_count) {
                warn!(target: "ignition.hooks", hook = hook.name(), %err, "before_ignition hook failed");
            }
        }
    }

    /// Fire [`LifecycleHook::after_ignition`] on every hook.
    pub fn fire_after_ignition(&self, result: &IgnitionResult) {
        for hook in &self.hooks {
            if let Err(err) = hook.after_ignition(result) {
                warn!(target: "ignition.hooks", hook = hook.name(), %err, "after_ignition hook failed");
            }
        }
    }

    /// Fire [`LifecycleHook::before_signal`] on every hook.
    pub fn fire_before_signal(&self, name: &str) {
        for hook in &self.hooks {
            if let Err(err) = hook.before_signal(name) {
                warn!(target: "ignition.hooks", hook = hook.name(), signal = name, %err, "before_signal hook failed");
            }
        }
    }

    /// Fire [`LifecycleHook::after_signal`] on every hook.
    pub fn fire_after_signal(&self, result: &SignalResult) {
        for hook in &self.hooks {
            if let Err(err) = hook.after_signal(result) {
                warn!(target: "ignition.hooks", hook = hook.name(), signal = %result.name, %err, "after_signal hook failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in: LoggingHook
// ---------------------------------------------------------------------------

/// Logs lifecycle transitions via the `tracing` crate.
pub struct LoggingHook;

impl LifecycleHook for LoggingHook {
    fn before_ignition(&self, signal_count: usize) -> HookResult {
        tracing::info!(target: "ignition.hooks", signal_count, "ignition starting");
        Ok(())
    }

    fn after_ignition(&self, result: &IgnitionResult) -> HookResult {
        tracing::info!(
            target: "ignition.hooks",
            total_duration_ms = result.total_duration.as_millis() as u64,
            timed_out = result.timed_out,
            "ignition complete"
        );
        Ok(())
    }

    fn before_signal(&self, name: &str) -> HookResult {
        tracing::debug!(target: "ignition.hooks", signal = name, "signal starting");
        Ok(())
    }

    fn after_signal(&self, result: &SignalResult) -> HookResult {
        tracing::debug!(
            target: "ignition.hooks",
            signal = %result.name,
            status = %result.status,
            duration_ms = result.duration.as_millis() as u64,
            "signal complete"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

// ---------------------------------------------------------------------------
// Built-in: MetricsHook
// ---------------------------------------------------------------------------

/// Drives an [`IgnitionMetrics`] sink from lifecycle callbacks.
///
/// Useful when the sink should only see hook-visible completions rather than
/// being attached through the run options.
pub struct MetricsHook {
    metrics: Arc<dyn IgnitionMetrics>,
}

impl MetricsHook {
    /// Create a new metrics hook backed by the given sink.
    #[must_use]
    pub fn new(metrics: Arc<dyn IgnitionMetrics>) -> Self {
        Self { metrics }
    }
}

impl LifecycleHook for MetricsHook {
    fn after_signal(&self, result: &SignalResult) -> HookResult {
        self.metrics
            .record_signal_duration(&result.name, result.duration);
        self.metrics.record_signal_status(&result.name, result.status);
        Ok(())
    }

    fn after_ignition(&self, result: &IgnitionResult) -> HookResult {
        self.metrics.record_total_duration(result.total_duration);
        Ok(())
    }

    fn name(&self) -> &str {
        "metrics"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ign_core::{RunMetrics, SignalStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHook {
        calls: AtomicUsize,
    }

    impl LifecycleHook for CountingHook {
        fn before_ignition(&self, _n: usize) -> HookResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FailingHook;

    impl LifecycleHook for FailingHook {
        fn before_ignition(&self, _n: usize) -> HookResult {
            Err("hook exploded".into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn sample_result() -> SignalResult {
        SignalResult {
            name: "db".into(),
            status: SignalStatus::Succeeded,
            duration: Duration::from_millis(25),
            failure: None,
            failed_dependencies: Vec::new(),
            reason: ign_cancel::CancellationReason::None,
            cancelled_by: None,
            started_at: Duration::ZERO,
            completed_at: Duration::from_millis(25),
        }
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        let a = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.register(a.clone());
        registry.register(a.clone());
        registry.fire_before_ignition(3);
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_hook_does_not_stop_later_hooks() {
        let counter = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(FailingHook));
        registry.register(counter.clone());
        registry.fire_before_ignition(1);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metrics_hook_records_signal_outcomes() {
        let metrics = Arc::new(RunMetrics::new());
        let hook = MetricsHook::new(metrics.clone());
        hook.after_signal(&sample_result()).unwrap();
        let snap = metrics.snapshot();
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.average_signal_duration_ms, 25);
    }

    #[test]
    fn empty_registry_is_fine() {
        let registry = HookRegistry::new();
        assert!(registry.is_empty());
        registry.fire_before_ignition(0);
        registry.fire_after_signal(&sample_result());
    }
}
