// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shared per-signal execution primitive.
//!
//! Every scheduler funnels each signal through [`execute_one`], which links
//! cancellation tokens, races the wait against its effective timeout, and
//! classifies the outcome into a [`SignalResult`].

use crate::events::{EventBus, IgnitionEvent};
use crate::hooks::HookRegistry;
use ign_cancel::{CancellationReason, CancellationSource, CancellationToken};
use ign_core::{
    DefaultTimeoutStrategy, IgnitionOptions, SignalError, SignalResult, SignalStatus,
    TimeoutStrategy,
};
use ign_core::Signal;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Shared state threaded through one run.
#[derive(Clone)]
pub(crate) struct RunContext {
    /// Monotonic run-start clock; all result offsets derive from it.
    pub clock: Instant,
    /// Absolute global deadline.
    pub deadline_at: tokio::time::Instant,
    pub options: Arc<IgnitionOptions>,
    /// Run-scoped cancellation source. Hard global timeout, policy stops,
    /// and caller cancellation all fire it.
    pub run: CancellationSource,
    pub bus: Arc<EventBus>,
    pub hooks: Arc<HookRegistry>,
    /// Guards the once-per-run global-timeout event.
    pub deadline_announced: Arc<AtomicBool>,
    pub total_signals: usize,
}

impl RunContext {
    /// Milliseconds elapsed since run start.
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    /// Announce the global deadline: publish the event (once per run) and,
    /// when the deadline is hard, cancel the run-scoped source.
    pub fn deadline_reached(&self) {
        use std::sync::atomic::Ordering;
        if !self.deadline_announced.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                target: "ignition.run",
                elapsed_ms = self.elapsed_ms(),
                hard = self.options.cancel_on_global_timeout,
                "global timeout reached"
            );
            self.bus.publish(IgnitionEvent::GlobalTimeoutReached {
                at_ms: self.elapsed_ms(),
            });
        }
        if self.options.cancel_on_global_timeout {
            self.run.cancel(CancellationReason::GlobalTimeout, None);
        }
    }
}

enum WaitOutcome {
    Finished(Result<(), SignalError>),
    TimerExpired,
    CancelObserved,
}

/// Execute one signal to a classified [`SignalResult`].
///
/// The primitive is side-effect-free apart from the signal's own work, the
/// scope cancellation it may trigger, and the hook/event notifications.
pub(crate) async fn execute_one(signal: Arc<dyn Signal>, ctx: &RunContext) -> SignalResult {
    let name = signal.name().to_string();
    let started_at = ctx.clock.elapsed();

    ctx.hooks.fire_before_signal(&name);
    ctx.bus.publish(IgnitionEvent::SignalStarted {
        name: name.clone(),
        at_ms: started_at.as_millis() as u64,
    });
    if ctx.options.enable_tracing {
        tracing::debug!(target: "ignition.run", signal = %name, "signal started");
    }

    let scope = signal.scope();
    let effective = match &scope {
        Some(s) => CancellationToken::linked(vec![ctx.run.token(), s.token()]),
        None => ctx.run.token().child(),
    };

    let decision = match &ctx.options.timeout_strategy {
        Some(strategy) => strategy.effective_timeout(signal.as_ref(), &ctx.options),
        None => DefaultTimeoutStrategy.effective_timeout(signal.as_ref(), &ctx.options),
    };

    let wait = signal.wait(effective.clone());
    tokio::pin!(wait);

    // Completion is preferred over the timer, and the timer over external
    // cancellation, so a per-signal timeout is attributed locally even when
    // the global deadline races it.
    let outcome = if let Some(limit) = decision.timeout {
        tokio::select! {
            biased;
            res = &mut wait => WaitOutcome::Finished(res),
            () = tokio::time::sleep(limit) => WaitOutcome::TimerExpired,
            () = effective.cancelled() => WaitOutcome::CancelObserved,
        }
    } else {
        tokio::select! {
            biased;
            res = &mut wait => WaitOutcome::Finished(res),
            () = effective.cancelled() => WaitOutcome::CancelObserved,
        }
    };

    let mut failure = None;
    let mut cancelled_by = None;
    let (status, reason) = match outcome {
        WaitOutcome::Finished(Ok(())) => (SignalStatus::Succeeded, CancellationReason::None),
        WaitOutcome::Finished(Err(err)) => {
            cancel_scope_if_requested(signal.as_ref(), &scope, &name);
            failure = Some(Arc::from(err));
            (SignalStatus::Failed, CancellationReason::None)
        }
        WaitOutcome::TimerExpired => {
            if decision.cancel_on_timeout {
                effective.cancel();
            }
            cancel_scope_if_requested(signal.as_ref(), &scope, &name);
            (SignalStatus::TimedOut, CancellationReason::PerSignalTimeout)
        }
        WaitOutcome::CancelObserved => {
            // Attribute to the highest-priority active source.
            if let Some(s) = &scope
                && s.is_cancelled()
            {
                cancelled_by = s.triggered_by();
                (SignalStatus::Cancelled, s.reason())
            } else if ctx.run.is_cancelled() {
                match ctx.run.reason() {
                    CancellationReason::None => {
                        // The caller cancelled the underlying token directly.
                        (SignalStatus::TimedOut, CancellationReason::ExternalCancellation)
                    }
                    reason => {
                        cancelled_by = ctx.run.triggered_by();
                        (SignalStatus::TimedOut, reason)
                    }
                }
            } else {
                (SignalStatus::TimedOut, CancellationReason::ExternalCancellation)
            }
        }
    };

    let completed_at = ctx.clock.elapsed();
    let result = SignalResult {
        name,
        status,
        duration: completed_at.saturating_sub(started_at),
        failure,
        failed_dependencies: Vec::new(),
        reason,
        cancelled_by,
        started_at,
        completed_at,
    };

    if let Some(metrics) = &ctx.options.metrics {
        metrics.record_signal_duration(&result.name, result.duration);
        metrics.record_signal_status(&result.name, result.status);
    }
    if ctx.options.enable_tracing {
        tracing::debug!(
            target: "ignition.run",
            signal = %result.name,
            status = %result.status,
            duration_ms = result.duration.as_millis() as u64,
            "signal completed"
        );
    }
    ctx.hooks.fire_after_signal(&result);
    publish_completion(ctx, &result);
    result
}

/// Record a signal that never started (skipped or dependency-cancelled):
/// notify metrics and observers exactly as a completion, without the
/// start-side hook or event.
pub(crate) fn record_unstarted(ctx: &RunContext, result: &SignalResult) {
    if let Some(metrics) = &ctx.options.metrics {
        metrics.record_signal_status(&result.name, result.status);
    }
    publish_completion(ctx, result);
}

fn publish_completion(ctx: &RunContext, result: &SignalResult) {
    ctx.bus.publish(IgnitionEvent::SignalCompleted {
        name: result.name.clone(),
        status: result.status,
        duration_ms: result.duration.as_millis() as u64,
        at_ms: result.completed_at.as_millis() as u64,
    });
}

fn cancel_scope_if_requested(
    signal: &dyn Signal,
    scope: &Option<Arc<ign_cancel::CancellationScope>>,
    name: &str,
) {
    if signal.cancel_scope_on_failure()
        && let Some(scope) = scope
    {
        scope.cancel(CancellationReason::BundleCancelled, Some(name));
    }
}

/// Human-readable timeout description used in aggregate failures.
pub(crate) fn timeout_fault_message(duration: Duration) -> String {
    format!("timed out after {}ms", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ign_cancel::CancellationScope;
    use ign_core::FnSignal;

    fn context(options: IgnitionOptions) -> RunContext {
        let options = Arc::new(options);
        RunContext {
            clock: Instant::now(),
            deadline_at: tokio::time::Instant::now() + options.global_timeout,
            options,
            run: CancellationSource::new(),
            bus: Arc::new(EventBus::new()),
            hooks: Arc::new(HookRegistry::new()),
            deadline_announced: Arc::new(AtomicBool::new(false)),
            total_signals: 1,
        }
    }

    #[tokio::test]
    async fn success_classifies_succeeded() {
        let ctx = context(IgnitionOptions::default());
        let result = execute_one(Arc::new(FnSignal::ready("ok")), &ctx).await;
        assert_eq!(result.status, SignalStatus::Succeeded);
        assert_eq!(result.reason, CancellationReason::None);
        assert!(result.started_at <= result.completed_at);
    }

    #[tokio::test]
    async fn failure_captures_the_error() {
        let ctx = context(IgnitionOptions::default());
        let signal = FnSignal::new("bad", |_| async { Err("no database".into()) });
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::Failed);
        assert_eq!(result.failure_message().as_deref(), Some("no database"));
    }

    #[tokio::test]
    async fn per_signal_timeout_is_attributed_locally() {
        let ctx = context(IgnitionOptions::default().with_cancel_individual_on_timeout(true));
        let signal = FnSignal::new("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .with_timeout(Duration::from_millis(20));
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::TimedOut);
        assert_eq!(result.reason, CancellationReason::PerSignalTimeout);
        assert!(result.duration >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn timeout_strategy_overrides_signal_timeout() {
        let mut options = IgnitionOptions::default();
        options.timeout_strategy = Some(Arc::new(ign_core::FixedTimeoutStrategy {
            timeout: None,
            cancel_on_timeout: false,
        }));
        let ctx = context(options);
        // Declared timeout of 10ms would fire without the strategy override.
        let signal = FnSignal::new("slowish", |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .with_timeout(Duration::from_millis(10));
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::Succeeded);
    }

    #[tokio::test]
    async fn run_cancellation_with_global_reason_classifies_global_timeout() {
        let ctx = context(IgnitionOptions::default());
        ctx.run.cancel(CancellationReason::GlobalTimeout, None);
        let signal = FnSignal::new("stuck", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::TimedOut);
        assert_eq!(result.reason, CancellationReason::GlobalTimeout);
    }

    #[tokio::test]
    async fn bare_token_cancellation_classifies_external() {
        let ctx = context(IgnitionOptions::default());
        ctx.run.token().cancel();
        let signal = FnSignal::new("stuck", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::TimedOut);
        assert_eq!(result.reason, CancellationReason::ExternalCancellation);
    }

    #[tokio::test]
    async fn scope_cancellation_wins_over_run_cancellation() {
        let ctx = context(IgnitionOptions::default());
        let scope = CancellationScope::root("bundle");
        scope.cancel(CancellationReason::BundleCancelled, Some("sibling"));
        ctx.run.cancel(CancellationReason::GlobalTimeout, None);
        let signal = FnSignal::new("member", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .with_scope(scope, false);
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::Cancelled);
        assert_eq!(result.reason, CancellationReason::BundleCancelled);
        assert_eq!(result.cancelled_by.as_deref(), Some("sibling"));
    }

    #[tokio::test]
    async fn failure_cancels_scope_when_requested() {
        let ctx = context(IgnitionOptions::default());
        let scope = CancellationScope::root("bundle");
        let signal = FnSignal::new("bad", |_| async { Err("boom".into()) })
            .with_scope(Arc::clone(&scope), true);
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::Failed);
        assert!(scope.is_cancelled());
        assert_eq!(scope.reason(), CancellationReason::BundleCancelled);
        assert_eq!(scope.triggered_by().as_deref(), Some("bad"));
    }

    #[tokio::test]
    async fn timeout_cancels_scope_when_requested() {
        let ctx = context(IgnitionOptions::default().with_cancel_individual_on_timeout(true));
        let scope = CancellationScope::root("bundle");
        let signal = FnSignal::new("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .with_timeout(Duration::from_millis(10))
        .with_scope(Arc::clone(&scope), true);
        let result = execute_one(Arc::new(signal), &ctx).await;
        assert_eq!(result.status, SignalStatus::TimedOut);
        assert_eq!(result.reason, CancellationReason::PerSignalTimeout);
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn timeout_cancels_linked_token_only_when_requested() {
        for (cancel_on_timeout, expect_cancelled) in [(true, true), (false, false)] {
            let ctx = context(
                IgnitionOptions::default().with_cancel_individual_on_timeout(cancel_on_timeout),
            );
            let seen: Arc<std::sync::Mutex<Option<CancellationToken>>> =
                Arc::new(std::sync::Mutex::new(None));
            let seen_by_signal = Arc::clone(&seen);
            let signal = FnSignal::new("slow", move |token: CancellationToken| {
                *seen_by_signal.lock().unwrap() = Some(token);
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            })
            .with_timeout(Duration::from_millis(10));
            let result = execute_one(Arc::new(signal), &ctx).await;
            assert_eq!(result.status, SignalStatus::TimedOut);
            let token = seen.lock().unwrap().take().expect("wait never invoked");
            assert_eq!(token.is_cancelled(), expect_cancelled);
            assert!(!ctx.run.is_cancelled(), "run source must stay untouched");
        }
    }
}
