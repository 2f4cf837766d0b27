// SPDX-License-Identifier: MIT OR Apache-2.0
//! ign-runtime
//!
//! The ignition coordinator: a single-use, idempotent execution engine that
//! drives registered signals through one of four scheduling strategies while
//! layering timeout discipline, continuation policy, and hierarchical
//! cancellation, and emitting lifecycle events along the way.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Broadcast-based lifecycle event bus.
pub mod events;
/// Observer hooks fired at coordinator and signal boundaries.
pub mod hooks;

mod executor;
mod scheduler;

use crate::executor::RunContext;
use ign_cancel::{CancellationSource, CancellationToken};
use ign_core::{
    ConfigError, ExecutionMode, IgnitionError, IgnitionOptions, IgnitionResult, ReadinessReport,
    Signal, SignalFault, SignalStatus,
};
use ign_graph::{GraphBuilder, GraphError, SignalGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

pub use events::{EventBus, EventBusStats, EventSubscription, IgnitionEvent};
pub use hooks::{HookRegistry, HookResult, LifecycleHook, LoggingHook, MetricsHook};

/// Observable lifecycle of a [`Coordinator`].
///
/// The sequence is monotonic: `NotStarted`, `Running`, then exactly one of
/// the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// `run` has not been invoked.
    NotStarted,
    /// The run is in flight.
    Running,
    /// Every signal succeeded or was deliberately skipped.
    Completed,
    /// At least one signal failed.
    Failed,
    /// The run is classified as timed out.
    TimedOut,
}

impl CoordinatorState {
    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
            Self::TimedOut => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::TimedOut,
            _ => Self::NotStarted,
        }
    }

    /// `true` once the run has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

#[derive(Clone)]
struct RunOutcome {
    result: IgnitionResult,
    error: Option<IgnitionError>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Coordinator`] from signals, dependency edges, options, and
/// hooks, validating the whole configuration before any run can start.
#[derive(Default)]
pub struct CoordinatorBuilder {
    signals: Vec<Arc<dyn Signal>>,
    edges: Vec<(String, String)>,
    options: IgnitionOptions,
    hooks: HookRegistry,
}

impl CoordinatorBuilder {
    /// Create an empty builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal. Registration order is the baseline execution and
    /// result order.
    #[must_use]
    pub fn signal(mut self, signal: impl Signal + 'static) -> Self {
        self.signals.push(Arc::new(signal));
        self
    }

    /// Register an already-shared signal.
    #[must_use]
    pub fn shared_signal(mut self, signal: Arc<dyn Signal>) -> Self {
        self.signals.push(signal);
        self
    }

    /// Declare that `signal` must not start before `dependency` completes.
    ///
    /// Names are resolved against the registered signals at build time.
    #[must_use]
    pub fn depends_on(mut self, signal: impl Into<String>, dependency: impl Into<String>) -> Self {
        self.edges.push((signal.into(), dependency.into()));
        self
    }

    /// Replace the run options.
    #[must_use]
    pub fn options(mut self, options: IgnitionOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a lifecycle hook. Hooks fire in registration order.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    /// Validate the configuration and produce the coordinator.
    ///
    /// # Errors
    ///
    /// Any configuration problem (invalid options, empty signal names,
    /// zero timeouts, a missing graph in dependency-aware mode, unresolved
    /// or cyclic dependencies) fails the build; no run is started.
    pub fn build(self) -> Result<Coordinator, ConfigError> {
        if let Some(error) = self.options.validate().into_iter().next() {
            return Err(error);
        }
        for signal in &self.signals {
            if signal.name().trim().is_empty() {
                return Err(ConfigError::EmptySignalName);
            }
            if signal.timeout() == Some(Duration::ZERO) {
                return Err(ConfigError::InvalidSignalTimeout {
                    name: signal.name().to_string(),
                });
            }
        }

        let graph = if self.edges.is_empty() {
            if self.options.execution_mode == ExecutionMode::DependencyAware {
                return Err(ConfigError::MissingGraph);
            }
            None
        } else {
            let mut builder = GraphBuilder::new();
            for signal in &self.signals {
                builder
                    .add_signal(signal.name())
                    .map_err(graph_to_config)?;
            }
            for (signal, dependency) in &self.edges {
                builder.depends_on(signal.clone(), dependency.clone());
            }
            Some(builder.build().map_err(graph_to_config)?)
        };

        let (outcome_tx, outcome_rx) = watch::channel(None);
        Ok(Coordinator {
            inner: Arc::new(Inner {
                signals: self.signals,
                graph,
                options: Arc::new(self.options),
                hooks: Arc::new(self.hooks),
                bus: Arc::new(EventBus::new()),
                state: AtomicU8::new(CoordinatorState::NotStarted.as_u8()),
                started: AtomicBool::new(false),
                run_id: Uuid::new_v4(),
                outcome_tx,
                outcome_rx,
            }),
        })
    }
}

fn graph_to_config(error: GraphError) -> ConfigError {
    match error {
        GraphError::Cycle { path } => ConfigError::DependencyCycle { path },
        GraphError::UnknownSignal { from, to } => ConfigError::UnknownDependency { from, to },
        GraphError::DuplicateSignal { name } => ConfigError::DuplicateGraphSignal { name },
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Inner {
    signals: Vec<Arc<dyn Signal>>,
    graph: Option<SignalGraph>,
    options: Arc<IgnitionOptions>,
    hooks: Arc<HookRegistry>,
    bus: Arc<EventBus>,
    state: AtomicU8,
    started: AtomicBool,
    run_id: Uuid,
    outcome_tx: watch::Sender<Option<RunOutcome>>,
    outcome_rx: watch::Receiver<Option<RunOutcome>>,
}

impl Inner {
    fn set_state(&self, state: CoordinatorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Single-entry orchestrator for a set of readiness signals.
///
/// `run` is lazy, one-shot, and memoized: the first invocation executes the
/// signals, every later (or concurrent) invocation awaits the same outcome.
///
/// ```no_run
/// # use ign_runtime::Coordinator;
/// # use ign_core::FnSignal;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = Coordinator::builder()
///     .signal(FnSignal::ready("config"))
///     .signal(FnSignal::ready("database"))
///     .build()?;
/// coordinator.run().await?;
/// let result = coordinator.result().await;
/// assert!(result.all_succeeded());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("run_id", &self.inner.run_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Coordinator {
    /// Start assembling a coordinator.
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Unique identifier of this coordinator's run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Lock-free monotonic snapshot of the lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// The configured options.
    #[must_use]
    pub fn options(&self) -> &IgnitionOptions {
        &self.inner.options
    }

    /// The dependency graph, when one was declared.
    #[must_use]
    pub fn graph(&self) -> Option<&SignalGraph> {
        self.inner.graph.as_ref()
    }

    /// Registered signal names, in registration order.
    #[must_use]
    pub fn signal_names(&self) -> Vec<String> {
        self.inner
            .signals
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Declared per-signal timeouts, for recording configuration snapshots.
    #[must_use]
    pub fn declared_timeouts(&self) -> HashMap<String, Duration> {
        self.inner
            .signals
            .iter()
            .filter_map(|s| s.timeout().map(|t| (s.name().to_string(), t)))
            .collect()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.bus.subscribe()
    }

    /// Statistics of the internal event bus.
    #[must_use]
    pub fn event_stats(&self) -> EventBusStats {
        self.inner.bus.stats()
    }

    /// Run all signals to completion (idempotent).
    ///
    /// # Errors
    ///
    /// [`IgnitionError::Halted`] when the continuation policy (or a
    /// fail-fast stage gate) stopped the run; the aggregate carries every
    /// captured failure. The memoized error is returned again on repeat
    /// calls.
    pub async fn run(&self) -> Result<(), IgnitionError> {
        self.run_with_token(CancellationToken::new()).await
    }

    /// Run with a caller-provided cancellation token.
    ///
    /// Only the token of the invocation that actually starts the run is
    /// observed; concurrent and later calls await the same completion.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_token(&self, token: CancellationToken) -> Result<(), IgnitionError> {
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let outcome = execute(&inner, token).await;
                let _ = inner.outcome_tx.send(Some(outcome));
            });
        }
        let outcome = self.wait_for_outcome().await;
        match outcome.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Wait for the run result. Blocks until `run` has produced one.
    pub async fn result(&self) -> IgnitionResult {
        self.wait_for_outcome().await.result
    }

    /// The run result, if the run has finished.
    #[must_use]
    pub fn try_result(&self) -> Option<IgnitionResult> {
        self.inner.outcome_rx.borrow().as_ref().map(|o| o.result.clone())
    }

    /// Readiness view over the cached result, if the run has finished.
    #[must_use]
    pub fn readiness(&self) -> Option<ReadinessReport> {
        self.try_result().map(|r| ReadinessReport::from_result(&r))
    }

    async fn wait_for_outcome(&self) -> RunOutcome {
        let mut rx = self.inner.outcome_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            rx.changed().await.expect("run outcome channel closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Run choreography
// ---------------------------------------------------------------------------

async fn execute(inner: &Arc<Inner>, caller: CancellationToken) -> RunOutcome {
    inner.set_state(CoordinatorState::Running);
    let clock = Instant::now();
    tracing::info!(
        target: "ignition.run",
        run_id = %inner.run_id,
        signals = inner.signals.len(),
        mode = ?inner.options.execution_mode,
        "ignition run starting"
    );
    inner.hooks.fire_before_ignition(inner.signals.len());

    let ctx = RunContext {
        clock,
        deadline_at: tokio::time::Instant::now() + inner.options.global_timeout,
        options: Arc::clone(&inner.options),
        run: CancellationSource::from_token(caller.child()),
        bus: Arc::clone(&inner.bus),
        hooks: Arc::clone(&inner.hooks),
        deadline_announced: Arc::new(AtomicBool::new(false)),
        total_signals: inner.signals.len(),
    };

    let engine_outcome = match inner.options.execution_mode {
        ExecutionMode::Parallel => scheduler::parallel::run(&inner.signals, &ctx).await,
        ExecutionMode::Sequential => scheduler::sequential::run(&inner.signals, &ctx).await,
        ExecutionMode::DependencyAware => {
            let graph = inner.graph.as_ref().expect("graph verified at build time");
            scheduler::dag::run(&inner.signals, graph, &ctx).await
        }
        ExecutionMode::Staged => {
            scheduler::staged::run(&inner.signals, inner.graph.as_ref(), &ctx).await
        }
    };

    let total_duration = clock.elapsed();
    let timed_out = engine_outcome
        .results
        .iter()
        .any(|r| r.status == SignalStatus::TimedOut);
    let result = IgnitionResult {
        total_duration,
        signals: engine_outcome.results,
        timed_out,
        deadline_exceeded: engine_outcome.deadline_exceeded,
        stages: engine_outcome.stages,
    };

    if let Some(metrics) = &inner.options.metrics {
        metrics.record_total_duration(total_duration);
    }
    log_slow_signals(&inner.options, &result);

    let final_state = classify_state(&result);
    inner.set_state(final_state);
    // Observers see the terminal result before any failure surfaces.
    inner.bus.publish(IgnitionEvent::CoordinatorCompleted {
        state: final_state,
        total_duration_ms: total_duration.as_millis() as u64,
    });
    inner.hooks.fire_after_ignition(&result);
    tracing::info!(
        target: "ignition.run",
        run_id = %inner.run_id,
        state = ?final_state,
        total_duration_ms = total_duration.as_millis() as u64,
        timed_out = result.timed_out,
        "ignition run complete"
    );

    let error = engine_outcome.halted.then(|| IgnitionError::Halted {
        failures: collect_faults(&result),
    });
    RunOutcome { result, error }
}

fn classify_state(result: &IgnitionResult) -> CoordinatorState {
    if result.all_ready() {
        CoordinatorState::Completed
    } else if result.count(SignalStatus::Failed) > 0 {
        CoordinatorState::Failed
    } else if result.timed_out {
        CoordinatorState::TimedOut
    } else {
        CoordinatorState::Failed
    }
}

fn collect_faults(result: &IgnitionResult) -> Vec<SignalFault> {
    result
        .signals
        .iter()
        .filter_map(|r| match r.status {
            SignalStatus::Failed => Some(SignalFault {
                signal: r.name.clone(),
                message: r
                    .failure_message()
                    .unwrap_or_else(|| String::from("signal failed")),
            }),
            SignalStatus::TimedOut => Some(SignalFault {
                signal: r.name.clone(),
                message: executor::timeout_fault_message(r.duration),
            }),
            _ => None,
        })
        .collect()
}

fn log_slow_signals(options: &IgnitionOptions, result: &IgnitionResult) {
    if !options.log_top_slow_signals {
        return;
    }
    let mut durations: Vec<(&str, Duration)> = result
        .signals
        .iter()
        .filter(|r| r.status != SignalStatus::Skipped)
        .map(|r| (r.name.as_str(), r.duration))
        .collect();
    durations.sort_by(|a, b| b.1.cmp(&a.1));
    durations.truncate(options.slow_signal_log_count);
    let rendered: Vec<String> = durations
        .iter()
        .map(|(name, duration)| format!("{name}={}ms", duration.as_millis()))
        .collect();
    tracing::info!(target: "ignition.run", slowest = ?rendered, "slowest signals");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ign_core::FnSignal;

    fn quick(name: &str, millis: u64) -> FnSignal {
        FnSignal::new(name, move |_| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn state_machine_walks_to_completed() {
        let coordinator = Coordinator::builder()
            .signal(FnSignal::ready("a"))
            .build()
            .unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::NotStarted);
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Completed);
    }

    #[tokio::test]
    async fn run_is_memoized() {
        let coordinator = Coordinator::builder()
            .signal(quick("a", 10))
            .build()
            .unwrap();
        coordinator.run().await.unwrap();
        let first = coordinator.result().await;
        coordinator.run().await.unwrap();
        let second = coordinator.result().await;
        assert_eq!(first.total_duration, second.total_duration);
        assert_eq!(first.signals.len(), second.signals.len());
        assert_eq!(first.get("a").unwrap().completed_at, second.get("a").unwrap().completed_at);
    }

    #[tokio::test]
    async fn concurrent_runs_share_one_execution() {
        let coordinator = Coordinator::builder()
            .signal(quick("a", 30))
            .build()
            .unwrap();
        let (left, right) = tokio::join!(coordinator.run(), coordinator.run());
        left.unwrap();
        right.unwrap();
        // A second execution would have doubled the published start events.
        assert_eq!(coordinator.event_stats().total_published, 3);
    }

    #[tokio::test]
    async fn empty_signal_set_completes() {
        let coordinator = Coordinator::builder().build().unwrap();
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Completed);
        let result = coordinator.result().await;
        assert!(result.signals.is_empty());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn failed_signal_fails_the_run_state() {
        let coordinator = Coordinator::builder()
            .signal(FnSignal::new("bad", |_| async { Err("broken".into()) }))
            .options(IgnitionOptions::default().with_policy(Arc::new(ign_core::BestEffort)))
            .build()
            .unwrap();
        coordinator.run().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Failed);
        let readiness = coordinator.readiness().unwrap();
        assert!(!readiness.is_serving());
    }

    #[tokio::test]
    async fn fail_fast_policy_surfaces_aggregate() {
        let coordinator = Coordinator::builder()
            .signal(FnSignal::new("bad", |_| async { Err("broken".into()) }))
            .build()
            .unwrap();
        let err = coordinator.run().await.unwrap_err();
        let IgnitionError::Halted { failures } = err else {
            panic!("expected halt");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].signal, "bad");
        assert_eq!(failures[0].message, "broken");
        // The completed event was published before the error surfaced.
        assert_eq!(coordinator.state(), CoordinatorState::Failed);
    }

    #[tokio::test]
    async fn dependency_mode_without_graph_is_rejected() {
        let err = Coordinator::builder()
            .signal(FnSignal::ready("a"))
            .options(
                IgnitionOptions::default().with_execution_mode(ExecutionMode::DependencyAware),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingGraph));
    }

    #[tokio::test]
    async fn cycle_is_rejected_at_build() {
        let err = Coordinator::builder()
            .signal(FnSignal::ready("s1"))
            .signal(FnSignal::ready("s2"))
            .depends_on("s1", "s2")
            .depends_on("s2", "s1")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("s1 -> s2 -> s1"));
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected_at_build() {
        let err = Coordinator::builder()
            .signal(FnSignal::ready("a"))
            .depends_on("a", "ghost")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[tokio::test]
    async fn empty_signal_name_is_rejected_at_build() {
        let err = Coordinator::builder()
            .signal(FnSignal::ready("  "))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptySignalName));
    }

    #[tokio::test]
    async fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CoordinatorState::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
