// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run options and their validation.

use crate::error::ConfigError;
use crate::metrics::IgnitionMetrics;
use crate::policy::{FailFast, IgnitionPolicy};
use crate::timeout::TimeoutStrategy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How the coordinator schedules its signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// All signals start together, bounded by `max_parallelism`.
    Parallel,
    /// Signals run one at a time in registration order.
    Sequential,
    /// Signals run as soon as their graph dependencies complete.
    DependencyAware,
    /// Signals are partitioned by stage number and run stage by stage.
    Staged,
}

/// Scheduling inside one stage of staged execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageExecutionMode {
    /// The stage's signals start together.
    #[default]
    Parallel,
    /// The stage's signals run one at a time.
    Sequential,
    /// The stage's signals follow the dependency graph restricted to the
    /// stage.
    DependencyAware,
}

/// Gate applied at each stage boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StagePolicy {
    /// Proceed only when the stage has zero failures and zero timeouts.
    #[default]
    AllMustSucceed,
    /// Stop the whole run as soon as any signal fails.
    FailFast,
    /// Always proceed to the next stage.
    BestEffort,
    /// Start the next stage once a fraction of the stage has succeeded;
    /// the rest of the stage keeps running in the background.
    EarlyPromotion,
}

/// Configuration for a single coordinator run.
///
/// Build with [`Default`] and the `with_*` setters:
///
/// ```
/// use ign_core::{ExecutionMode, IgnitionOptions};
/// use std::time::Duration;
///
/// let options = IgnitionOptions::default()
///     .with_global_timeout(Duration::from_secs(10))
///     .with_execution_mode(ExecutionMode::Parallel)
///     .with_max_parallelism(8);
/// ```
#[derive(Clone)]
pub struct IgnitionOptions {
    /// Run-wide deadline. Soft by default; see `cancel_on_global_timeout`.
    pub global_timeout: Duration,
    /// Scheduling strategy.
    pub execution_mode: ExecutionMode,
    /// Upper bound on concurrently executing signals. `None` = unbounded.
    pub max_parallelism: Option<usize>,
    /// When `true`, the global deadline cancels everything still in flight.
    pub cancel_on_global_timeout: bool,
    /// When `true`, a signal's own timeout cancels its wait.
    pub cancel_individual_on_timeout: bool,
    /// When `true`, dependents of a failed signal are cancelled instead of
    /// skipped.
    pub cancel_dependents_on_failure: bool,
    /// Gate applied between stages in staged mode.
    pub stage_policy: StagePolicy,
    /// Fraction of a stage that must succeed for early promotion, in [0, 1].
    pub early_promotion_threshold: f64,
    /// Per-stage scheduling override; stages default to parallel.
    pub stage_modes: HashMap<u32, StageExecutionMode>,
    /// Emit per-signal debug spans and events.
    pub enable_tracing: bool,
    /// Log the slowest signals after the run.
    pub log_top_slow_signals: bool,
    /// How many slow signals to log.
    pub slow_signal_log_count: usize,
    /// Continuation policy consulted after each signal completion.
    pub policy: Arc<dyn IgnitionPolicy>,
    /// Overrides per-signal timeouts when configured.
    pub timeout_strategy: Option<Arc<dyn TimeoutStrategy>>,
    /// Optional metrics sink.
    pub metrics: Option<Arc<dyn IgnitionMetrics>>,
}

impl Default for IgnitionOptions {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(5),
            execution_mode: ExecutionMode::Parallel,
            max_parallelism: None,
            cancel_on_global_timeout: false,
            cancel_individual_on_timeout: false,
            cancel_dependents_on_failure: false,
            stage_policy: StagePolicy::default(),
            early_promotion_threshold: 1.0,
            stage_modes: HashMap::new(),
            enable_tracing: false,
            log_top_slow_signals: false,
            slow_signal_log_count: 5,
            policy: Arc::new(FailFast),
            timeout_strategy: None,
            metrics: None,
        }
    }
}

impl IgnitionOptions {
    /// Set the run-wide deadline.
    #[must_use]
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    /// Set the scheduling strategy.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Bound concurrent signal executions.
    #[must_use]
    pub fn with_max_parallelism(mut self, limit: usize) -> Self {
        self.max_parallelism = Some(limit);
        self
    }

    /// Make the global deadline hard: cancel in-flight signals on expiry.
    #[must_use]
    pub fn with_cancel_on_global_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_global_timeout = cancel;
        self
    }

    /// Cancel a signal's wait when its own timeout expires.
    #[must_use]
    pub fn with_cancel_individual_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_individual_on_timeout = cancel;
        self
    }

    /// Cancel dependents of a failed signal instead of skipping them.
    #[must_use]
    pub fn with_cancel_dependents_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_dependents_on_failure = cancel;
        self
    }

    /// Set the stage boundary gate.
    #[must_use]
    pub fn with_stage_policy(mut self, policy: StagePolicy) -> Self {
        self.stage_policy = policy;
        self
    }

    /// Set the early-promotion threshold.
    #[must_use]
    pub fn with_early_promotion_threshold(mut self, threshold: f64) -> Self {
        self.early_promotion_threshold = threshold;
        self
    }

    /// Override the scheduling mode of one stage.
    #[must_use]
    pub fn with_stage_mode(mut self, stage: u32, mode: StageExecutionMode) -> Self {
        self.stage_modes.insert(stage, mode);
        self
    }

    /// Enable per-signal tracing spans.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Log the `count` slowest signals after the run.
    #[must_use]
    pub fn with_slow_signal_log(mut self, count: usize) -> Self {
        self.log_top_slow_signals = true;
        self.slow_signal_log_count = count;
        self
    }

    /// Set the continuation policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn IgnitionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Set a timeout strategy; it overrides per-signal timeouts.
    #[must_use]
    pub fn with_timeout_strategy(mut self, strategy: Arc<dyn TimeoutStrategy>) -> Self {
        self.timeout_strategy = Some(strategy);
        self
    }

    /// Attach a metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn IgnitionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The scheduling mode configured for `stage` (parallel when unset).
    #[must_use]
    pub fn stage_mode(&self, stage: u32) -> StageExecutionMode {
        self.stage_modes.get(&stage).copied().unwrap_or_default()
    }

    /// Validate the options, returning every problem found.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.global_timeout.is_zero() {
            errors.push(ConfigError::InvalidGlobalTimeout);
        }
        if !(0.0..=1.0).contains(&self.early_promotion_threshold)
            || self.early_promotion_threshold.is_nan()
        {
            errors.push(ConfigError::InvalidThreshold {
                value: self.early_promotion_threshold,
            });
        }
        if self.max_parallelism == Some(0) {
            errors.push(ConfigError::InvalidParallelism);
        }
        errors
    }
}

impl std::fmt::Debug for IgnitionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionOptions")
            .field("global_timeout", &self.global_timeout)
            .field("execution_mode", &self.execution_mode)
            .field("max_parallelism", &self.max_parallelism)
            .field("cancel_on_global_timeout", &self.cancel_on_global_timeout)
            .field("cancel_individual_on_timeout", &self.cancel_individual_on_timeout)
            .field("cancel_dependents_on_failure", &self.cancel_dependents_on_failure)
            .field("stage_policy", &self.stage_policy)
            .field("early_promotion_threshold", &self.early_promotion_threshold)
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let options = IgnitionOptions::default();
        assert_eq!(options.global_timeout, Duration::from_secs(5));
        assert_eq!(options.execution_mode, ExecutionMode::Parallel);
        assert!(options.max_parallelism.is_none());
        assert!(!options.cancel_on_global_timeout);
        assert!(!options.cancel_individual_on_timeout);
        assert!(!options.cancel_dependents_on_failure);
        assert_eq!(options.stage_policy, StagePolicy::AllMustSucceed);
        assert_eq!(options.policy.name(), "fail_fast");
        assert!(options.validate().is_empty());
    }

    #[test]
    fn zero_global_timeout_is_rejected() {
        let options = IgnitionOptions::default().with_global_timeout(Duration::ZERO);
        assert!(
            options
                .validate()
                .iter()
                .any(|e| matches!(e, ConfigError::InvalidGlobalTimeout))
        );
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        for bad in [-0.1, 1.5, f64::NAN] {
            let options = IgnitionOptions::default().with_early_promotion_threshold(bad);
            assert!(
                options
                    .validate()
                    .iter()
                    .any(|e| matches!(e, ConfigError::InvalidThreshold { .. })),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let options = IgnitionOptions::default().with_max_parallelism(0);
        assert!(
            options
                .validate()
                .iter()
                .any(|e| matches!(e, ConfigError::InvalidParallelism))
        );
    }

    #[test]
    fn stage_mode_defaults_to_parallel() {
        let options =
            IgnitionOptions::default().with_stage_mode(2, StageExecutionMode::Sequential);
        assert_eq!(options.stage_mode(2), StageExecutionMode::Sequential);
        assert_eq!(options.stage_mode(0), StageExecutionMode::Parallel);
    }

    #[test]
    fn mode_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionMode::DependencyAware).unwrap(),
            "\"dependency_aware\""
        );
        assert_eq!(
            serde_json::to_string(&StagePolicy::EarlyPromotion).unwrap(),
            "\"early_promotion\""
        );
    }
}
