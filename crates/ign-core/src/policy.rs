// SPDX-License-Identifier: MIT OR Apache-2.0
//! Continuation policies evaluated after each signal completion.

use crate::options::ExecutionMode;
use crate::result::{SignalResult, SignalStatus};
use std::time::Duration;

/// Everything a policy may consult when deciding whether the run continues.
#[derive(Debug)]
pub struct PolicyContext<'a> {
    /// The signal that just reached a terminal status.
    pub just_completed: &'a SignalResult,
    /// All results accumulated so far, including `just_completed`.
    pub results: &'a [SignalResult],
    /// Total number of signals in the run.
    pub total_signals: usize,
    /// Elapsed time since run start.
    pub elapsed: Duration,
    /// `true` once the global deadline has passed.
    pub global_deadline_elapsed: bool,
    /// The run's scheduling strategy.
    pub mode: ExecutionMode,
}

/// Decides, after each signal completion, whether execution continues.
///
/// Implementations must be pure decision functions: no side effects, no
/// interior mutability visible to callers, safe to consult from any worker.
pub trait IgnitionPolicy: Send + Sync {
    /// Return `false` to stop the run.
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool;

    /// Stable name used in logs and recordings.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Stop on the first failed or timed-out signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl IgnitionPolicy for FailFast {
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool {
        !matches!(
            ctx.just_completed.status,
            SignalStatus::Failed | SignalStatus::TimedOut
        )
    }

    fn name(&self) -> &str {
        "fail_fast"
    }
}

/// Never stop; every signal runs to a terminal status.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffort;

impl IgnitionPolicy for BestEffort {
    fn should_continue(&self, _ctx: &PolicyContext<'_>) -> bool {
        true
    }

    fn name(&self) -> &str {
        "best_effort"
    }
}

/// Tolerate individual failures and timeouts, but stop cleanly once the
/// global deadline has elapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnTimeout;

impl IgnitionPolicy for ContinueOnTimeout {
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool {
        !ctx.global_deadline_elapsed
    }

    fn name(&self) -> &str {
        "continue_on_timeout"
    }
}
