// SPDX-License-Identifier: MIT OR Apache-2.0
//! The four execution engines, sharing the per-signal primitive in
//! [`executor`](crate::executor).
//!
//! Engines differ only in *when* each signal is handed to the primitive;
//! classification, timeout layering, and event discipline are identical
//! across them.

pub(crate) mod dag;
pub(crate) mod parallel;
pub(crate) mod sequential;
pub(crate) mod staged;

use crate::executor::RunContext;
use ign_cancel::CancellationReason;
use ign_core::{PolicyContext, SignalResult, StageResult};

/// What an engine hands back to the coordinator.
pub(crate) struct EngineOutcome {
    /// Ordered results: registration order for parallel/sequential, graph
    /// order for dependency-aware, stage-then-interior for staged.
    pub results: Vec<SignalResult>,
    /// Per-stage records, staged mode only.
    pub stages: Option<Vec<StageResult>>,
    /// The global deadline elapsed (softly or hard).
    pub deadline_exceeded: bool,
    /// The continuation policy (or a fail-fast stage gate) stopped the run.
    pub halted: bool,
}

/// Consult the continuation policy for the signal that just completed.
pub(crate) fn policy_continues(
    ctx: &RunContext,
    just_completed: &SignalResult,
    results: &[SignalResult],
    deadline_exceeded: bool,
) -> bool {
    let policy_ctx = PolicyContext {
        just_completed,
        results,
        total_signals: ctx.total_signals,
        elapsed: ctx.clock.elapsed(),
        global_deadline_elapsed: deadline_exceeded,
        mode: ctx.options.execution_mode,
    };
    ctx.options.policy.should_continue(&policy_ctx)
}

/// Stop the run on a policy decision: cancel the run-scoped source so
/// everything still in flight drains with a classified result.
pub(crate) fn halt_run(ctx: &RunContext, stopped_on: &SignalResult) {
    tracing::info!(
        target: "ignition.run",
        policy = ctx.options.policy.name(),
        signal = %stopped_on.name,
        status = %stopped_on.status,
        "policy stopped the run"
    );
    ctx.run
        .cancel(CancellationReason::ExternalCancellation, Some(&stopped_on.name));
}
