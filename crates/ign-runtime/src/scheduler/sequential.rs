// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequential engine: one signal at a time in registration order, racing
//! each wait against the global deadline.

use super::{EngineOutcome, halt_run, policy_continues};
use crate::executor::{RunContext, execute_one};
use ign_core::{Signal, SignalResult};
use std::sync::Arc;

pub(crate) async fn run(signals: &[Arc<dyn Signal>], ctx: &RunContext) -> EngineOutcome {
    let mut results: Vec<SignalResult> = Vec::with_capacity(signals.len());
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;
    let mut halted = false;

    for signal in signals {
        let exec = execute_one(Arc::clone(signal), ctx);
        tokio::pin!(exec);
        let result = loop {
            tokio::select! {
                biased;
                result = &mut exec => break result,
                () = &mut deadline, if !deadline_exceeded => {
                    deadline_exceeded = true;
                    ctx.deadline_reached();
                    // Hard: the cancelled run token resolves the current
                    // wait on the next poll. Soft: await it out.
                }
            }
        };
        results.push(result);
        let just_completed = results.last().expect("just pushed");
        if !policy_continues(ctx, just_completed, &results, deadline_exceeded) {
            halt_run(ctx, just_completed);
            halted = true;
            break;
        }
        // A hard deadline stops the walk with partial results; soft keeps
        // going so stragglers still run to completion.
        if deadline_exceeded && ctx.options.cancel_on_global_timeout {
            break;
        }
    }

    EngineOutcome {
        results,
        stages: None,
        deadline_exceeded,
        halted,
    }
}
