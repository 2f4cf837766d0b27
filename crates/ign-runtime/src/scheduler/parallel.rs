// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parallel engine: every signal starts at once, bounded by the optional
//! parallelism gate, racing the aggregate against the global deadline.

use super::{EngineOutcome, halt_run, policy_continues};
use crate::executor::{RunContext, execute_one};
use ign_core::{Signal, SignalResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) async fn run(signals: &[Arc<dyn Signal>], ctx: &RunContext) -> EngineOutcome {
    let mut slots: Vec<Option<SignalResult>> = (0..signals.len()).map(|_| None).collect();
    let mut join = spawn_all(signals, ctx);
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;

    while !join.is_empty() {
        tokio::select! {
            () = &mut deadline, if !deadline_exceeded => {
                deadline_exceeded = true;
                ctx.deadline_reached();
                // Hard: the run token is now cancelled and the remaining
                // executions drain with classified results. Soft: keep
                // waiting for everything to finish.
            }
            joined = join.join_next() => {
                if let Some(task) = joined {
                    let (index, result) = task.expect("signal task panicked");
                    slots[index] = Some(result);
                }
            }
        }
    }

    let results: Vec<SignalResult> = slots.into_iter().flatten().collect();

    // The aggregate has settled; evaluate the policy over the completed set
    // in registration order.
    let mut halted = false;
    for result in &results {
        if !policy_continues(ctx, result, &results, deadline_exceeded) {
            halt_run(ctx, result);
            halted = true;
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

/// Start one task per signal, acquiring the parallelism permit inside the
/// task so queued signals do not count as started.
fn spawn_all(signals: &[Arc<dyn Signal>], ctx: &RunContext) -> JoinSet<(usize, SignalResult)> {
    let gate = ctx
        .options
        .max_parallelism
        .map(|limit| Arc::new(Semaphore::new(limit)));
    let mut join = JoinSet::new();
    for (index, signal) in signals.iter().enumerate() {
        let signal = Arc::clone(signal);
        let ctx = ctx.clone();
        let gate = gate.clone();
        join.spawn(async move {
            let _permit = match &gate {
                Some(gate) => Some(
                    Arc::clone(gate)
                        .acquire_owned()
                        .await
                        .expect("parallelism gate closed"),
                ),
                None => None,
            };
            (index, execute_one(signal, &ctx).await)
        });
    }
    join
}
