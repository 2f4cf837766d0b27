// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency-aware engine: a signal starts as soon as its last dependency
//! reaches a terminal status; failures propagate to dependents as skips or
//! cancellations.

use super::{EngineOutcome, halt_run, policy_continues};
use crate::executor::{RunContext, execute_one, record_unstarted};
use ign_core::{Signal, SignalResult};
use ign_graph::SignalGraph;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) async fn run(
    signals: &[Arc<dyn Signal>],
    graph: &SignalGraph,
    ctx: &RunContext,
) -> EngineOutcome {
    debug_assert_eq!(signals.len(), graph.len());
    let n = signals.len();

    let mut pending: Vec<usize> = (0..n).map(|i| graph.dep_indices(i).len()).collect();
    // Seed with zero-dependency signals; topological order starts with the
    // roots in registration order.
    let mut ready: VecDeque<usize> = graph
        .topo_indices()
        .iter()
        .copied()
        .filter(|&i| pending[i] == 0)
        .collect();
    let mut failed: HashSet<usize> = HashSet::new();
    let mut slots: Vec<Option<SignalResult>> = (0..n).map(|_| None).collect();
    let mut completion_order: Vec<SignalResult> = Vec::with_capacity(n);
    let mut active: JoinSet<(usize, SignalResult)> = JoinSet::new();
    let gate = ctx
        .options
        .max_parallelism
        .map(|limit| Arc::new(Semaphore::new(limit)));
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;
    let mut halted = false;

    loop {
        // Launch (or settle) everything currently ready. A policy stop
        // freezes the queue: nothing new starts.
        while !halted && let Some(index) = ready.pop_front() {
            let failed_deps: Vec<String> = graph
                .dep_indices(index)
                .iter()
                .copied()
                .filter(|d| failed.contains(d))
                .map(|d| graph.name_of(d).expect("index in range").to_string())
                .collect();
            let name = graph.name_of(index).expect("index in range");

            if failed_deps.is_empty() {
                let signal = Arc::clone(&signals[index]);
                let task_ctx = ctx.clone();
                let gate = gate.clone();
                active.spawn(async move {
                    let _permit = match &gate {
                        Some(gate) => Some(
                            Arc::clone(gate)
                                .acquire_owned()
                                .await
                                .expect("parallelism gate closed"),
                        ),
                        None => None,
                    };
                    (index, execute_one(signal, &task_ctx).await)
                });
            } else {
                let at = ctx.clock.elapsed();
                let result = if ctx.options.cancel_dependents_on_failure {
                    SignalResult::dependency_cancelled(name, failed_deps, at)
                } else {
                    SignalResult::skipped(name, failed_deps, at)
                };
                record_unstarted(ctx, &result);
                // Propagates: dependents of a skip are skips themselves.
                failed.insert(index);
                for &dependent in graph.dependent_indices(index) {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        ready.push_back(dependent);
                    }
                }
                completion_order.push(result.clone());
                slots[index] = Some(result);
            }
        }

        if active.is_empty() && (halted || ready.is_empty()) {
            break;
        }

        tokio::select! {
            () = &mut deadline, if !deadline_exceeded => {
                deadline_exceeded = true;
                ctx.deadline_reached();
            }
            joined = active.join_next() => {
                let Some(task) = joined else { continue };
                let (index, result) = task.expect("signal task panicked");
                if result.status.is_failure() {
                    failed.insert(index);
                }
                for &dependent in graph.dependent_indices(index) {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        ready.push_back(dependent);
                    }
                }
                completion_order.push(result.clone());
                slots[index] = Some(result);
                let just_completed = completion_order.last().expect("just pushed");
                if !halted && !policy_continues(ctx, just_completed, &completion_order, deadline_exceeded) {
                    halt_run(ctx, just_completed);
                    halted = true;
                }
            }
        }
    }

    // Emit in graph order; signals frozen out by a halt are absent.
    let results: Vec<SignalResult> = graph
        .topo_indices()
        .iter()
        .filter_map(|&i| slots[i].take())
        .collect();

    EngineOutcome {
        results,
        stages: None,
        deadline_exceeded,
        halted,
    }
}
