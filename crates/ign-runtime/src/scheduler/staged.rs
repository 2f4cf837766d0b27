// SPDX-License-Identifier: MIT OR Apache-2.0
//! Staged engine: signals are partitioned by stage number and executed in
//! ascending stage order. Each stage runs under its own scheduling mode;
//! the stage policy gates the boundary. Early promotion hands off to the
//! next stage while the rest of the stage finishes in the background.

use super::EngineOutcome;
use crate::executor::{RunContext, execute_one, record_unstarted};
use ign_core::{
    Signal, SignalResult, SignalStatus, StageExecutionMode, StagePolicy, StageResult,
};
use ign_graph::SignalGraph;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What one stage hands back to the stage loop.
struct StageRun {
    /// Terminal results observed while the stage was in the foreground.
    finished: Vec<(usize, SignalResult)>,
    /// Still-running signals of a promoted stage.
    residual: Option<JoinSet<(usize, SignalResult)>>,
    /// The stage satisfied its promotion threshold.
    promoted: bool,
    /// The global deadline elapsed during this stage.
    deadline_exceeded: bool,
    /// Signals never started because the stage stopped early.
    unstarted: Vec<usize>,
    /// Names of failed or timed-out signals, for gating and skip records.
    failures: Vec<String>,
    /// A fail-fast gate stopped the run mid-stage.
    fail_fast_tripped: bool,
}

/// Bookkeeping for one stage, finalized into a [`StageResult`] at the end.
struct StageMeta {
    stage_no: u32,
    indices: Vec<usize>,
    started_at: Duration,
    promoted: bool,
    skipped: bool,
    fully_ran: bool,
}

pub(crate) async fn run(
    signals: &[Arc<dyn Signal>],
    graph: Option<&SignalGraph>,
    ctx: &RunContext,
) -> EngineOutcome {
    let n = signals.len();
    let mut stage_map: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, signal) in signals.iter().enumerate() {
        stage_map.entry(signal.stage()).or_default().push(index);
    }

    let gate = ctx
        .options
        .max_parallelism
        .map(|limit| Arc::new(Semaphore::new(limit)));
    let mut slots: Vec<Option<SignalResult>> = (0..n).map(|_| None).collect();
    let mut metas: Vec<StageMeta> = Vec::with_capacity(stage_map.len());
    let mut residuals: Vec<(usize, JoinSet<(usize, SignalResult)>)> = Vec::new();
    let mut deadline_exceeded = false;
    let mut halted = false;
    let mut skipping = false;
    let mut stop_cause: Vec<String> = Vec::new();

    for (&stage_no, indices) in &stage_map {
        if skipping || halted {
            let at = ctx.clock.elapsed();
            for &index in indices {
                let result =
                    SignalResult::skipped(signals[index].name(), stop_cause.clone(), at);
                record_unstarted(ctx, &result);
                slots[index] = Some(result);
            }
            metas.push(StageMeta {
                stage_no,
                indices: indices.clone(),
                started_at: at,
                promoted: false,
                skipped: true,
                fully_ran: false,
            });
            continue;
        }

        let started_at = ctx.clock.elapsed();
        let mode = ctx.options.stage_mode(stage_no);
        let fail_fast = ctx.options.stage_policy == StagePolicy::FailFast;
        let promotion = (ctx.options.stage_policy == StagePolicy::EarlyPromotion
            && mode == StageExecutionMode::Parallel)
            .then(|| promotion_goal(indices.len(), ctx.options.early_promotion_threshold));

        let stage_run = match mode {
            StageExecutionMode::Parallel => {
                stage_parallel(signals, indices, ctx, &gate, promotion, fail_fast).await
            }
            StageExecutionMode::Sequential => {
                stage_sequential(signals, indices, ctx, fail_fast).await
            }
            StageExecutionMode::DependencyAware => {
                stage_dag(signals, indices, graph, ctx, &gate, fail_fast).await
            }
        };

        deadline_exceeded |= stage_run.deadline_exceeded;

        // Signals frozen out mid-stage settle as skipped.
        let at = ctx.clock.elapsed();
        for &index in &stage_run.unstarted {
            let result =
                SignalResult::skipped(signals[index].name(), stage_run.failures.clone(), at);
            record_unstarted(ctx, &result);
            slots[index] = Some(result);
        }
        for (index, result) in stage_run.finished {
            slots[index] = Some(result);
        }
        let meta_index = metas.len();
        metas.push(StageMeta {
            stage_no,
            indices: indices.clone(),
            started_at,
            promoted: stage_run.promoted,
            skipped: false,
            fully_ran: stage_run.unstarted.is_empty(),
        });
        if let Some(residual) = stage_run.residual {
            residuals.push((meta_index, residual));
        }

        // Boundary gate.
        if stage_run.fail_fast_tripped {
            halted = true;
            stop_cause = stage_run.failures.clone();
            tracing::info!(
                target: "ignition.run",
                stage = stage_no,
                "fail-fast stage gate stopped the run"
            );
        } else if ctx.options.stage_policy == StagePolicy::AllMustSucceed
            && !stage_run.failures.is_empty()
        {
            skipping = true;
            stop_cause = stage_run.failures.clone();
            tracing::info!(
                target: "ignition.run",
                stage = stage_no,
                blocked_by = ?stop_cause,
                "stage gate blocked later stages"
            );
        }

        // A hard global deadline halts the remaining stages outright.
        if deadline_exceeded && ctx.options.cancel_on_global_timeout {
            skipping = true;
            if stop_cause.is_empty() {
                stop_cause = stage_run.failures.clone();
            }
        }
    }

    // Collect promoted-stage leftovers; they have been running in the
    // background the whole time.
    for (_, mut residual) in residuals {
        let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
        while !residual.is_empty() {
            tokio::select! {
                () = &mut deadline, if !deadline_exceeded => {
                    deadline_exceeded = true;
                    ctx.deadline_reached();
                }
                joined = residual.join_next() => {
                    if let Some(task) = joined {
                        let (index, result) = task.expect("signal task panicked");
                        slots[index] = Some(result);
                    }
                }
            }
        }
    }

    // Finalize stage records from the settled slots.
    let mut stages = Vec::with_capacity(metas.len());
    let mut results = Vec::with_capacity(n);
    for meta in metas {
        let stage_results: Vec<SignalResult> = meta
            .indices
            .iter()
            .filter_map(|&i| slots[i].clone())
            .collect();
        let duration = if meta.skipped {
            Duration::ZERO
        } else {
            stage_results
                .iter()
                .map(|r| r.completed_at)
                .max()
                .unwrap_or(meta.started_at)
                .saturating_sub(meta.started_at)
        };
        let mut record = StageResult::tally(meta.stage_no, duration, stage_results);
        record.promoted = meta.promoted;
        record.completed = !meta.skipped && meta.fully_ran;
        results.extend(record.results.iter().cloned());
        stages.push(record);
    }

    EngineOutcome {
        results,
        stages: Some(stages),
        deadline_exceeded,
        halted,
    }
}

/// Successes needed before a stage promotes: `ceil(size × threshold)`.
fn promotion_goal(stage_size: usize, threshold: f64) -> usize {
    (stage_size as f64 * threshold).ceil() as usize
}

// ---------------------------------------------------------------------------
// Per-mode stage bodies
// ---------------------------------------------------------------------------

async fn stage_parallel(
    signals: &[Arc<dyn Signal>],
    indices: &[usize],
    ctx: &RunContext,
    gate: &Option<Arc<Semaphore>>,
    promotion: Option<usize>,
    fail_fast: bool,
) -> StageRun {
    let mut join: JoinSet<(usize, SignalResult)> = JoinSet::new();
    for &index in indices {
        spawn_signal(&mut join, signals, index, ctx, gate);
    }

    let mut finished = Vec::with_capacity(indices.len());
    let mut failures = Vec::new();
    let mut successes = 0usize;
    let mut fail_fast_tripped = false;
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;

    while !join.is_empty() {
        if let Some(goal) = promotion
            && successes >= goal
        {
            return StageRun {
                finished,
                residual: Some(join),
                promoted: true,
                deadline_exceeded,
                unstarted: Vec::new(),
                failures,
                fail_fast_tripped,
            };
        }
        tokio::select! {
            () = &mut deadline, if !deadline_exceeded => {
                deadline_exceeded = true;
                ctx.deadline_reached();
            }
            joined = join.join_next() => {
                let Some(task) = joined else { continue };
                let (index, result) = task.expect("signal task panicked");
                match result.status {
                    SignalStatus::Succeeded => successes += 1,
                    SignalStatus::Failed | SignalStatus::TimedOut => {
                        failures.push(result.name.clone());
                        if fail_fast && result.status == SignalStatus::Failed && !fail_fast_tripped {
                            fail_fast_tripped = true;
                            ctx.run.cancel(
                                ign_cancel::CancellationReason::ExternalCancellation,
                                Some(&result.name),
                            );
                        }
                    }
                    _ => {}
                }
                finished.push((index, result));
            }
        }
    }

    // Promotion can also trip exactly at stage completion.
    let promoted = promotion.is_some_and(|goal| successes >= goal);
    StageRun {
        finished,
        residual: None,
        promoted,
        deadline_exceeded,
        unstarted: Vec::new(),
        failures,
        fail_fast_tripped,
    }
}

async fn stage_sequential(
    signals: &[Arc<dyn Signal>],
    indices: &[usize],
    ctx: &RunContext,
    fail_fast: bool,
) -> StageRun {
    let mut finished = Vec::with_capacity(indices.len());
    let mut failures = Vec::new();
    let mut unstarted = Vec::new();
    let mut fail_fast_tripped = false;
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;
    let mut stopping = false;

    for &index in indices {
        if stopping {
            unstarted.push(index);
            continue;
        }
        let exec = execute_one(Arc::clone(&signals[index]), ctx);
        tokio::pin!(exec);
        let result = loop {
            tokio::select! {
                biased;
                result = &mut exec => break result,
                () = &mut deadline, if !deadline_exceeded => {
                    deadline_exceeded = true;
                    ctx.deadline_reached();
                }
            }
        };
        match result.status {
            SignalStatus::Failed | SignalStatus::TimedOut => {
                failures.push(result.name.clone());
                if fail_fast && result.status == SignalStatus::Failed {
                    fail_fast_tripped = true;
                    stopping = true;
                    ctx.run.cancel(
                        ign_cancel::CancellationReason::ExternalCancellation,
                        Some(&result.name),
                    );
                }
            }
            _ => {}
        }
        finished.push((index, result));
        if deadline_exceeded && ctx.options.cancel_on_global_timeout {
            stopping = true;
        }
    }

    StageRun {
        finished,
        residual: None,
        promoted: false,
        deadline_exceeded,
        unstarted,
        failures,
        fail_fast_tripped,
    }
}

async fn stage_dag(
    signals: &[Arc<dyn Signal>],
    indices: &[usize],
    graph: Option<&SignalGraph>,
    ctx: &RunContext,
    gate: &Option<Arc<Semaphore>>,
    fail_fast: bool,
) -> StageRun {
    // Restrict the run graph to this stage; cross-stage edges are already
    // satisfied by stage ordering.
    let local: HashMap<usize, usize> = indices
        .iter()
        .enumerate()
        .map(|(local_ix, &global_ix)| (global_ix, local_ix))
        .collect();
    let deps_of = |global_ix: usize| -> Vec<usize> {
        match graph {
            Some(graph) => graph
                .dep_indices(global_ix)
                .iter()
                .copied()
                .filter(|d| local.contains_key(d))
                .collect(),
            None => Vec::new(),
        }
    };

    let mut pending: Vec<usize> = indices.iter().map(|&g| deps_of(g).len()).collect();
    let mut ready: VecDeque<usize> = (0..indices.len()).filter(|&l| pending[l] == 0).collect();
    let mut failed_local: Vec<bool> = vec![false; indices.len()];
    let mut finished = Vec::with_capacity(indices.len());
    let mut failures = Vec::new();
    let mut unstarted = Vec::new();
    let mut fail_fast_tripped = false;
    let mut active: JoinSet<(usize, SignalResult)> = JoinSet::new();
    let mut deadline = Box::pin(tokio::time::sleep_until(ctx.deadline_at));
    let mut deadline_exceeded = false;
    let mut stopping = false;

    loop {
        while !stopping && let Some(local_ix) = ready.pop_front() {
            let global_ix = indices[local_ix];
            let failed_deps: Vec<String> = deps_of(global_ix)
                .into_iter()
                .filter(|d| local.get(d).is_some_and(|&l| failed_local[l]))
                .map(|d| signals[d].name().to_string())
                .collect();
            if failed_deps.is_empty() {
                spawn_signal(&mut active, signals, global_ix, ctx, gate);
            } else {
                let at = ctx.clock.elapsed();
                let name = signals[global_ix].name();
                let result = if ctx.options.cancel_dependents_on_failure {
                    SignalResult::dependency_cancelled(name, failed_deps, at)
                } else {
                    SignalResult::skipped(name, failed_deps, at)
                };
                record_unstarted(ctx, &result);
                settle_local(
                    local_ix,
                    result,
                    indices,
                    graph,
                    &local,
                    &mut pending,
                    &mut ready,
                    &mut failed_local,
                    &mut finished,
                );
            }
        }

        if active.is_empty() && (stopping || ready.is_empty()) {
            break;
        }

        tokio::select! {
            () = &mut deadline, if !deadline_exceeded => {
                deadline_exceeded = true;
                ctx.deadline_reached();
            }
            joined = active.join_next() => {
                let Some(task) = joined else { continue };
                let (global_ix, result) = task.expect("signal task panicked");
                let local_ix = local[&global_ix];
                match result.status {
                    SignalStatus::Failed | SignalStatus::TimedOut => {
                        failures.push(result.name.clone());
                        if fail_fast && result.status == SignalStatus::Failed {
                            fail_fast_tripped = true;
                            stopping = true;
                            ctx.run.cancel(
                                ign_cancel::CancellationReason::ExternalCancellation,
                                Some(&result.name),
                            );
                        }
                    }
                    _ => {}
                }
                settle_local(
                    local_ix,
                    result,
                    indices,
                    graph,
                    &local,
                    &mut pending,
                    &mut ready,
                    &mut failed_local,
                    &mut finished,
                );
            }
        }
    }

    // Anything still gated on pending dependencies never started.
    let started: Vec<bool> = {
        let mut started = vec![false; indices.len()];
        for (global_ix, _) in &finished {
            started[local[global_ix]] = true;
        }
        started
    };
    for (local_ix, &global_ix) in indices.iter().enumerate() {
        if !started[local_ix] {
            unstarted.push(global_ix);
        }
    }

    StageRun {
        finished,
        residual: None,
        promoted: false,
        deadline_exceeded,
        unstarted,
        failures,
        fail_fast_tripped,
    }
}

/// Record a local terminal result and release its dependents.
#[allow(clippy::too_many_arguments)]
fn settle_local(
    local_ix: usize,
    result: SignalResult,
    indices: &[usize],
    graph: Option<&SignalGraph>,
    local: &HashMap<usize, usize>,
    pending: &mut [usize],
    ready: &mut VecDeque<usize>,
    failed_local: &mut [bool],
    finished: &mut Vec<(usize, SignalResult)>,
) {
    if result.status.is_failure() {
        failed_local[local_ix] = true;
    }
    if let Some(graph) = graph {
        for &dependent in graph.dependent_indices(indices[local_ix]) {
            if let Some(&dep_local) = local.get(&dependent) {
                pending[dep_local] -= 1;
                if pending[dep_local] == 0 {
                    ready.push_back(dep_local);
                }
            }
        }
    }
    finished.push((indices[local_ix], result));
}

fn spawn_signal(
    join: &mut JoinSet<(usize, SignalResult)>,
    signals: &[Arc<dyn Signal>],
    index: usize,
    ctx: &RunContext,
    gate: &Option<Arc<Semaphore>>,
) {
    let signal = Arc::clone(&signals[index]);
    let task_ctx = ctx.clone();
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
        (index, execute_one(signal, &task_ctx).await)
    });
}
