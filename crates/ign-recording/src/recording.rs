// SPDX-License-Identifier: MIT OR Apache-2.0
//! The recording artifact and its builder.
//!
//! Field names are camel-cased on the wire; durations are double
//! milliseconds; null-valued optional fields are omitted. Readers ignore
//! unknown fields, and only `schemaVersion`, `totalDurationMs`, `timedOut`,
//! and `signals` are required.

use chrono::{DateTime, Utc};
use ign_cancel::CancellationReason;
use ign_core::{
    ExecutionMode, IgnitionOptions, IgnitionResult, SignalResult, SignalStatus, StagePolicy,
};
use ign_graph::SignalGraph;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Current recording schema version.
pub const SCHEMA_VERSION: &str = "1.0";

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

/// Serializable snapshot of one coordinator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// Schema version; `"1.0"` for this layout.
    pub schema_version: String,
    /// Total run duration in milliseconds.
    pub total_duration_ms: f64,
    /// Whether the run was classified as timed out.
    pub timed_out: bool,
    /// Per-signal records, in result order.
    pub signals: Vec<SignalRecord>,
    /// Identifier of the run that produced this recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Wall-clock capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Snapshot of the options the run executed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationRecord>,
    /// Per-stage records, staged runs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageRecord>>,
    /// Aggregate statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl Recording {
    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a recording from JSON, ignoring unknown fields.
    ///
    /// # Errors
    ///
    /// Fails when a required field is missing or mistyped.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Snapshot of the options a run executed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRecord {
    /// Scheduling strategy.
    pub execution_mode: ExecutionMode,
    /// Name of the continuation policy.
    pub policy: String,
    /// The global deadline in milliseconds.
    pub global_timeout_ms: f64,
    /// Whether the global deadline was hard.
    pub cancel_on_global_timeout: bool,
    /// Whether per-signal timeouts cancelled their waits.
    pub cancel_individual_on_timeout: bool,
    /// Whether dependents of failures were cancelled rather than skipped.
    pub cancel_dependents_on_failure: bool,
    /// Parallelism bound; omitted when unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_degree_of_parallelism: Option<usize>,
    /// The stage boundary gate.
    pub stage_policy: StagePolicy,
    /// The early promotion threshold.
    pub early_promotion_threshold: f64,
}

/// One signal's row in a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    /// The signal's name.
    pub name: String,
    /// Terminal classification.
    pub status: SignalStatus,
    /// Offset from run start when execution began.
    pub started_at_ms: f64,
    /// Offset from run start when the result was classified.
    pub completed_at_ms: f64,
    /// Time the wait was in flight.
    pub duration_ms: f64,
    /// Stage number, staged runs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<u32>,
    /// Declared dependency names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Dependencies that failed, for skipped or cancelled signals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_dependencies: Vec<String>,
    /// Why the signal was cancelled or timed out; omitted when not
    /// cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
    /// Signal(s) whose failure triggered the cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    /// Coarse classification of the captured failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    /// Display form of the captured failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// The signal's declared timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_timeout_ms: Option<f64>,
}

/// One stage's row in a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// The stage number.
    pub stage: u32,
    /// Stage duration in milliseconds.
    pub duration_ms: f64,
    /// Count of succeeded signals.
    pub succeeded: usize,
    /// Count of failed signals.
    pub failed: usize,
    /// Count of timed-out signals.
    pub timed_out: usize,
    /// Whether every signal of the stage reached a terminal status.
    pub completed: bool,
    /// Whether the stage satisfied its promotion threshold.
    pub promoted: bool,
    /// The stage's signal names, registration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
}

/// Aggregate statistics over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Signals that succeeded.
    pub succeeded: usize,
    /// Signals that failed.
    pub failed: usize,
    /// Signals that timed out.
    pub timed_out: usize,
    /// Signals that were skipped.
    pub skipped: usize,
    /// Signals that were cancelled.
    pub cancelled: usize,
    /// Peak number of concurrently executing signals.
    pub max_concurrency: usize,
    /// Slowest executed signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest_signal: Option<String>,
    /// Duration of the slowest executed signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest_duration_ms: Option<f64>,
    /// Fastest executed signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest_signal: Option<String>,
    /// Duration of the fastest executed signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest_duration_ms: Option<f64>,
    /// Mean duration over executed signals.
    pub average_duration_ms: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// `true` when the signal actually ran (its offsets describe real work).
pub(crate) fn executed(result: &SignalResult) -> bool {
    match result.status {
        SignalStatus::Skipped => false,
        SignalStatus::Cancelled => {
            // Dependency-cancelled signals never started.
            !(result.reason == CancellationReason::DependencyFailed
                && result.duration.is_zero())
        }
        _ => true,
    }
}

/// Assembles a [`Recording`] from a run result plus optional context.
///
/// ```
/// # use ign_recording::RecordingBuilder;
/// # use ign_core::IgnitionResult;
/// # use std::time::Duration;
/// # let result = IgnitionResult {
/// #     total_duration: Duration::from_millis(10),
/// #     signals: vec![],
/// #     timed_out: false,
/// #     deadline_exceeded: false,
/// #     stages: None,
/// # };
/// let recording = RecordingBuilder::new(&result).build();
/// assert_eq!(recording.schema_version, "1.0");
/// ```
pub struct RecordingBuilder<'a> {
    result: &'a IgnitionResult,
    options: Option<&'a IgnitionOptions>,
    graph: Option<&'a SignalGraph>,
    declared_timeouts: HashMap<String, Duration>,
    run_id: Option<Uuid>,
}

impl<'a> RecordingBuilder<'a> {
    /// Start a builder over a run result.
    #[must_use]
    pub fn new(result: &'a IgnitionResult) -> Self {
        Self {
            result,
            options: None,
            graph: None,
            declared_timeouts: HashMap::new(),
            run_id: None,
        }
    }

    /// Attach the options snapshot.
    #[must_use]
    pub fn with_options(mut self, options: &'a IgnitionOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Attach the dependency graph so records carry dependency names.
    #[must_use]
    pub fn with_graph(mut self, graph: &'a SignalGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Attach the declared per-signal timeouts.
    #[must_use]
    pub fn with_declared_timeouts(mut self, timeouts: HashMap<String, Duration>) -> Self {
        self.declared_timeouts = timeouts;
        self
    }

    /// Attach the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Produce the recording.
    #[must_use]
    pub fn build(self) -> Recording {
        let stage_of: HashMap<&str, u32> = self
            .result
            .stages
            .iter()
            .flatten()
            .flat_map(|stage| {
                stage
                    .results
                    .iter()
                    .map(|r| (r.name.as_str(), stage.stage))
            })
            .collect();

        let signals: Vec<SignalRecord> = self
            .result
            .signals
            .iter()
            .map(|r| self.signal_record(r, stage_of.get(r.name.as_str()).copied()))
            .collect();

        let stages = self.result.stages.as_ref().map(|stages| {
            stages
                .iter()
                .map(|stage| StageRecord {
                    stage: stage.stage,
                    duration_ms: ms(stage.duration),
                    succeeded: stage.succeeded,
                    failed: stage.failed,
                    timed_out: stage.timed_out,
                    completed: stage.completed,
                    promoted: stage.promoted,
                    signals: stage.results.iter().map(|r| r.name.clone()).collect(),
                })
                .collect()
        });

        Recording {
            schema_version: SCHEMA_VERSION.to_string(),
            total_duration_ms: ms(self.result.total_duration),
            timed_out: self.result.timed_out,
            signals,
            run_id: self.run_id,
            created_at: Some(Utc::now()),
            configuration: self.options.map(configuration_record),
            stages,
            summary: Some(summarize(self.result)),
        }
    }

    fn signal_record(&self, result: &SignalResult, stage: Option<u32>) -> SignalRecord {
        let dependencies = self
            .graph
            .and_then(|g| g.dependencies(&result.name))
            .map(|deps| deps.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        let failure_message = result.failure_message();
        let failure_kind = result.failure.as_ref().map(|err| {
            if err.downcast_ref::<std::io::Error>().is_some() {
                String::from("io")
            } else {
                String::from("error")
            }
        });
        SignalRecord {
            name: result.name.clone(),
            status: result.status,
            started_at_ms: ms(result.started_at),
            completed_at_ms: ms(result.completed_at),
            duration_ms: ms(result.duration),
            stage,
            dependencies,
            failed_dependencies: result.failed_dependencies.clone(),
            cancellation_reason: (result.reason != CancellationReason::None)
                .then_some(result.reason),
            cancelled_by: result.cancelled_by.clone(),
            failure_kind,
            failure_message,
            configured_timeout_ms: self.declared_timeouts.get(&result.name).map(|t| ms(*t)),
        }
    }
}

fn configuration_record(options: &IgnitionOptions) -> ConfigurationRecord {
    ConfigurationRecord {
        execution_mode: options.execution_mode,
        policy: options.policy.name().to_string(),
        global_timeout_ms: ms(options.global_timeout),
        cancel_on_global_timeout: options.cancel_on_global_timeout,
        cancel_individual_on_timeout: options.cancel_individual_on_timeout,
        cancel_dependents_on_failure: options.cancel_dependents_on_failure,
        max_degree_of_parallelism: options.max_parallelism,
        stage_policy: options.stage_policy,
        early_promotion_threshold: options.early_promotion_threshold,
    }
}

fn summarize(result: &IgnitionResult) -> RunSummary {
    let executed_signals: Vec<&SignalResult> =
        result.signals.iter().filter(|r| executed(r)).collect();
    let slowest = executed_signals
        .iter()
        .max_by_key(|r| r.duration)
        .map(|r| (r.name.clone(), ms(r.duration)));
    let fastest = executed_signals
        .iter()
        .min_by_key(|r| r.duration)
        .map(|r| (r.name.clone(), ms(r.duration)));
    let average_duration_ms = if executed_signals.is_empty() {
        0.0
    } else {
        executed_signals.iter().map(|r| ms(r.duration)).sum::<f64>()
            / executed_signals.len() as f64
    };
    RunSummary {
        succeeded: result.count(SignalStatus::Succeeded),
        failed: result.count(SignalStatus::Failed),
        timed_out: result.count(SignalStatus::TimedOut),
        skipped: result.count(SignalStatus::Skipped),
        cancelled: result.count(SignalStatus::Cancelled),
        max_concurrency: max_concurrency(&executed_signals),
        slowest_signal: slowest.as_ref().map(|(name, _)| name.clone()),
        slowest_duration_ms: slowest.map(|(_, d)| d),
        fastest_signal: fastest.as_ref().map(|(name, _)| name.clone()),
        fastest_duration_ms: fastest.map(|(_, d)| d),
        average_duration_ms,
    }
}

/// Peak overlap from a start/end sweep: ends sort before starts at equal
/// offsets, and the maximum of the running sum is the answer.
pub(crate) fn max_concurrency(signals: &[&SignalResult]) -> usize {
    let mut points: Vec<(Duration, i32)> = Vec::with_capacity(signals.len() * 2);
    for signal in signals {
        points.push((signal.started_at, 1));
        points.push((signal.completed_at, -1));
    }
    points.sort_by_key(|&(at, delta)| (at, delta));
    let mut running = 0i32;
    let mut peak = 0i32;
    for (_, delta) in points {
        running += delta;
        peak = peak.max(running);
    }
    peak.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(name: &str, status: SignalStatus, start_ms: u64, end_ms: u64) -> SignalResult {
        SignalResult {
            name: name.into(),
            status,
            duration: Duration::from_millis(end_ms - start_ms),
            failure: None,
            failed_dependencies: Vec::new(),
            reason: CancellationReason::None,
            cancelled_by: None,
            started_at: Duration::from_millis(start_ms),
            completed_at: Duration::from_millis(end_ms),
        }
    }

    fn run(signals: Vec<SignalResult>) -> IgnitionResult {
        IgnitionResult {
            total_duration: Duration::from_millis(
                signals
                    .iter()
                    .map(|s| s.completed_at.as_millis() as u64)
                    .max()
                    .unwrap_or(0),
            ),
            signals,
            timed_out: false,
            deadline_exceeded: false,
            stages: None,
        }
    }

    #[test]
    fn required_fields_serialize_camel_case() {
        let recording = RecordingBuilder::new(&run(vec![signal(
            "db",
            SignalStatus::Succeeded,
            0,
            10,
        )]))
        .build();
        let value: serde_json::Value =
            serde_json::from_str(&recording.to_json().unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], "1.0");
        assert!(value.get("totalDurationMs").is_some());
        assert!(value.get("timedOut").is_some());
        assert_eq!(value["signals"][0]["name"], "db");
        assert!(value["signals"][0].get("startedAtMs").is_some());
        // Null optionals are omitted, not serialized.
        assert!(value["signals"][0].get("failureMessage").is_none());
        assert!(value["signals"][0].get("cancellationReason").is_none());
    }

    #[test]
    fn roundtrip_preserves_schema_version_and_rows() {
        let recording = RecordingBuilder::new(&run(vec![
            signal("a", SignalStatus::Succeeded, 0, 10),
            signal("b", SignalStatus::Failed, 0, 20),
        ]))
        .build();
        let parsed = Recording::from_json(&recording.to_json().unwrap()).unwrap();
        assert_eq!(parsed, recording);
        assert_eq!(parsed.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn unknown_fields_are_ignored_on_read() {
        let json = r#"{
            "schemaVersion": "1.0",
            "totalDurationMs": 12.5,
            "timedOut": false,
            "signals": [],
            "futureField": {"nested": true}
        }"#;
        let parsed = Recording::from_json(json).unwrap();
        assert_eq!(parsed.total_duration_ms, 12.5);
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let json = r#"{"schemaVersion": "1.0", "timedOut": false, "signals": []}"#;
        assert!(Recording::from_json(json).is_err());
    }

    #[test]
    fn summary_tracks_extremes_over_executed_signals() {
        let mut skipped = signal("late", SignalStatus::Skipped, 0, 0);
        skipped.failed_dependencies = vec!["a".into()];
        let recording = RecordingBuilder::new(&run(vec![
            signal("slow", SignalStatus::Succeeded, 0, 300),
            signal("quick", SignalStatus::Succeeded, 0, 50),
            skipped,
        ]))
        .build();
        let summary = recording.summary.unwrap();
        assert_eq!(summary.slowest_signal.as_deref(), Some("slow"));
        assert_eq!(summary.fastest_signal.as_deref(), Some("quick"));
        assert_eq!(summary.skipped, 1);
        assert!((summary.average_duration_ms - 175.0).abs() < f64::EPSILON);
    }

    #[test]
    fn max_concurrency_counts_overlap() {
        let a = signal("a", SignalStatus::Succeeded, 0, 100);
        let b = signal("b", SignalStatus::Succeeded, 50, 150);
        let c = signal("c", SignalStatus::Succeeded, 150, 200);
        let signals = [&a, &b, &c];
        // c starts exactly when b ends; the end sorts first.
        assert_eq!(max_concurrency(&signals), 2);
    }

    #[test]
    fn max_concurrency_empty_is_zero() {
        assert_eq!(max_concurrency(&[]), 0);
    }

    #[test]
    fn cancellation_reason_recorded_when_present() {
        let mut cancelled = signal("member", SignalStatus::Cancelled, 10, 40);
        cancelled.reason = CancellationReason::BundleCancelled;
        cancelled.cancelled_by = Some("sibling".into());
        let recording = RecordingBuilder::new(&run(vec![cancelled])).build();
        let row = &recording.signals[0];
        assert_eq!(
            row.cancellation_reason,
            Some(CancellationReason::BundleCancelled)
        );
        assert_eq!(row.cancelled_by.as_deref(), Some("sibling"));
    }

    #[test]
    fn configured_timeout_lands_in_the_row() {
        let mut timeouts = HashMap::new();
        timeouts.insert("db".to_string(), Duration::from_millis(750));
        let recording = RecordingBuilder::new(&run(vec![signal(
            "db",
            SignalStatus::Succeeded,
            0,
            10,
        )]))
        .with_declared_timeouts(timeouts)
        .build();
        assert_eq!(recording.signals[0].configured_timeout_ms, Some(750.0));
    }
}
