// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-signal and run-level results.

use ign_cancel::CancellationReason;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Terminal classification of a single signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// The wait completed without error.
    Succeeded,
    /// The wait returned an error; the value is captured in the result.
    Failed,
    /// The signal's own timeout, the global deadline, or an external
    /// cancellation cut the wait short.
    TimedOut,
    /// The signal never started because a dependency failed.
    Skipped,
    /// The signal was actively cancelled through a scope.
    Cancelled,
}

impl SignalStatus {
    /// Statuses that count as "ready" for the run outcome: the work either
    /// succeeded or was deliberately skipped.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Statuses that feed the dependency-failure propagation set.
    #[must_use]
    pub fn is_failure(self) -> bool {
        !self.is_ready()
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SignalResult
// ---------------------------------------------------------------------------

/// Outcome of one signal within a run.
///
/// `started_at` and `completed_at` are monotonic offsets from run start.
/// Invariant: `started_at <= completed_at`. A skipped signal carries zero
/// duration, with both offsets set to the moment the skip was decided.
#[derive(Debug, Clone)]
pub struct SignalResult {
    /// The signal's name.
    pub name: String,
    /// Terminal classification.
    pub status: SignalStatus,
    /// Wall-clock time the wait was in flight. Zero when never started.
    pub duration: Duration,
    /// Captured failure value for [`SignalStatus::Failed`].
    pub failure: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// Dependencies that failed, for skipped or dependency-cancelled signals.
    pub failed_dependencies: Vec<String>,
    /// Why the signal was cancelled or timed out.
    pub reason: CancellationReason,
    /// Signal(s) whose failure triggered the cancellation, comma-joined.
    pub cancelled_by: Option<String>,
    /// Offset from run start when execution began.
    pub started_at: Duration,
    /// Offset from run start when the result was classified.
    pub completed_at: Duration,
}

impl SignalResult {
    /// Result for a signal that never started because dependencies failed.
    #[must_use]
    pub fn skipped(name: impl Into<String>, failed_dependencies: Vec<String>, at: Duration) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::Skipped,
            duration: Duration::ZERO,
            failure: None,
            failed_dependencies,
            reason: CancellationReason::None,
            cancelled_by: None,
            started_at: at,
            completed_at: at,
        }
    }

    /// Result for a signal cancelled before starting because dependencies
    /// failed and dependent cancellation is enabled.
    #[must_use]
    pub fn dependency_cancelled(
        name: impl Into<String>,
        failed_dependencies: Vec<String>,
        at: Duration,
    ) -> Self {
        let cancelled_by = Some(failed_dependencies.join(", "));
        Self {
            name: name.into(),
            status: SignalStatus::Cancelled,
            duration: Duration::ZERO,
            failure: None,
            failed_dependencies,
            reason: CancellationReason::DependencyFailed,
            cancelled_by,
            started_at: at,
            completed_at: at,
        }
    }

    /// Display form of the captured failure, if any.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        self.failure.as_ref().map(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Outcome of one stage in staged execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// The stage number.
    pub stage: u32,
    /// Wall-clock time from stage start to its last terminal signal (or to
    /// promotion hand-off for residual accounting, whichever is later).
    pub duration: Duration,
    /// Results of the stage's signals, registration order.
    pub results: Vec<SignalResult>,
    /// Count of succeeded signals.
    pub succeeded: usize,
    /// Count of failed signals.
    pub failed: usize,
    /// Count of timed-out signals.
    pub timed_out: usize,
    /// `true` when every signal of the stage reached a terminal status.
    pub completed: bool,
    /// `true` when the stage satisfied its early-promotion threshold.
    pub promoted: bool,
}

impl StageResult {
    /// Tally the status counters from `results`.
    #[must_use]
    pub fn tally(stage: u32, duration: Duration, results: Vec<SignalResult>) -> Self {
        let succeeded = results
            .iter()
            .filter(|r| r.status == SignalStatus::Succeeded)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == SignalStatus::Failed)
            .count();
        let timed_out = results
            .iter()
            .filter(|r| r.status == SignalStatus::TimedOut)
            .count();
        Self {
            stage,
            duration,
            results,
            succeeded,
            failed,
            timed_out,
            completed: true,
            promoted: false,
        }
    }
}

// ---------------------------------------------------------------------------
// IgnitionResult
// ---------------------------------------------------------------------------

/// Aggregated outcome of a run.
///
/// Signal results are ordered by graph order in dependency-aware mode,
/// stage-then-interior order in staged mode, and registration order
/// otherwise.
#[derive(Debug, Clone)]
pub struct IgnitionResult {
    /// Total wall-clock duration of the run.
    pub total_duration: Duration,
    /// Ordered per-signal results.
    pub signals: Vec<SignalResult>,
    /// `true` when any signal timed out (hard global timeouts classify
    /// unfinished signals as timed out, so they set this too).
    pub timed_out: bool,
    /// `true` when the global deadline elapsed, even softly.
    pub deadline_exceeded: bool,
    /// Per-stage results in staged mode.
    pub stages: Option<Vec<StageResult>>,
}

impl IgnitionResult {
    /// Look up a signal result by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SignalResult> {
        self.signals.iter().find(|r| r.name == name)
    }

    /// Count of signals with the given status.
    #[must_use]
    pub fn count(&self, status: SignalStatus) -> usize {
        self.signals.iter().filter(|r| r.status == status).count()
    }

    /// `true` when every signal is ready (succeeded or skipped).
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.signals.iter().all(|r| r.status.is_ready())
    }

    /// `true` when every signal succeeded outright.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.signals
            .iter()
            .all(|r| r.status == SignalStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(name: &str, start_ms: u64, end_ms: u64) -> SignalResult {
        SignalResult {
            name: name.into(),
            status: SignalStatus::Succeeded,
            duration: Duration::from_millis(end_ms - start_ms),
            failure: None,
            failed_dependencies: Vec::new(),
            reason: CancellationReason::None,
            cancelled_by: None,
            started_at: Duration::from_millis(start_ms),
            completed_at: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn skipped_has_zero_duration_and_equal_offsets() {
        let r = SignalResult::skipped("late", vec!["dep".into()], Duration::from_millis(40));
        assert_eq!(r.status, SignalStatus::Skipped);
        assert_eq!(r.duration, Duration::ZERO);
        assert_eq!(r.started_at, r.completed_at);
        assert_eq!(r.failed_dependencies, vec!["dep".to_string()]);
    }

    #[test]
    fn dependency_cancelled_joins_names() {
        let r = SignalResult::dependency_cancelled(
            "api",
            vec!["db".into(), "cache".into()],
            Duration::ZERO,
        );
        assert_eq!(r.status, SignalStatus::Cancelled);
        assert_eq!(r.reason, CancellationReason::DependencyFailed);
        assert_eq!(r.cancelled_by.as_deref(), Some("db, cache"));
    }

    #[test]
    fn failure_message_uses_display() {
        let mut r = succeeded("x", 0, 1);
        r.status = SignalStatus::Failed;
        r.failure = Some(Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
            "connection refused",
        )));
        assert_eq!(r.failure_message().as_deref(), Some("connection refused"));
    }

    #[test]
    fn stage_tally_counts_statuses() {
        let mut failed = succeeded("b", 0, 5);
        failed.status = SignalStatus::Failed;
        let stage = StageResult::tally(
            1,
            Duration::from_millis(10),
            vec![succeeded("a", 0, 5), failed],
        );
        assert_eq!(stage.succeeded, 1);
        assert_eq!(stage.failed, 1);
        assert_eq!(stage.timed_out, 0);
        assert!(stage.completed);
        assert!(!stage.promoted);
    }

    #[test]
    fn result_lookup_and_counts() {
        let result = IgnitionResult {
            total_duration: Duration::from_millis(20),
            signals: vec![succeeded("a", 0, 10), succeeded("b", 0, 20)],
            timed_out: false,
            deadline_exceeded: false,
            stages: None,
        };
        assert!(result.all_succeeded());
        assert!(result.all_ready());
        assert_eq!(result.count(SignalStatus::Succeeded), 2);
        assert_eq!(result.get("b").unwrap().completed_at, Duration::from_millis(20));
        assert!(result.get("missing").is_none());
    }

    #[test]
    fn ready_statuses() {
        assert!(SignalStatus::Succeeded.is_ready());
        assert!(SignalStatus::Skipped.is_ready());
        assert!(SignalStatus::Failed.is_failure());
        assert!(SignalStatus::TimedOut.is_failure());
        assert!(SignalStatus::Cancelled.is_failure());
    }

    #[test]
    fn status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&SignalStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
