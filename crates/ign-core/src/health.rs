// SPDX-License-Identifier: MIT OR Apache-2.0
//! Readiness view over a completed run.
//!
//! A query-only projection of a cached [`IgnitionResult`]; deriving a report
//! never re-enters the coordinator.

use crate::result::{IgnitionResult, SignalStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse readiness classification for health surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Every signal succeeded within its deadlines.
    Healthy,
    /// Every signal succeeded, but only after the global deadline passed.
    Degraded,
    /// At least one signal failed, timed out, was skipped, or was cancelled.
    Unhealthy,
}

/// Serializable readiness summary derived from a run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ReadinessReport {
    /// The overall classification.
    pub readiness: Readiness,
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
    /// Names of the signals that are not ready, in result order.
    pub blocking: Vec<String>,
}

impl ReadinessReport {
    /// Derive a report from a completed run.
    #[must_use]
    pub fn from_result(result: &IgnitionResult) -> Self {
        let readiness = if result.all_succeeded() && !result.timed_out {
            if result.deadline_exceeded {
                Readiness::Degraded
            } else {
                Readiness::Healthy
            }
        } else {
            Readiness::Unhealthy
        };
        let blocking = result
            .signals
            .iter()
            .filter(|r| r.status != SignalStatus::Succeeded)
            .map(|r| r.name.clone())
            .collect();
        Self {
            readiness,
            succeeded: result.count(SignalStatus::Succeeded),
            failed: result.count(SignalStatus::Failed),
            timed_out: result.count(SignalStatus::TimedOut),
            skipped: result.count(SignalStatus::Skipped),
            cancelled: result.count(SignalStatus::Cancelled),
            blocking,
        }
    }

    /// `true` when the process may serve traffic.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        matches!(self.readiness, Readiness::Healthy | Readiness::Degraded)
    }
}
