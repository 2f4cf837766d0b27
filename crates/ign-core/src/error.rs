// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error catalog: configuration errors and run-level failures.
//!
//! Everything recoverable becomes a classified [`SignalResult`]; only
//! configuration errors and policy-driven stops reach the caller.
//!
//! [`SignalResult`]: crate::result::SignalResult

use serde::Serialize;
use thiserror::Error;

/// Fatal configuration problems detected before any run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The dependency relation contains a cycle.
    #[error("dependency cycle detected: {path}")]
    DependencyCycle {
        /// The cycle rendered as `a -> b -> ... -> a`.
        path: String,
    },

    /// A signal declared an empty name.
    #[error("signal names must not be empty")]
    EmptySignalName,

    /// A signal declared a zero-length timeout.
    #[error("signal `{name}` declares a zero timeout")]
    InvalidSignalTimeout {
        /// The offending signal.
        name: String,
    },

    /// The global timeout is zero.
    #[error("global timeout must be positive")]
    InvalidGlobalTimeout,

    /// The early-promotion threshold is outside `[0, 1]`.
    #[error("early promotion threshold {value} is outside [0, 1]")]
    InvalidThreshold {
        /// The rejected value.
        value: f64,
    },

    /// `max_parallelism` was set to zero.
    #[error("max parallelism must be at least 1 when bounded")]
    InvalidParallelism,

    /// Dependency-aware execution was requested without a graph.
    #[error("dependency-aware execution requires a signal graph")]
    MissingGraph,

    /// A dependency edge references a signal that was never registered.
    #[error("signal `{from}` depends on unknown signal `{to}`")]
    UnknownDependency {
        /// The depending signal.
        from: String,
        /// The missing dependency.
        to: String,
    },

    /// The same signal name was registered twice in the graph.
    #[error("duplicate signal `{name}` in dependency graph")]
    DuplicateGraphSignal {
        /// The repeated name.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Run-level failure
// ---------------------------------------------------------------------------

/// One entry of an aggregated run failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalFault {
    /// The signal that failed or timed out.
    pub signal: String,
    /// Display form of the captured failure, or a timeout description.
    pub message: String,
}

impl std::fmt::Display for SignalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.signal, self.message)
    }
}

/// Errors surfaced by a coordinator run.
#[derive(Debug, Clone, Error)]
pub enum IgnitionError {
    /// The coordinator was misconfigured; no run was started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The continuation policy stopped the run. Carries every captured
    /// failure value, in result order.
    #[error("ignition halted: {faults}", faults = format_faults(.failures))]
    Halted {
        /// The failures that drove the stop.
        failures: Vec<SignalFault>,
    },
}

fn format_faults(failures: &[SignalFault]) -> String {
    if failures.is_empty() {
        return String::from("policy stopped the run");
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
