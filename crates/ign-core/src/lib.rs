// SPDX-License-Identifier: MIT OR Apache-2.0
//! ign-core
//!
//! The stable contract for ignition: signals, their results, run options,
//! continuation policies, timeout strategies, the error catalog, metrics,
//! and the readiness view.
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Error catalog: configuration errors and run-level failures.
pub mod error;
/// Readiness view over a completed run.
pub mod health;
/// Metrics contract and the default atomic collector.
pub mod metrics;
/// Run options and their validation.
pub mod options;
/// Continuation policies evaluated after each signal completion.
pub mod policy;
/// Per-signal and run-level results.
pub mod result;
/// The signal contract and the closure-backed adapter.
pub mod signal;
/// Pluggable effective-timeout decisions.
pub mod timeout;

pub use error::{ConfigError, IgnitionError, SignalFault};
pub use health::{Readiness, ReadinessReport};
pub use metrics::{IgnitionMetrics, MetricsSnapshot, RunMetrics};
pub use options::{ExecutionMode, IgnitionOptions, StageExecutionMode, StagePolicy};
pub use policy::{BestEffort, ContinueOnTimeout, FailFast, IgnitionPolicy, PolicyContext};
pub use result::{IgnitionResult, SignalResult, SignalStatus, StageResult};
pub use signal::{FnSignal, Signal, SignalError};
pub use timeout::{DefaultTimeoutStrategy, EffectiveTimeout, FixedTimeoutStrategy, TimeoutStrategy};
