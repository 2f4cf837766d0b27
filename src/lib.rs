// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! ignition
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The facade crate: one dependency pulls in the whole surface. Hosts that
//! want a narrower footprint can depend on the member crates directly
//! (`ign-core` for the contract, `ign-runtime` for the coordinator).

pub use ign_cancel::{CancellationReason, CancellationScope, CancellationSource, CancellationToken};
pub use ign_core::{
    BestEffort, ConfigError, ContinueOnTimeout, DefaultTimeoutStrategy, EffectiveTimeout,
    ExecutionMode, FailFast, FixedTimeoutStrategy, FnSignal, IgnitionError, IgnitionMetrics,
    IgnitionOptions, IgnitionPolicy, IgnitionResult, MetricsSnapshot, PolicyContext, Readiness,
    ReadinessReport, RunMetrics, Signal, SignalError, SignalFault, SignalResult, SignalStatus,
    StageExecutionMode, StagePolicy, StageResult, TimeoutStrategy,
};
pub use ign_graph::{GraphBuilder, GraphError, SignalGraph};
pub use ign_recording::{
    ConfigurationRecord, MarkerKind, Recording, RecordingBuilder, RunSummary, SCHEMA_VERSION,
    SignalRecord, StageBand, StageRecord, Timeline, TimelineEntry, TimelineMarker,
};
pub use ign_runtime::{
    Coordinator, CoordinatorBuilder, CoordinatorState, EventBus, EventBusStats, EventSubscription,
    HookRegistry, HookResult, IgnitionEvent, LifecycleHook, LoggingHook, MetricsHook,
};
