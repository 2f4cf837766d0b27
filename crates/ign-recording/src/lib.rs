// SPDX-License-Identifier: MIT OR Apache-2.0
//! ign-recording
//!
//! Structured, serializable artifacts derived from a completed run: the
//! [`Recording`] (schema v1.0, camelCase JSON) and the Gantt-shaped
//! [`Timeline`] view. Both are deterministic for a given result, modulo
//! wall-clock fields, and round-trip through their serialized form.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The recording artifact and its builder.
pub mod recording;
/// The Gantt-shaped view over a recording.
pub mod timeline;

pub use recording::{
    ConfigurationRecord, Recording, RecordingBuilder, RunSummary, SCHEMA_VERSION, SignalRecord,
    StageRecord,
};
pub use timeline::{MarkerKind, StageBand, Timeline, TimelineEntry, TimelineMarker};
