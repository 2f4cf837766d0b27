// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Gantt-shaped view over a recording.
//!
//! Entries carry concurrent-group identifiers so a renderer can lay
//! overlapping signals out in one band; stage bands and boundary markers
//! frame the picture.

use crate::recording::{Recording, SignalRecord};
use ign_core::SignalStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One bar in the Gantt view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// The signal's name.
    pub name: String,
    /// Terminal classification.
    pub status: SignalStatus,
    /// Bar start, milliseconds from run start.
    pub start_ms: f64,
    /// Bar end, milliseconds from run start.
    pub end_ms: f64,
    /// Concurrent-group identifier: entries that transitively overlap in
    /// time share a group.
    pub group: usize,
    /// Stage number, staged runs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<u32>,
}

/// Horizontal band covering one stage's activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageBand {
    /// The stage number.
    pub stage: u32,
    /// Band start, milliseconds from run start.
    pub start_ms: f64,
    /// Band end, milliseconds from run start.
    pub end_ms: f64,
}

/// What a boundary marker denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// The configured global timeout.
    GlobalTimeout,
    /// The run's completion instant.
    Completion,
}

/// A vertical marker on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMarker {
    /// What the marker denotes.
    pub kind: MarkerKind,
    /// Marker position, milliseconds from run start.
    pub at_ms: f64,
}

/// Gantt-shaped projection of a [`Recording`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Bars, in recording order.
    pub entries: Vec<TimelineEntry>,
    /// Stage bands, staged runs only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_bands: Vec<StageBand>,
    /// Boundary markers.
    pub markers: Vec<TimelineMarker>,
    /// Peak number of concurrently executing signals.
    pub max_concurrency: usize,
}

impl Timeline {
    /// Project a recording into its timeline view.
    #[must_use]
    pub fn from_recording(recording: &Recording) -> Self {
        let entries = group_entries(&recording.signals);
        let stage_bands = stage_bands(recording);
        let mut markers = Vec::with_capacity(2);
        if let Some(configuration) = &recording.configuration {
            markers.push(TimelineMarker {
                kind: MarkerKind::GlobalTimeout,
                at_ms: configuration.global_timeout_ms,
            });
        }
        markers.push(TimelineMarker {
            kind: MarkerKind::Completion,
            at_ms: recording.total_duration_ms,
        });
        Self {
            entries,
            stage_bands,
            markers,
            max_concurrency: sweep_max_concurrency(&recording.signals),
        }
    }
}

/// Assign concurrent-group ids by sweeping bars in start order: a bar that
/// begins after every earlier bar has ended opens a new group.
fn group_entries(signals: &[SignalRecord]) -> Vec<TimelineEntry> {
    let mut order: Vec<usize> = (0..signals.len()).collect();
    order.sort_by(|&a, &b| {
        signals[a]
            .started_at_ms
            .partial_cmp(&signals[b].started_at_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut groups = vec![0usize; signals.len()];
    let mut group = 0usize;
    let mut horizon = f64::NEG_INFINITY;
    for (position, &index) in order.iter().enumerate() {
        let row = &signals[index];
        if position > 0 && row.started_at_ms > horizon {
            group += 1;
        }
        horizon = horizon.max(row.completed_at_ms);
        groups[index] = group;
    }

    signals
        .iter()
        .enumerate()
        .map(|(index, row)| TimelineEntry {
            name: row.name.clone(),
            status: row.status,
            start_ms: row.started_at_ms,
            end_ms: row.completed_at_ms,
            group: groups[index],
            stage: row.stage,
        })
        .collect()
}

/// Running-sum sweep over (time, ±1) points; ends sort before starts at
/// equal offsets so back-to-back bars do not count as concurrent.
fn sweep_max_concurrency(signals: &[SignalRecord]) -> usize {
    let mut points: Vec<(f64, i32)> = Vec::with_capacity(signals.len() * 2);
    for row in signals {
        if row.completed_at_ms > row.started_at_ms {
            points.push((row.started_at_ms, 1));
            points.push((row.completed_at_ms, -1));
        }
    }
    points.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    let mut running = 0i32;
    let mut peak = 0i32;
    for (_, delta) in points {
        running += delta;
        peak = peak.max(running);
    }
    peak.max(0) as usize
}

fn stage_bands(recording: &Recording) -> Vec<StageBand> {
    let Some(stages) = &recording.stages else {
        return Vec::new();
    };
    stages
        .iter()
        .filter_map(|stage| {
            let rows: Vec<&SignalRecord> = recording
                .signals
                .iter()
                .filter(|row| row.stage == Some(stage.stage))
                .filter(|row| row.completed_at_ms > row.started_at_ms)
                .collect();
            let start = rows
                .iter()
                .map(|r| r.started_at_ms)
                .fold(f64::INFINITY, f64::min);
            let end = rows
                .iter()
                .map(|r| r.completed_at_ms)
                .fold(f64::NEG_INFINITY, f64::max);
            (!rows.is_empty()).then_some(StageBand {
                stage: stage.stage,
                start_ms: start,
                end_ms: end,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBuilder;
    use ign_core::IgnitionResult;
    use ign_core::SignalResult;
    use std::time::Duration;

    fn signal(name: &str, start_ms: u64, end_ms: u64) -> SignalResult {
        SignalResult {
            name: name.into(),
            status: SignalStatus::Succeeded,
            duration: Duration::from_millis(end_ms - start_ms),
            failure: None,
            failed_dependencies: Vec::new(),
            reason: ign_cancel::CancellationReason::None,
            cancelled_by: None,
            started_at: Duration::from_millis(start_ms),
            completed_at: Duration::from_millis(end_ms),
        }
    }

    fn recording(signals: Vec<SignalResult>) -> Recording {
        let total = signals
            .iter()
            .map(|s| s.completed_at.as_millis() as u64)
            .max()
            .unwrap_or(0);
        let result = IgnitionResult {
            total_duration: Duration::from_millis(total),
            signals,
            timed_out: false,
            deadline_exceeded: false,
            stages: None,
        };
        RecordingBuilder::new(&result).build()
    }

    #[test]
    fn overlapping_bars_share_a_group() {
        let timeline = Timeline::from_recording(&recording(vec![
            signal("a", 0, 100),
            signal("b", 50, 150),
            signal("c", 200, 250),
        ]));
        assert_eq!(timeline.entries[0].group, timeline.entries[1].group);
        assert_ne!(timeline.entries[0].group, timeline.entries[2].group);
        assert_eq!(timeline.max_concurrency, 2);
    }

    #[test]
    fn chained_overlap_is_one_group() {
        // a-b overlap and b-c overlap, so all three share a group even
        // though a and c never run together.
        let timeline = Timeline::from_recording(&recording(vec![
            signal("a", 0, 100),
            signal("b", 90, 200),
            signal("c", 190, 300),
        ]));
        let groups: Vec<usize> = timeline.entries.iter().map(|e| e.group).collect();
        assert_eq!(groups, vec![groups[0]; 3]);
        assert_eq!(timeline.max_concurrency, 2);
    }

    #[test]
    fn back_to_back_bars_do_not_count_as_concurrent() {
        let timeline = Timeline::from_recording(&recording(vec![
            signal("a", 0, 100),
            signal("b", 100, 200),
        ]));
        assert_eq!(timeline.max_concurrency, 1);
    }

    #[test]
    fn completion_marker_is_always_present() {
        let timeline = Timeline::from_recording(&recording(vec![signal("a", 0, 120)]));
        assert!(
            timeline
                .markers
                .iter()
                .any(|m| m.kind == MarkerKind::Completion && (m.at_ms - 120.0).abs() < 1e-9)
        );
    }

    #[test]
    fn timeline_roundtrips_through_json() {
        let timeline = Timeline::from_recording(&recording(vec![
            signal("a", 0, 100),
            signal("b", 20, 60),
        ]));
        let json = serde_json::to_string(&timeline).unwrap();
        let back: Timeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timeline);
    }

    #[test]
    fn empty_recording_has_zero_concurrency() {
        let timeline = Timeline::from_recording(&recording(vec![]));
        assert!(timeline.entries.is_empty());
        assert_eq!(timeline.max_concurrency, 0);
    }
}
