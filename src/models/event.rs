// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed events delivered to the presentation layer.

use crate::error::ErrorClass;
use crate::models::{DrainReport, HidingSpot, TrackId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the engine reports to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    RegionEntered {
        region_id: u64,
        name: String,
        at: DateTime<Utc>,
    },
    RegionExited {
        region_id: u64,
        name: String,
        at: DateTime<Utc>,
    },
    /// Nearest unresolved hiding spot within range, or `None`
    NearestHidingSpot {
        spot: Option<HidingSpot>,
        distance_m: Option<f64>,
        at: DateTime<Utc>,
    },
    RecordingStarted {
        track_id: TrackId,
        at: DateTime<Utc>,
    },
    RecordingStopped {
        track_id: TrackId,
        at: DateTime<Utc>,
    },
    TrackRemapped {
        old_id: TrackId,
        new_id: TrackId,
    },
    ConnectivityChanged {
        online: bool,
    },
    SyncCompleted {
        report: DrainReport,
    },
    /// A queued mutation was rejected and dropped
    EntryDropped {
        entry: String,
        class: ErrorClass,
        reason: String,
    },
    RecorderHalted {
        reason: String,
    },
}

impl EngineEvent {
    /// Region enter/exit events are the ones kept in the recent-events list.
    pub fn is_region_event(&self) -> bool {
        matches!(
            self,
            EngineEvent::RegionEntered { .. } | EngineEvent::RegionExited { .. }
        )
    }
}
