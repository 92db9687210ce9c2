// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Offline queue entries and drain reports.

use crate::models::{LatLng, Track, TrackId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mutation not yet acknowledged by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEntry {
    CreateTrack {
        client_id: TrackId,
        track: Track,
    },
    AppendPosition {
        track_id: TrackId,
        /// Sequence number in the local log, used to advance the sync pointer
        position_id: u64,
        position: LatLng,
        accuracy: Option<f64>,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEntry {
    /// Track this entry belongs to.
    pub fn track_id(&self) -> TrackId {
        match self {
            QueueEntry::CreateTrack { client_id, .. } => *client_id,
            QueueEntry::AppendPosition { track_id, .. } => *track_id,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, QueueEntry::CreateTrack { .. })
    }

    /// Point an entry at a remapped track id. Returns whether it changed.
    ///
    /// Appends follow their track; pending creates follow their reference
    /// track so a dog track created offline links to the right human track.
    pub fn retarget(&mut self, old: TrackId, new: TrackId) -> bool {
        match self {
            QueueEntry::AppendPosition { track_id, .. } if *track_id == old => {
                *track_id = new;
                true
            }
            QueueEntry::CreateTrack { track, .. } if track.reference_track_id == Some(old) => {
                track.reference_track_id = Some(new);
                true
            }
            _ => false,
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            QueueEntry::CreateTrack { client_id, .. } => format!("create track {}", client_id),
            QueueEntry::AppendPosition {
                track_id,
                position_id,
                ..
            } => format!("append position {} to track {}", position_id, track_id),
        }
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Tracks created remotely
    pub created: u32,
    /// Positions delivered
    pub appended: u32,
    /// Entries dropped after a non-transient rejection
    pub dropped: u32,
    /// Entries put back for the next cycle
    pub requeued: u32,
    /// Client ids remapped to server ids, in creation order
    pub remapped: Vec<(TrackId, TrackId)>,
}

impl DrainReport {
    /// True if every entry was delivered.
    pub fn is_complete_success(&self) -> bool {
        self.dropped == 0 && self.requeued == 0
    }

    pub fn is_empty(&self) -> bool {
        *self == DrainReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retarget_only_touches_matching_appends() {
        let mut entry = QueueEntry::AppendPosition {
            track_id: TrackId::Local(1000),
            position_id: 0,
            position: LatLng::new(1.0, 2.0),
            accuracy: None,
            timestamp: Utc::now(),
        };
        assert!(!entry.retarget(TrackId::Local(5), TrackId::Remote(1)));
        assert!(entry.retarget(TrackId::Local(1000), TrackId::Remote(42)));
        assert_eq!(entry.track_id(), TrackId::Remote(42));
    }

    #[test]
    fn test_retarget_updates_pending_reference() {
        let mut entry = QueueEntry::CreateTrack {
            client_id: TrackId::Local(2000),
            track: Track {
                id: TrackId::Local(2000),
                track_type: crate::models::TrackType::Dog,
                name: "Dog".to_string(),
                created_at: Utc::now(),
                reference_track_id: Some(TrackId::Local(1000)),
                synced_positions: 0,
            },
        };
        assert!(entry.retarget(TrackId::Local(1000), TrackId::Remote(42)));
        assert_eq!(entry.track_id(), TrackId::Local(2000));
        match entry {
            QueueEntry::CreateTrack { track, .. } => {
                assert_eq!(track.reference_track_id, Some(TrackId::Remote(42)))
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_entry_serializes_with_type_tag() {
        let entry = QueueEntry::AppendPosition {
            track_id: TrackId::Remote(3),
            position_id: 1,
            position: LatLng::new(1.0, 2.0),
            accuracy: Some(4.0),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "append_position");
        assert_eq!(value["track_id"], "3");
    }
}
