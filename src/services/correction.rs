// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manual verification of recorded positions.
//!
//! Corrections are written to the local log first and then pushed to the
//! remote store if the position has been delivered. Concurrent edits from
//! different sessions resolve last-write-wins.

use crate::error::{AppError, Result};
use crate::models::{Correction, LatLng, Position, TrackId, TrackType, VerifiedStatus};
use crate::services::proximity::snap_to_track;
use crate::services::recorder::TrackRecorder;
use crate::services::remote::PositionUpdate;
use serde::{Deserialize, Serialize};

/// Suggests corrected coordinates, e.g. from a trained model.
pub trait CorrectionPredictor: Send + Sync {
    /// Proposed coordinate for `position`, given the reference human track.
    fn suggest(&self, position: &Position, reference: &[Position]) -> Option<LatLng>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionRequest {
    pub verified_status: VerifiedStatus,
    pub corrected_position: Option<LatLng>,
    pub annotation_notes: Option<String>,
    /// Snap the corrected coordinate onto the reference human track
    #[serde(default)]
    pub snap: bool,
    /// Overrides the configured snapping range
    pub snap_distance_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub position: Position,
    /// Whether the remote store has the new values
    pub synced: bool,
}

impl TrackRecorder {
    /// Apply a manual correction to one position.
    pub async fn correct_position(
        &self,
        track_id: TrackId,
        position_id: u64,
        request: CorrectionRequest,
    ) -> Result<CorrectionOutcome> {
        let (position, online) = {
            let mut st = self.lock();
            let mut log = st.store.log();
            let track = log
                .get_track(track_id)?
                .ok_or_else(|| AppError::NotFound(format!("track {}", track_id)))?;
            let mut position = log
                .get_position(track_id, position_id)?
                .ok_or_else(|| AppError::NotFound(format!("position {}", position_id)))?;

            let mut corrected = request.corrected_position;
            if request.snap && track.track_type == TrackType::Dog {
                if let (Some(target), Some(reference)) = (corrected, track.reference_track_id) {
                    let max = request.snap_distance_m.unwrap_or(self.settings().snap_m);
                    corrected = Some(snap_to_track(target, &log.read_all(reference)?, max));
                }
            }

            position.apply_correction(&Correction {
                verified_status: request.verified_status,
                corrected_position: corrected,
                annotation_notes: request.annotation_notes,
            })?;
            log.update_position(&position)?;
            drop(log);
            (position, st.online)
        };

        let synced = match position.remote_id {
            Some(remote_id) if online => {
                let update = PositionUpdate {
                    verified_status: position.verified_status,
                    corrected_position: position.corrected_position,
                    annotation_notes: position.annotation_notes.clone(),
                };
                match self.remote().update_position(remote_id, &update).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(position_id, error = %err, "Correction kept locally only");
                        self.note_remote_error(&err);
                        false
                    }
                }
            }
            _ => false,
        };

        tracing::info!(track_id = %track_id, position_id, synced, "Position corrected");
        Ok(CorrectionOutcome { position, synced })
    }

    /// Ask the configured predictor for a corrected coordinate.
    ///
    /// Returns `None` when no predictor is configured, the track has no
    /// reference track, or the predictor has no suggestion.
    pub fn suggest_correction(&self, track_id: TrackId, position_id: u64) -> Result<Option<LatLng>> {
        let Some(predictor) = self.predictor() else {
            return Ok(None);
        };
        let mut st = self.lock();
        let log = st.store.log();
        let track = log
            .get_track(track_id)?
            .ok_or_else(|| AppError::NotFound(format!("track {}", track_id)))?;
        let position = log
            .get_position(track_id, position_id)?
            .ok_or_else(|| AppError::NotFound(format!("position {}", position_id)))?;
        let Some(reference) = track.reference_track_id else {
            return Ok(None);
        };
        let reference = log.read_all(reference)?;
        Ok(predictor.suggest(&position, &reference))
    }
}
