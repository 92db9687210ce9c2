// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coordinates, recorded positions and manual corrections.

use crate::error::{AppError, Result};
use crate::models::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct LatLng {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<LatLng> for geo::Coord<f64> {
    fn from(p: LatLng) -> Self {
        geo::Coord { x: p.lng, y: p.lat }
    }
}

impl From<geo::Coord<f64>> for LatLng {
    fn from(c: geo::Coord<f64>) -> Self {
        LatLng::new(c.y, c.x)
    }
}

/// Manual verification state of a recorded position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedStatus {
    #[default]
    Pending,
    Correct,
    Incorrect,
}

/// One sample from the platform coordinate stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: LatLng,
    /// Reported accuracy radius in meters
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A recorded position as kept in the local log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Sequence number within the track's local log (0-based)
    pub id: u64,
    pub track_id: TrackId,
    /// Raw coordinate as captured; never rewritten
    pub position: LatLng,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Only present when `verified_status` is `Incorrect`
    pub corrected_position: Option<LatLng>,
    #[serde(default)]
    pub verified_status: VerifiedStatus,
    pub annotation_notes: Option<String>,
    /// Id assigned by the remote store once the position is delivered
    #[serde(default)]
    pub remote_id: Option<u64>,
}

impl Position {
    pub fn from_sample(id: u64, track_id: TrackId, sample: &Sample) -> Self {
        Self {
            id,
            track_id,
            position: sample.position,
            accuracy: sample.accuracy,
            timestamp: sample.timestamp,
            corrected_position: None,
            verified_status: VerifiedStatus::Pending,
            annotation_notes: None,
            remote_id: None,
        }
    }

    /// The corrected coordinate if one exists, otherwise the raw one.
    pub fn effective_position(&self) -> LatLng {
        self.corrected_position.unwrap_or(self.position)
    }

    /// Apply a verification result, keeping the correction invariant.
    pub fn apply_correction(&mut self, correction: &Correction) -> Result<()> {
        correction.validate_invariant()?;
        self.verified_status = correction.verified_status;
        self.corrected_position = correction.corrected_position;
        if correction.annotation_notes.is_some() {
            self.annotation_notes = correction.annotation_notes.clone();
        }
        Ok(())
    }
}

/// A verification update for one position (last write wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub verified_status: VerifiedStatus,
    pub corrected_position: Option<LatLng>,
    pub annotation_notes: Option<String>,
}

impl Correction {
    fn validate_invariant(&self) -> Result<()> {
        match (self.verified_status, self.corrected_position) {
            (VerifiedStatus::Incorrect, None) => Err(AppError::BadRequest(
                "an incorrect position needs a corrected coordinate".to_string(),
            )),
            (VerifiedStatus::Incorrect, Some(p)) if !p.is_valid() => Err(AppError::BadRequest(
                format!("corrected coordinate out of range: {}, {}", p.lat, p.lng),
            )),
            (VerifiedStatus::Incorrect, Some(_)) => Ok(()),
            (status, Some(_)) => Err(AppError::BadRequest(format!(
                "a {:?} position cannot carry a corrected coordinate",
                status
            ))),
            (_, None) => Ok(()),
        }
    }
}
