// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS cleanup before tracks are compared.
//!
//! Three passes run in order: positions with a poor accuracy radius are
//! dropped, then positions that imply an unrealistic speed from the last
//! kept position, then the survivors get a centered moving average. The
//! stored log is never modified.

use crate::geometry;
use crate::models::{LatLng, Position, TrackType};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MAX_ACCURACY_M: f64 = 50.0;
pub const HUMAN_MAX_SPEED_KMH: f64 = 50.0;
pub const DOG_MAX_SPEED_KMH: f64 = 100.0;
pub const SMOOTH_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub max_accuracy_m: f64,
    pub max_speed_kmh: f64,
    pub smooth_window: usize,
}

impl FilterSettings {
    /// Dogs legitimately move about twice as fast as their handlers.
    pub fn for_track(track_type: TrackType) -> Self {
        let max_speed_kmh = match track_type {
            TrackType::Human => HUMAN_MAX_SPEED_KMH,
            TrackType::Dog => DOG_MAX_SPEED_KMH,
        };
        Self {
            max_accuracy_m: MAX_ACCURACY_M,
            max_speed_kmh,
            smooth_window: SMOOTH_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    AccuracyTooPoor,
    SpeedTooHigh,
}

/// A position removed by the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outlier {
    pub position_id: u64,
    pub reason: OutlierReason,
    /// Accuracy radius in meters or speed in km/h, depending on `reason`
    pub value: f64,
}

/// A position that survived filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanPoint {
    pub position_id: u64,
    /// Corrected coordinate if the position has one, else the raw one
    pub position: LatLng,
    pub smoothed: LatLng,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStats {
    pub original_count: usize,
    pub after_filtering: usize,
    pub removed_by_accuracy: usize,
    pub removed_by_speed: usize,
    pub retention_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteredTrack {
    pub points: Vec<CleanPoint>,
    pub outliers: Vec<Outlier>,
    pub stats: FilterStats,
}

impl FilteredTrack {
    pub fn smoothed(&self) -> Vec<LatLng> {
        self.points.iter().map(|p| p.smoothed).collect()
    }
}

/// Split off positions whose accuracy radius exceeds `max_accuracy_m`.
///
/// Positions without a reported accuracy are kept.
pub fn filter_accuracy<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    max_accuracy_m: f64,
) -> (Vec<&'a Position>, Vec<Outlier>) {
    let mut kept = Vec::new();
    let mut outliers = Vec::new();
    for position in positions {
        match position.accuracy {
            Some(accuracy) if accuracy > max_accuracy_m => outliers.push(Outlier {
                position_id: position.id,
                reason: OutlierReason::AccuracyTooPoor,
                value: accuracy,
            }),
            _ => kept.push(position),
        }
    }
    (kept, outliers)
}

/// Speed between two positions in km/h, `None` if they share a timestamp.
pub fn speed_kmh(from: &Position, to: &Position) -> Option<f64> {
    let secs = (to.timestamp - from.timestamp).num_milliseconds().abs() as f64 / 1000.0;
    if secs == 0.0 {
        return None;
    }
    let meters = geometry::distance(from.effective_position(), to.effective_position());
    Some(meters / secs * 3.6)
}

/// Split off positions reached faster than `max_speed_kmh`.
///
/// The first position is always kept. Each later position is measured from
/// the last kept one, so a single spike does not take its neighbor with it.
pub fn filter_speed<'a>(
    positions: Vec<&'a Position>,
    max_speed_kmh: f64,
) -> (Vec<&'a Position>, Vec<Outlier>) {
    let mut kept: Vec<&Position> = Vec::with_capacity(positions.len());
    let mut outliers = Vec::new();
    for position in positions {
        let speed = kept.last().and_then(|last| speed_kmh(last, position));
        match speed {
            Some(speed) if speed > max_speed_kmh => outliers.push(Outlier {
                position_id: position.id,
                reason: OutlierReason::SpeedTooHigh,
                value: speed,
            }),
            _ => kept.push(position),
        }
    }
    (kept, outliers)
}

/// Centered moving average. Shorter inputs than `window` come back as is.
pub fn smooth(points: &[LatLng], window: usize) -> Vec<LatLng> {
    if window < 2 || points.len() < window {
        return points.to_vec();
    }
    let half = window / 2;
    (0..points.len())
        .map(|i| {
            let slice = &points[i.saturating_sub(half)..(i + half + 1).min(points.len())];
            let n = slice.len() as f64;
            LatLng::new(
                slice.iter().map(|p| p.lat).sum::<f64>() / n,
                slice.iter().map(|p| p.lng).sum::<f64>() / n,
            )
        })
        .collect()
}

/// Run the full cleanup over one track's positions.
pub fn clean_track(positions: &[Position], settings: FilterSettings) -> FilteredTrack {
    let (after_accuracy, mut outliers) = filter_accuracy(positions, settings.max_accuracy_m);
    let removed_by_accuracy = outliers.len();
    let (kept, speed_outliers) = filter_speed(after_accuracy, settings.max_speed_kmh);
    let removed_by_speed = speed_outliers.len();
    outliers.extend(speed_outliers);
    outliers.sort_by_key(|o| o.position_id);

    let raw: Vec<LatLng> = kept.iter().map(|p| p.effective_position()).collect();
    let smoothed = smooth(&raw, settings.smooth_window);
    let points = kept
        .iter()
        .zip(raw)
        .zip(smoothed)
        .map(|((p, position), smoothed)| CleanPoint {
            position_id: p.id,
            position,
            smoothed,
            timestamp: p.timestamp,
        })
        .collect::<Vec<_>>();

    let original_count = positions.len();
    let stats = FilterStats {
        original_count,
        after_filtering: points.len(),
        removed_by_accuracy,
        removed_by_speed,
        retention_rate: if original_count == 0 {
            0.0
        } else {
            points.len() as f64 / original_count as f64
        },
    };
    tracing::debug!(
        kept = stats.after_filtering,
        removed_by_accuracy,
        removed_by_speed,
        "Cleaned track positions"
    );
    FilteredTrack {
        points,
        outliers,
        stats,
    }
}
