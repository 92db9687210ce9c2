// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Nearest-candidate matching under a distance threshold.

use crate::geometry;
use crate::models::{HidingSpot, LatLng, Position};

/// Range for reporting a nearby unresolved hiding spot.
pub const HIDING_SPOT_RANGE_M: f64 = 20.0;

/// Default range for snapping a correction onto the reference track.
pub const SNAP_RANGE_M: f64 = 10.0;

/// A matched candidate and its distance from the query point.
#[derive(Debug)]
pub struct Match<'a, T> {
    pub candidate: &'a T,
    pub distance_m: f64,
}

/// Find the candidate closest to `point` strictly within `max_distance_m`.
///
/// Ties keep the first candidate seen. No match is a normal outcome.
pub fn nearest<'a, T, I, F>(
    point: LatLng,
    candidates: I,
    max_distance_m: f64,
    locate: F,
) -> Option<Match<'a, T>>
where
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> LatLng,
{
    let mut best: Option<Match<'a, T>> = None;
    for candidate in candidates {
        let d = geometry::distance(point, locate(candidate));
        if d >= max_distance_m {
            continue;
        }
        if best.as_ref().map_or(true, |b| d < b.distance_m) {
            best = Some(Match {
                candidate,
                distance_m: d,
            });
        }
    }
    best
}

/// Nearest hiding spot that has not been marked found or not-found.
pub fn nearest_unresolved_spot(
    point: LatLng,
    spots: &[HidingSpot],
    max_distance_m: f64,
) -> Option<Match<'_, HidingSpot>> {
    nearest(
        point,
        spots.iter().filter(|s| s.is_unresolved()),
        max_distance_m,
        |s| s.position,
    )
}

/// Replace `target` with the nearest reference-track point in range.
///
/// Reference positions are matched on their corrected coordinate when they
/// have one.
pub fn snap_to_track(target: LatLng, reference: &[Position], max_distance_m: f64) -> LatLng {
    nearest(target, reference, max_distance_m, Position::effective_position)
        .map(|m| m.candidate.effective_position())
        .unwrap_or(target)
}
