// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! How closely a dog followed the human track it was trailing.
//!
//! Both tracks are cleaned first (see [`filter`](crate::services::filter)).
//! The human track is the reference: every human point is matched to the
//! nearest dog point, and distances are mapped to a 0-100 similarity. The
//! segment view splits both tracks where the heading turns, so a dog that
//! lagged behind but took the same route still scores well.

use crate::error::{AppError, Result};
use crate::geometry;
use crate::models::{LatLng, TrackDetail, TrackId, TrackType};
use crate::services::filter::{clean_track, FilterSettings, FilterStats};
use crate::services::proximity::nearest;
use crate::services::recorder::TrackRecorder;
use serde::Serialize;

/// Heading change that starts a new segment.
pub const ANGLE_THRESHOLD_DEG: f64 = 30.0;

/// Distances beyond this count as this far.
pub const MAX_MATCH_DISTANCE_M: f64 = 200.0;

const MIN_POINTS_PER_SEGMENT: usize = 3;

/// A run of points with a roughly constant heading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start_index: usize,
    /// Inclusive; a corner point ends one segment and starts the next
    pub end_index: usize,
    pub point_count: usize,
    pub length_m: f64,
    pub centroid: LatLng,
    pub avg_bearing_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointComparison {
    pub average_m: f64,
    pub max_m: f64,
    pub match_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentMatch {
    pub human_segment_index: usize,
    pub dog_segment_index: Option<usize>,
    pub avg_distance_m: f64,
    pub max_distance_m: f64,
    pub similarity: f64,
    pub point_count: usize,
    pub human_segment_length_m: f64,
    pub centroid_distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentComparison {
    /// Similarity averaged over human points
    pub overall_similarity: f64,
    pub human_segments: usize,
    pub dog_segments: usize,
    pub matches: Vec<SegmentMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackComparison {
    pub human_track_id: TrackId,
    pub dog_track_id: TrackId,
    pub points: PointComparison,
    pub segments: SegmentComparison,
    pub human_filter: FilterStats,
    pub dog_filter: FilterStats,
}

/// Initial compass bearing from `a` to `b`, in degrees 0-360.
pub fn bearing(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();
    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

fn angle_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff <= 180.0 {
        diff
    } else {
        360.0 - diff
    }
}

/// Circular mean, so headings either side of north average to north.
fn mean_bearing(bearings: &[f64]) -> Option<f64> {
    if bearings.is_empty() {
        return None;
    }
    let (sin, cos) = bearings.iter().fold((0.0, 0.0), |(s, c), b| {
        let r = b.to_radians();
        (s + r.sin(), c + r.cos())
    });
    Some(sin.atan2(cos).to_degrees().rem_euclid(360.0))
}

fn build_segment(index: usize, points: &[LatLng], start: usize, end: usize) -> Segment {
    let slice = &points[start..=end];
    let n = slice.len() as f64;
    let centroid = LatLng::new(
        slice.iter().map(|p| p.lat).sum::<f64>() / n,
        slice.iter().map(|p| p.lng).sum::<f64>() / n,
    );
    let length_m = slice.windows(2).map(|w| geometry::distance(w[0], w[1])).sum();
    let bearings: Vec<f64> = slice.windows(2).map(|w| bearing(w[0], w[1])).collect();
    Segment {
        index,
        start_index: start,
        end_index: end,
        point_count: slice.len(),
        length_m,
        centroid,
        avg_bearing_deg: mean_bearing(&bearings),
    }
}

/// Split a track where its heading turns by more than `angle_threshold_deg`.
///
/// A segment is only closed once it spans at least three points.
pub fn split_into_segments(points: &[LatLng], angle_threshold_deg: f64) -> Vec<Segment> {
    match points.len() {
        0 => return Vec::new(),
        1 => return vec![build_segment(0, points, 0, 0)],
        _ => {}
    }

    let mut segments = Vec::new();
    let mut start = 0;
    let mut bearings = vec![bearing(points[0], points[1])];
    for i in 2..points.len() {
        let heading = bearing(points[i - 1], points[i]);
        let turned = mean_bearing(&bearings)
            .is_some_and(|avg| angle_difference(avg, heading) > angle_threshold_deg);
        if turned && i - start >= MIN_POINTS_PER_SEGMENT {
            segments.push(build_segment(segments.len(), points, start, i - 1));
            start = i - 1;
            bearings = vec![heading];
        } else {
            bearings.push(heading);
        }
    }
    segments.push(build_segment(segments.len(), points, start, points.len() - 1));
    segments
}

/// Map an average distance to a 0-100 score.
///
/// 0-10 m scores 100-80, 10-50 m scores 80-20, 50-100 m scores 20-0.
pub fn similarity_score(distance_m: f64) -> f64 {
    let score = if distance_m <= 10.0 {
        100.0 - distance_m * 2.0
    } else if distance_m <= 50.0 {
        80.0 - (distance_m - 10.0) * 1.5
    } else if distance_m <= 100.0 {
        20.0 - (distance_m - 50.0) * 0.4
    } else {
        0.0
    };
    score.clamp(0.0, 100.0)
}

/// Distance from `point` to the closest dog point, capped at `cap_m`.
fn capped_distance(point: LatLng, dog: &[LatLng], cap_m: f64) -> f64 {
    nearest(point, dog, f64::INFINITY, |p| *p).map_or(cap_m, |m| m.distance_m.min(cap_m))
}

/// Point-by-point comparison of a dog track against the human track.
pub fn compare_points(human: &[LatLng], dog: &[LatLng], max_match_m: f64) -> PointComparison {
    if human.is_empty() || dog.is_empty() {
        return PointComparison {
            average_m: 0.0,
            max_m: 0.0,
            match_percentage: 0.0,
        };
    }
    let distances: Vec<f64> = human
        .iter()
        .map(|&p| capped_distance(p, dog, max_match_m))
        .collect();
    let average_m = distances.iter().sum::<f64>() / distances.len() as f64;
    PointComparison {
        average_m,
        max_m: distances.iter().copied().fold(0.0, f64::max),
        match_percentage: similarity_score(average_m),
    }
}

/// Segment-by-segment comparison with the human track as reference.
pub fn compare_segments(
    human: &[LatLng],
    dog: &[LatLng],
    angle_threshold_deg: f64,
    max_match_m: f64,
) -> SegmentComparison {
    if human.is_empty() || dog.is_empty() {
        return SegmentComparison {
            overall_similarity: 0.0,
            human_segments: 0,
            dog_segments: 0,
            matches: Vec::new(),
        };
    }

    let human_segments = split_into_segments(human, angle_threshold_deg);
    let dog_segments = split_into_segments(dog, angle_threshold_deg);

    let mut weighted = 0.0;
    let mut total_points = 0;
    let matches: Vec<SegmentMatch> = human_segments
        .iter()
        .map(|segment| {
            let distances: Vec<f64> = human[segment.start_index..=segment.end_index]
                .iter()
                .map(|&p| capped_distance(p, dog, max_match_m))
                .collect();
            let avg = distances.iter().sum::<f64>() / distances.len() as f64;
            let similarity = similarity_score(avg);
            weighted += similarity * segment.point_count as f64;
            total_points += segment.point_count;

            let closest = nearest(segment.centroid, &dog_segments, f64::INFINITY, |s| s.centroid);
            SegmentMatch {
                human_segment_index: segment.index,
                dog_segment_index: closest.as_ref().map(|m| m.candidate.index),
                avg_distance_m: avg,
                max_distance_m: distances.iter().copied().fold(0.0, f64::max),
                similarity,
                point_count: segment.point_count,
                human_segment_length_m: segment.length_m,
                centroid_distance_m: closest.map(|m| m.distance_m),
            }
        })
        .collect();

    SegmentComparison {
        overall_similarity: if total_points == 0 {
            0.0
        } else {
            weighted / total_points as f64
        },
        human_segments: human_segments.len(),
        dog_segments: dog_segments.len(),
        matches,
    }
}

/// Clean both tracks and compare them.
pub fn compare_details(human: &TrackDetail, dog: &TrackDetail) -> TrackComparison {
    let human_clean = clean_track(&human.positions, FilterSettings::for_track(TrackType::Human));
    let dog_clean = clean_track(&dog.positions, FilterSettings::for_track(TrackType::Dog));
    let (h, d) = (human_clean.smoothed(), dog_clean.smoothed());
    TrackComparison {
        human_track_id: human.track.id,
        dog_track_id: dog.track.id,
        points: compare_points(&h, &d, MAX_MATCH_DISTANCE_M),
        segments: compare_segments(&h, &d, ANGLE_THRESHOLD_DEG, MAX_MATCH_DISTANCE_M),
        human_filter: human_clean.stats,
        dog_filter: dog_clean.stats,
    }
}

impl TrackRecorder {
    /// Compare a human track and a dog track chosen by the caller.
    pub async fn compare_tracks(&self, human_id: TrackId, dog_id: TrackId) -> Result<TrackComparison> {
        let human = self.track_detail(human_id).await?;
        let dog = self.track_detail(dog_id).await?;
        if human.track.track_type != TrackType::Human {
            return Err(AppError::BadRequest(format!("track {} is not a human track", human_id)));
        }
        if dog.track.track_type != TrackType::Dog {
            return Err(AppError::BadRequest(format!("track {} is not a dog track", dog_id)));
        }
        let comparison = compare_details(&human, &dog);
        tracing::info!(
            human_track_id = %human_id,
            dog_track_id = %dog_id,
            similarity = comparison.segments.overall_similarity,
            "Compared tracks"
        );
        Ok(comparison)
    }

    /// Compare a dog track against the human track it was following.
    pub async fn compare_with_reference(&self, dog_id: TrackId) -> Result<TrackComparison> {
        let dog = self.track_detail(dog_id).await?;
        let reference = dog.track.reference_track_id.ok_or_else(|| {
            AppError::BadRequest(format!("track {} has no reference track", dog_id))
        })?;
        self.compare_tracks(reference, dog_id).await
    }
}
