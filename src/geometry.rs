// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geometry kernel: great-circle distance and point containment.
//!
//! All functions are pure. Polygons are tested in planar lng/lat space
//! with `geo`, which is accurate enough for regions up to a few kilometers
//! across.
//!
//! Boundary policy: both circles and polygons are **inclusive**. A point
//! exactly on a circle's radius, on a polygon edge, or on a polygon vertex
//! is inside.
//!
//! Self-intersecting polygons are not repaired. Their interior is whatever
//! `geo` computes for an invalid polygon, which is undefined for the caller.

use crate::error::{AppError, Result};
use crate::models::LatLng;
use geo::{Intersects, LineString, Point, Polygon};

/// Mean earth radius used for all distances (spherical model).
///
/// `geo::Haversine` uses the IUGG mean radius (6,371,008.8 m), so distances
/// are computed here instead.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance in meters.
pub fn distance(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Point-in-circle test, inclusive of the radius.
pub fn contains_circle(point: LatLng, center: LatLng, radius_m: f64) -> Result<bool> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err(AppError::InvalidGeometry(format!(
            "circle radius must be positive, got {}",
            radius_m
        )));
    }
    Ok(distance(point, center) <= radius_m)
}

/// Point-in-polygon test, inclusive of edges and vertices.
pub fn contains_polygon(point: LatLng, vertices: &[LatLng]) -> Result<bool> {
    validate_polygon(vertices)?;
    Ok(to_polygon(vertices).intersects(&Point::from(geo::Coord::from(point))))
}

/// Build a `geo` polygon from an implicitly closed vertex list.
pub fn to_polygon(vertices: &[LatLng]) -> Polygon<f64> {
    let ring: Vec<geo::Coord<f64>> = vertices.iter().copied().map(Into::into).collect();
    // LineString is closed by Polygon::new
    Polygon::new(LineString::from(ring), vec![])
}

/// Reject polygons the kernel cannot evaluate.
pub fn validate_polygon(vertices: &[LatLng]) -> Result<()> {
    if vertices.len() < 3 {
        return Err(AppError::InvalidGeometry(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }
    if let Some(bad) = vertices.iter().find(|v| !v.is_valid()) {
        return Err(AppError::InvalidGeometry(format!(
            "polygon vertex out of range: {}, {}",
            bad.lat, bad.lng
        )));
    }
    Ok(())
}
