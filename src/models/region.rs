// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Containment regions (geofences) and their shapes.

use crate::error::Result;
use crate::geometry;
use crate::models::LatLng;
use serde::{Deserialize, Serialize};

/// A named containment region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: u64,
    pub name: Option<String>,
    /// Boundary shape (circle or polygon)
    #[serde(rename = "geofence")]
    pub shape: RegionShape,
}

/// Region boundary - either a circle or a simple polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegionShape {
    Circle { center: LatLng, radius_m: f64 },
    /// Implicitly closed; the last vertex connects back to the first.
    Polygon { vertices: Vec<LatLng> },
}

impl Region {
    /// Human-readable name for events.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Region {}", self.id),
        }
    }

    /// Check if a point lies inside (or on the boundary of) this region.
    pub fn contains(&self, point: LatLng) -> Result<bool> {
        match &self.shape {
            RegionShape::Circle { center, radius_m } => {
                geometry::contains_circle(point, *center, *radius_m)
            }
            RegionShape::Polygon { vertices } => geometry::contains_polygon(point, vertices),
        }
    }
}
