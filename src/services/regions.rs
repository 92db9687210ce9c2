// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Region loading service.
//!
//! Regions come from a GeoJSON file at startup, from the remote store on
//! refresh, or from the local cache when starting offline.

use crate::error::AppError;
use crate::geometry;
use crate::models::{LatLng, Region, RegionShape};
use geo::{Point, Polygon};
use geojson::GeoJson;
use std::fs;
use std::path::Path;

/// The configured region set, validated on construction.
#[derive(Debug, Default, Clone)]
pub struct RegionService {
    regions: Vec<Region>,
}

impl RegionService {
    /// Build from already-parsed regions, rejecting malformed shapes.
    pub fn from_regions(regions: Vec<Region>) -> Result<Self, RegionError> {
        for region in &regions {
            validate_region(region)?;
        }
        Ok(Self { regions })
    }

    /// Load regions from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegionError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| RegionError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load regions from a GeoJSON string.
    ///
    /// `Polygon` features become polygon regions; `Point` features with a
    /// numeric `radius_m` property become circles. Anything else is skipped.
    pub fn load_from_json(json_data: &str) -> Result<Self, RegionError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| RegionError::ParseError(e.to_string()))?;

        let mut regions = Vec::new();

        if let GeoJson::FeatureCollection(collection) = geojson {
            for (index, feature) in collection.features.into_iter().enumerate() {
                let name = feature
                    .property("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                let id = feature
                    .property("id")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(index as u64 + 1);

                let radius_m = feature.property("radius_m").and_then(|v| v.as_f64());

                let Some(geom) = feature.geometry else {
                    continue;
                };

                match Self::convert_geometry(geom.value, radius_m) {
                    Ok(shape) => regions.push(Region { id, name, shape }),
                    Err(RegionError::UnsupportedGeometry) => {
                        tracing::warn!(id, "Skipping region with unsupported geometry");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let service = Self::from_regions(regions)?;
        tracing::info!(count = service.regions.len(), "Loaded regions");
        Ok(service)
    }

    /// Convert GeoJSON geometry to a region shape.
    fn convert_geometry(
        value: geojson::Value,
        radius_m: Option<f64>,
    ) -> Result<RegionShape, RegionError> {
        use std::convert::TryInto;

        let poly_result: Result<Polygon<f64>, _> = value.clone().try_into();
        if let Ok(poly) = poly_result {
            let mut vertices: Vec<LatLng> =
                poly.exterior().coords().copied().map(LatLng::from).collect();
            // GeoJSON rings repeat the first vertex; our polygons close implicitly
            if vertices.len() > 1 && vertices.first() == vertices.last() {
                vertices.pop();
            }
            return Ok(RegionShape::Polygon { vertices });
        }

        let point_result: Result<Point<f64>, _> = value.try_into();
        if let (Ok(point), Some(radius_m)) = (point_result, radius_m) {
            return Ok(RegionShape::Circle {
                center: LatLng::from(point.0),
                radius_m,
            });
        }

        Err(RegionError::UnsupportedGeometry)
    }

    /// Get the list of regions, in configuration order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn validate_region(region: &Region) -> Result<(), RegionError> {
    let check = match &region.shape {
        RegionShape::Circle { center, radius_m } => {
            if !center.is_valid() {
                Err(AppError::InvalidGeometry(format!(
                    "circle center out of range: {}, {}",
                    center.lat, center.lng
                )))
            } else {
                geometry::contains_circle(*center, *center, *radius_m).map(|_| ())
            }
        }
        RegionShape::Polygon { vertices } => geometry::validate_polygon(vertices),
    };
    check.map_err(|e| RegionError::InvalidRegion {
        id: region.id,
        reason: e.to_string(),
    })
}

/// Errors from region operations.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Unsupported geometry type (expected Polygon, or Point with radius_m)")]
    UnsupportedGeometry,

    #[error("Region {id} is invalid: {reason}")]
    InvalidRegion { id: u64, reason: String },
}

impl From<RegionError> for AppError {
    fn from(err: RegionError) -> Self {
        match err {
            RegionError::IoError(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            other => AppError::InvalidGeometry(other.to_string()),
        }
    }
}
