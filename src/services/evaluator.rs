// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Region evaluation and Enter/Exit diffing.
//!
//! `evaluate` is a pure function: the caller owns the `EvaluationState` and
//! threads it from one sample to the next. Event lists follow the input
//! region order so results are deterministic.

use crate::error::Result;
use crate::models::{EngineEvent, LatLng, Region};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Regions that contained the previous sample, in region order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationState {
    pub contained: Vec<u64>,
}

/// Result of evaluating one point.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub contained: Vec<u64>,
    pub entered: Vec<u64>,
    pub exited: Vec<u64>,
    pub state: EvaluationState,
}

/// Per-region containment, as returned by the evaluate API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionResult {
    #[serde(rename = "geofence_id")]
    pub region_id: u64,
    pub name: Option<String>,
    pub inside: bool,
}

/// Evaluate a point against every region and diff with the previous state.
///
/// A malformed region fails the whole call with `InvalidGeometry`; the
/// previous state is left untouched so the caller can keep using it.
pub fn evaluate(point: LatLng, regions: &[Region], previous: &EvaluationState) -> Result<Evaluation> {
    let mut contained = Vec::new();
    for region in regions {
        if region.contains(point)? {
            contained.push(region.id);
        }
    }

    let entered: Vec<u64> = contained
        .iter()
        .copied()
        .filter(|id| !previous.contained.contains(id))
        .collect();

    // Configured regions first, in input order; then ids that were contained
    // before but are no longer configured, in their previous order.
    let mut exited: Vec<u64> = regions
        .iter()
        .map(|r| r.id)
        .filter(|id| previous.contained.contains(id) && !contained.contains(id))
        .collect();
    exited.extend(
        previous
            .contained
            .iter()
            .copied()
            .filter(|id| !regions.iter().any(|r| r.id == *id)),
    );

    Ok(Evaluation {
        state: EvaluationState {
            contained: contained.clone(),
        },
        contained,
        entered,
        exited,
    })
}

/// Containment of a point in each region, without diffing.
pub fn evaluate_all(point: LatLng, regions: &[Region]) -> Result<Vec<RegionResult>> {
    regions
        .iter()
        .map(|region| {
            Ok(RegionResult {
                region_id: region.id,
                name: region.name.clone(),
                inside: region.contains(point)?,
            })
        })
        .collect()
}

impl Evaluation {
    /// Enter events followed by exit events, named for display.
    pub fn events(&self, regions: &[Region], at: DateTime<Utc>) -> Vec<EngineEvent> {
        let name_of = |id: u64| {
            regions
                .iter()
                .find(|r| r.id == id)
                .map(Region::display_name)
                .unwrap_or_else(|| format!("Region {}", id))
        };

        let entered = self.entered.iter().map(|&id| EngineEvent::RegionEntered {
            region_id: id,
            name: name_of(id),
            at,
        });
        let exited = self.exited.iter().map(|&id| EngineEvent::RegionExited {
            region_id: id,
            name: name_of(id),
            at,
        });
        entered.chain(exited).collect()
    }
}
