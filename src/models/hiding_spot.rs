// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hiding spot model.

use crate::models::{LatLng, TrackId};
use serde::{Deserialize, Serialize};

/// A point of interest laid out along a human track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HidingSpot {
    /// Remote store id
    pub id: u64,
    /// Owning human track
    pub track_id: TrackId,
    pub position: LatLng,
    pub name: String,
    /// `None` until the dog session resolves it
    pub found: Option<bool>,
}

impl HidingSpot {
    pub fn is_unresolved(&self) -> bool {
        self.found.is_none()
    }
}
