// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the engine.

pub mod event;
pub mod hiding_spot;
pub mod position;
pub mod queue;
pub mod region;
pub mod track;

pub use event::EngineEvent;
pub use hiding_spot::HidingSpot;
pub use position::{Correction, LatLng, Position, Sample, VerifiedStatus};
pub use queue::{DrainReport, QueueEntry};
pub use region::{Region, RegionShape};
pub use track::{SessionMarker, Track, TrackDetail, TrackId, TrackType};
