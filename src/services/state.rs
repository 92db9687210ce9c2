// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Engine state shared by the recorder and the sync reconciler.
//!
//! All of it sits behind one mutex that is never held across an `.await`.

use crate::db::LocalStore;
use crate::error::{ErrorClass, Result};
use crate::models::{HidingSpot, LatLng, SessionMarker, TrackId, TrackType};
use crate::services::evaluator::EvaluationState;
use crate::services::regions::RegionService;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The capture session in progress.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub marker: SessionMarker,
    /// Hiding spots of the reference track (dog sessions only)
    pub spots: Vec<HidingSpot>,
    pub last_position: Option<LatLng>,
}

impl ActiveSession {
    pub fn new(marker: SessionMarker) -> Self {
        Self {
            marker,
            spots: Vec::new(),
            last_position: None,
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.marker.track_id
    }

    pub fn is_dog(&self) -> bool {
        self.marker.track_type == TrackType::Dog
    }
}

pub struct EngineState {
    pub store: LocalStore,
    pub session: Option<ActiveSession>,
    pub evaluation: EvaluationState,
    pub regions: RegionService,
    pub online: bool,
    pub last_error: Option<ErrorClass>,
    /// Set when local persistence failed; capture stays stopped until restart
    pub halted: Option<String>,
    /// A `start` is waiting on the remote store
    pub starting: bool,
}

impl EngineState {
    pub fn new(store: LocalStore, regions: RegionService) -> Self {
        Self {
            store,
            session: None,
            evaluation: EvaluationState::default(),
            regions,
            online: false,
            last_error: None,
            halted: None,
            starting: false,
        }
    }

    /// Remap a track in the store and in the live session together.
    pub fn remap_track(&mut self, old: TrackId, new: TrackId, create_seq: Option<u64>) -> Result<()> {
        self.store.remap_track(old, new, create_seq)?;
        if let Some(session) = self.session.as_mut() {
            if session.marker.track_id == old {
                session.marker.track_id = new;
            }
            if session.marker.reference_track_id == Some(old) {
                session.marker.reference_track_id = Some(new);
            }
            for spot in &mut session.spots {
                if spot.track_id == old {
                    spot.track_id = new;
                }
            }
        }
        Ok(())
    }

    /// Flip connectivity, returning true if it changed.
    pub fn set_online(&mut self, online: bool) -> bool {
        let changed = self.online != online;
        self.online = online;
        changed
    }
}

pub fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
