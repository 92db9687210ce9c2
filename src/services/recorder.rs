// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track recorder: the capture session state machine.
//!
//! Samples are processed one at a time under the engine lock. Each sample is
//! appended to the local log and queued for delivery in a single atomic
//! write, then checked against hiding spots and regions. Delivery happens
//! on the dispatcher task, which drains the queue as soon as the remote
//! store is reachable, so capture never waits on the network.

use crate::db::LocalStore;
use crate::error::{AppError, ErrorClass, Result};
use crate::models::{
    EngineEvent, HidingSpot, LatLng, Position, Region, Sample, SessionMarker, Track, TrackDetail,
    TrackId, TrackType, VerifiedStatus,
};
use crate::services::correction::CorrectionPredictor;
use crate::services::evaluator::{self, EvaluationState, RegionResult};
use crate::services::events::EventBus;
use crate::services::proximity;
use crate::services::regions::RegionService;
use crate::services::remote::{NewTrack, RemoteStore, RemoteTrack};
use crate::services::state::{lock, ActiveSession, EngineState};
use crate::services::sync::SyncReconciler;
use crate::time_utils::{clock_id, default_track_name, parse_remote_timestamp};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// Tunables for a recorder.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// Default snapping range for corrections
    pub snap_m: f64,
    /// Region events kept for the status view
    pub event_history: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            snap_m: proximity::SNAP_RANGE_M,
            event_history: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
    Halted,
}

/// Snapshot of the engine for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub track_id: Option<TrackId>,
    pub track_type: Option<TrackType>,
    pub reference_track_id: Option<TrackId>,
    pub online: bool,
    pub draining: bool,
    pub pending: usize,
    pub contained: Vec<u64>,
    pub region_count: usize,
    pub last_error: Option<ErrorClass>,
    pub halted_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestSpot {
    pub spot: HidingSpot,
    pub distance_m: f64,
}

/// What happened to one sample.
#[derive(Debug, Clone, Serialize)]
pub struct SampleOutcome {
    pub position: Position,
    pub entered: Vec<u64>,
    pub exited: Vec<u64>,
    pub contained: Vec<u64>,
    pub nearest_spot: Option<NearestSpot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpotUpdate {
    pub spot: HidingSpot,
    /// Whether the remote store accepted the change
    pub synced: bool,
}

pub struct TrackRecorder {
    state: Mutex<EngineState>,
    remote: Arc<dyn RemoteStore>,
    reconciler: SyncReconciler,
    events: EventBus,
    wake: Notify,
    settings: RecorderSettings,
    predictor: Option<Arc<dyn CorrectionPredictor>>,
}

impl TrackRecorder {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        regions: RegionService,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::new(store, regions)),
            remote,
            reconciler: SyncReconciler::new(),
            events: EventBus::new(settings.event_history),
            wake: Notify::new(),
            settings,
            predictor: None,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn CorrectionPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }

    pub(crate) fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub(crate) fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub(crate) fn predictor(&self) -> Option<&Arc<dyn CorrectionPredictor>> {
        self.predictor.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Most recent region events, newest first.
    pub fn recent_events(&self) -> Vec<EngineEvent> {
        self.events.recent()
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Begin a capture session.
    ///
    /// When the remote store is reachable the track is created there first
    /// and recorded under its server id. Otherwise (or on a transient
    /// failure, or when the reference track has no server id yet) the track
    /// gets a clock-derived local id and its creation is queued.
    pub async fn start(
        &self,
        track_type: TrackType,
        reference: Option<TrackId>,
        name: Option<String>,
    ) -> Result<Track> {
        if track_type == TrackType::Human && reference.is_some() {
            return Err(AppError::BadRequest(
                "only dog tracks follow a reference track".to_string(),
            ));
        }

        let online = {
            let mut st = self.lock();
            if let Some(reason) = &st.halted {
                return Err(AppError::LocalStoreCorruption(reason.clone()));
            }
            if st.session.is_some() || st.starting {
                return Err(AppError::AlreadyRecording);
            }
            if let Some(reference) = reference.filter(TrackId::is_local) {
                if !st.store.log().contains_track(reference)? {
                    return Err(AppError::NotFound(format!("track {}", reference)));
                }
            }
            st.starting = true;
            st.online
        };

        let result = self.start_session(track_type, reference, name, online).await;
        self.lock().starting = false;
        let track = result?;

        tracing::info!(track_id = %track.id, track_type = ?track.track_type, "Recording started");
        self.events.emit(EngineEvent::RecordingStarted {
            track_id: track.id,
            at: track.created_at,
        });
        if track.id.is_local() {
            self.wake.notify_one();
        }
        Ok(track)
    }

    async fn start_session(
        &self,
        track_type: TrackType,
        reference: Option<TrackId>,
        name: Option<String>,
        online: bool,
    ) -> Result<Track> {
        let now = Utc::now();
        let name = name.unwrap_or_else(|| default_track_name(track_type.label(), now));

        // A dog track whose reference is still local is queued behind the
        // reference's create so the reconciler can link it after the remap
        let pending_reference = reference.filter(TrackId::is_local);
        if online {
            if let Some(reference) = pending_reference {
                tracing::debug!(reference = %reference, "Reference track not synced, queueing create");
            }
        }

        let created = if online && pending_reference.is_none() {
            let request = NewTrack {
                track_type,
                name: Some(name.clone()),
                human_track_id: reference.and_then(|r| r.remote()),
            };
            match self.remote.create_track(&request).await {
                Ok(created) => Some(created),
                Err(err) if err.is_transient() => {
                    self.note_remote_error(&err);
                    None
                }
                Err(err) => {
                    self.note_remote_error(&err);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let fetched_spots = match reference {
            Some(reference) if track_type == TrackType::Dog => self.fetch_spots(reference).await,
            _ => None,
        };

        let mut guard = self.lock();
        let st = &mut *guard;
        let track = match created {
            Some(created) => {
                let track = Track {
                    id: TrackId::Remote(created.id),
                    track_type,
                    name: created.name.unwrap_or(name),
                    created_at: parse_remote_timestamp(&created.created_at).unwrap_or(now),
                    reference_track_id: reference,
                    synced_positions: 0,
                };
                st.store.log().create_track(&track)?;
                track
            }
            None => {
                let mut id = clock_id(now);
                while st.store.log().contains_track(TrackId::Local(id))? {
                    id += 1;
                }
                let track = Track {
                    id: TrackId::Local(id),
                    track_type,
                    name,
                    created_at: now,
                    reference_track_id: reference,
                    synced_positions: 0,
                };
                st.store.create_local_track(&track)?;
                track
            }
        };

        let marker = SessionMarker {
            track_id: track.id,
            track_type,
            reference_track_id: reference,
            started_at: now,
        };
        st.store.log().set_session(&marker)?;

        let mut session = ActiveSession::new(marker);
        if let Some(reference) = reference {
            session.spots = match fetched_spots {
                Some(spots) => {
                    st.store.log().cache_spots(reference, &spots)?;
                    spots
                }
                None => st.store.log().cached_spots(reference)?.unwrap_or_default(),
            };
        }
        st.session = Some(session);
        st.evaluation = EvaluationState::default();
        Ok(track)
    }

    /// Process one sample from the coordinate stream.
    pub fn record(&self, sample: Sample) -> Result<SampleOutcome> {
        if !sample.position.is_valid() {
            return Err(AppError::BadRequest(format!(
                "coordinate out of range: {}, {}",
                sample.position.lat, sample.position.lng
            )));
        }

        let (outcome, events, online) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if let Some(reason) = &st.halted {
                return Err(AppError::LocalStoreCorruption(reason.clone()));
            }
            let Some(session) = st.session.as_mut() else {
                return Err(AppError::NotRecording);
            };
            let track_id = session.track_id();

            let position = match st.store.append_and_enqueue(track_id, &sample) {
                Ok(position) => position,
                Err(err) => {
                    if err.is_fatal_to_session() {
                        let event = halt(st, &err);
                        drop(guard);
                        self.events.emit(event);
                    } else {
                        tracing::warn!(track_id = %track_id, error = %err, "Sample rejected");
                    }
                    return Err(err);
                }
            };
            session.last_position = Some(sample.position);

            let mut events = Vec::new();
            let nearest_spot = if session.is_dog() {
                let nearest = proximity::nearest_unresolved_spot(
                    sample.position,
                    &session.spots,
                    proximity::HIDING_SPOT_RANGE_M,
                )
                .map(|m| NearestSpot {
                    spot: m.candidate.clone(),
                    distance_m: m.distance_m,
                });
                events.push(EngineEvent::NearestHidingSpot {
                    spot: nearest.as_ref().map(|n| n.spot.clone()),
                    distance_m: nearest.as_ref().map(|n| n.distance_m),
                    at: sample.timestamp,
                });
                nearest
            } else {
                None
            };

            let regions = st.regions.regions();
            let (entered, exited) = match evaluator::evaluate(sample.position, regions, &st.evaluation) {
                Ok(evaluation) => {
                    events.extend(evaluation.events(regions, sample.timestamp));
                    st.evaluation = evaluation.state;
                    (evaluation.entered, evaluation.exited)
                }
                Err(err) => {
                    // Keep the previous containment so the next good sample diffs correctly
                    tracing::warn!(error = %err, "Region evaluation failed");
                    st.last_error = Some(err.class());
                    (Vec::new(), Vec::new())
                }
            };

            let outcome = SampleOutcome {
                position,
                entered,
                exited,
                contained: st.evaluation.contained.clone(),
                nearest_spot,
            };
            (outcome, events, st.online)
        };

        self.events.emit_all(events);
        if online {
            self.wake.notify_one();
        }
        Ok(outcome)
    }

    /// End the capture session and trigger a best-effort flush.
    pub fn stop(&self) -> Result<Track> {
        let (track, online) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let Some(session) = st.session.take() else {
                return Err(AppError::NotRecording);
            };
            if let Err(err) = st.store.log().clear_session() {
                st.session = Some(session);
                return Err(err);
            }
            st.evaluation = EvaluationState::default();
            let track = st
                .store
                .log()
                .get_track(session.track_id())?
                .ok_or_else(|| {
                    AppError::LocalStoreCorruption(format!(
                        "track {} missing from log",
                        session.track_id()
                    ))
                })?;
            (track, st.online)
        };

        tracing::info!(track_id = %track.id, "Recording stopped");
        self.events.emit(EngineEvent::RecordingStopped {
            track_id: track.id,
            at: Utc::now(),
        });
        if online {
            self.wake.notify_one();
        }
        Ok(track)
    }

    /// Resume a session interrupted by a crash, if the log shows one.
    ///
    /// Containment is re-derived from the last logged position without
    /// emitting events, so the next sample only reports real transitions.
    pub fn recover(&self) -> Result<Option<TrackId>> {
        let track_id = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if let Some(session) = &st.session {
                return Ok(Some(session.track_id()));
            }
            let Some(marker) = st.store.log().session()? else {
                return Ok(None);
            };
            if st.store.log().get_track(marker.track_id)?.is_none() {
                tracing::warn!(track_id = %marker.track_id, "Session marker points at a missing track, discarding");
                st.store.log().clear_session()?;
                return Ok(None);
            }

            let last = st.store.log().last_position(marker.track_id)?;
            st.evaluation = match &last {
                Some(position) => evaluator::evaluate(
                    position.position,
                    st.regions.regions(),
                    &EvaluationState::default(),
                )
                .map(|evaluation| evaluation.state)
                .unwrap_or_default(),
                None => EvaluationState::default(),
            };

            let mut session = ActiveSession::new(marker);
            session.last_position = last.map(|p| p.position);
            if let Some(reference) = session.marker.reference_track_id {
                session.spots = st.store.log().cached_spots(reference)?.unwrap_or_default();
            }
            let track_id = session.track_id();
            st.session = Some(session);
            track_id
        };

        tracing::info!(track_id = %track_id, "Recovered recording session");
        self.events.emit(EngineEvent::RecordingStarted {
            track_id,
            at: Utc::now(),
        });
        Ok(Some(track_id))
    }

    /// Record a connectivity change. Coming online triggers a drain.
    pub fn set_connectivity(&self, online: bool) {
        let changed = self.lock().set_online(online);
        if changed {
            tracing::info!(online, "Connectivity changed");
            self.events
                .emit(EngineEvent::ConnectivityChanged { online });
            if online {
                self.wake.notify_one();
            }
        }
    }

    /// Drain the offline queue now.
    ///
    /// Returns `None` if offline or if another drain is already running.
    pub async fn flush_now(&self) -> Result<Option<crate::models::DrainReport>> {
        match self
            .reconciler
            .drain(&self.state, self.remote.as_ref(), &self.events)
            .await
        {
            Ok(report) => Ok(report),
            Err(err) => {
                if err.is_fatal_to_session() {
                    let event = halt(&mut self.lock(), &err);
                    self.events.emit(event);
                }
                Err(err)
            }
        }
    }

    /// Pull regions and hiding spots from the remote store into the cache.
    pub async fn refresh(&self) -> Result<()> {
        if !self.is_online() {
            return Ok(());
        }

        match self.remote.list_regions().await {
            Ok(regions) => match RegionService::from_regions(regions) {
                Ok(service) => {
                    let mut st = self.lock();
                    st.store.log().cache_regions(service.regions())?;
                    st.regions = service;
                }
                Err(err) => tracing::warn!(error = %err, "Ignoring invalid remote regions"),
            },
            Err(err) => {
                self.note_remote_error(&err);
                return Ok(());
            }
        }

        let reference = self
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.marker.reference_track_id);
        if let Some(reference) = reference {
            if let Some(spots) = self.fetch_spots(reference).await {
                let mut guard = self.lock();
                let st = &mut *guard;
                st.store.log().cache_spots(reference, &spots)?;
                if let Some(session) = st.session.as_mut() {
                    if session.marker.reference_track_id == Some(reference) {
                        session.spots = spots;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn status(&self) -> Result<RecorderStatus> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let state = match (&st.halted, &st.session) {
            (Some(_), _) => RecorderState::Halted,
            (None, Some(_)) => RecorderState::Recording,
            (None, None) => RecorderState::Idle,
        };
        let marker = st.session.as_ref().map(|s| &s.marker);
        Ok(RecorderStatus {
            state,
            track_id: marker.map(|m| m.track_id),
            track_type: marker.map(|m| m.track_type),
            reference_track_id: marker.and_then(|m| m.reference_track_id),
            online: st.online,
            draining: self.reconciler.is_draining(),
            pending: st.store.queue().len()?,
            contained: st.evaluation.contained.clone(),
            region_count: st.regions.regions().len(),
            last_error: st.last_error,
            halted_reason: st.halted.clone(),
        })
    }

    pub fn regions(&self) -> Vec<Region> {
        self.lock().regions.regions().to_vec()
    }

    /// Containment of a point in every configured region.
    pub fn evaluate_local(&self, point: LatLng) -> Result<Vec<RegionResult>> {
        evaluator::evaluate_all(point, self.lock().regions.regions())
    }

    /// Ask the remote store to evaluate a point.
    pub async fn evaluate_remote(&self, point: LatLng) -> Result<Vec<RegionResult>> {
        self.remote.evaluate(point).await.inspect_err(|err| {
            self.note_remote_error(err);
        })
    }

    /// Local tracks, plus remote ones not yet seen here when asked.
    pub async fn list_tracks(&self, include_remote: bool) -> Result<Vec<Track>> {
        let mut tracks = self.lock().store.log().list_tracks()?;
        if include_remote && self.is_online() {
            match self.remote.list_tracks().await {
                Ok(remote) => {
                    for rt in remote {
                        if !tracks.iter().any(|t| t.id == TrackId::Remote(rt.id)) {
                            tracks.push(track_from_remote(&rt));
                        }
                    }
                    tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                }
                Err(err) => self.note_remote_error(&err),
            }
        }
        Ok(tracks)
    }

    /// A track with its positions. The local log answers first.
    pub async fn track_detail(&self, id: TrackId) -> Result<TrackDetail> {
        if let Some(detail) = self.lock().store.log().detail(id)? {
            return Ok(detail);
        }
        let Some(remote_id) = id.remote() else {
            return Err(AppError::NotFound(format!("track {}", id)));
        };
        if !self.is_online() {
            return Err(AppError::NotFound(format!("track {}", id)));
        }
        let rt = self.remote.fetch_track(remote_id).await.inspect_err(|err| {
            self.note_remote_error(err);
        })?;
        let track = track_from_remote(&rt);
        let positions = rt
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| Position {
                id: i as u64,
                track_id: id,
                position: p.position,
                accuracy: p.accuracy,
                timestamp: parse_remote_timestamp(&p.timestamp).unwrap_or(track.created_at),
                corrected_position: None,
                verified_status: VerifiedStatus::Pending,
                annotation_notes: None,
                remote_id: p.id,
            })
            .collect();
        Ok(TrackDetail { track, positions })
    }

    /// Mark a hiding spot of the reference track as found or not found.
    ///
    /// The local cache changes first so proximity stops reporting the spot
    /// immediately; the remote write is best effort.
    pub async fn mark_spot_found(&self, spot_id: u64, found: Option<bool>) -> Result<SpotUpdate> {
        let (reference, spot, online) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let Some(session) = st.session.as_mut() else {
                return Err(AppError::NotRecording);
            };
            let Some(reference) = session.marker.reference_track_id else {
                return Err(AppError::BadRequest(
                    "session has no reference track".to_string(),
                ));
            };
            let Some(spot) = session.spots.iter_mut().find(|s| s.id == spot_id) else {
                return Err(AppError::NotFound(format!("hiding spot {}", spot_id)));
            };
            spot.found = found;
            let spot = spot.clone();
            st.store.log().cache_spots(reference, &session.spots)?;
            (reference, spot, st.online)
        };

        let synced = match reference.remote() {
            Some(track_id) if online => {
                match self.remote.update_hiding_spot(track_id, spot_id, found).await {
                    Ok(_) => true,
                    Err(err) => {
                        self.note_remote_error(&err);
                        false
                    }
                }
            }
            _ => false,
        };
        Ok(SpotUpdate { spot, synced })
    }

    /// Lay out a hiding spot at the current position of a human session.
    pub async fn add_hiding_spot(&self, name: Option<String>) -> Result<HidingSpot> {
        let (track_id, position, count) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let Some(session) = st.session.as_ref() else {
                return Err(AppError::NotRecording);
            };
            if session.is_dog() {
                return Err(AppError::BadRequest(
                    "hiding spots are laid out on human tracks".to_string(),
                ));
            }
            let Some(position) = session.last_position else {
                return Err(AppError::BadRequest("no position recorded yet".to_string()));
            };
            let track_id = session.track_id();
            let count = st
                .store
                .log()
                .cached_spots(track_id)?
                .map_or(0, |spots| spots.len());
            (track_id, position, count)
        };

        let Some(remote_id) = track_id.remote() else {
            return Err(AppError::TransientNetwork(format!(
                "track {} is not synced yet",
                track_id
            )));
        };
        let name = name.unwrap_or_else(|| format!("Spot {}", count + 1));
        let spot: HidingSpot = self
            .remote
            .create_hiding_spot(remote_id, position, &name)
            .await
            .inspect_err(|err| self.note_remote_error(err))?
            .into();

        let mut st = self.lock();
        let mut spots = st.store.log().cached_spots(track_id)?.unwrap_or_default();
        spots.push(spot.clone());
        st.store.log().cache_spots(track_id, &spots)?;
        tracing::info!(track_id = %track_id, spot_id = spot.id, "Hiding spot added");
        Ok(spot)
    }

    /// Record a remote failure; transient ones flip connectivity down.
    pub(crate) fn note_remote_error(&self, err: &AppError) {
        let went_offline = {
            let mut st = self.lock();
            st.last_error = Some(err.class());
            err.is_transient() && st.set_online(false)
        };
        if went_offline {
            tracing::warn!(error = %err, "Remote store unreachable");
            self.events
                .emit(EngineEvent::ConnectivityChanged { online: false });
        }
    }

    async fn fetch_spots(&self, reference: TrackId) -> Option<Vec<HidingSpot>> {
        let track_id = reference.remote()?;
        if !self.is_online() {
            return None;
        }
        match self.remote.list_hiding_spots(track_id).await {
            Ok(spots) => Some(spots.into_iter().map(HidingSpot::from).collect()),
            Err(err) => {
                self.note_remote_error(&err);
                None
            }
        }
    }

    /// Run the dispatcher: drain on every wake-up and refresh periodically.
    pub fn spawn_dispatcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = recorder.wake.notified() => {}
                    _ = ticker.tick() => {
                        if let Err(err) = recorder.refresh().await {
                            tracing::warn!(error = %err, "Refresh failed");
                        }
                    }
                }
                if let Err(err) = recorder.flush_now().await {
                    tracing::error!(error = %err, "Drain failed");
                }
            }
        })
    }
}

/// Stop capture after a local persistence failure.
///
/// The session marker stays in place so a restart can recover the session.
fn halt(st: &mut EngineState, err: &AppError) -> EngineEvent {
    let reason = err.to_string();
    tracing::error!(error = %reason, "Local store failed, halting recorder");
    st.halted = Some(reason.clone());
    st.session = None;
    st.last_error = Some(err.class());
    EngineEvent::RecorderHalted { reason }
}

fn track_from_remote(rt: &RemoteTrack) -> Track {
    let created_at = parse_remote_timestamp(&rt.created_at).unwrap_or_default();
    Track {
        id: TrackId::Remote(rt.id),
        track_type: rt.track_type,
        name: rt
            .name
            .clone()
            .unwrap_or_else(|| format!("{} Track {}", rt.track_type.label(), rt.id)),
        created_at,
        reference_track_id: rt.human_track_id.map(TrackId::Remote),
        synced_positions: rt.positions.len() as u64,
    }
}
