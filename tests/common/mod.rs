// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dogtracks::config::Config;
use dogtracks::db::LocalStore;
use dogtracks::error::AppError;
use dogtracks::models::{EngineEvent, LatLng, Region, RegionShape, Sample, TrackType};
use dogtracks::routes::create_router;
use dogtracks::services::evaluator::RegionResult;
use dogtracks::services::remote::{
    NewPosition, NewTrack, PositionUpdate, RemoteHidingSpot, RemotePosition, RemoteStore,
    RemoteTrack,
};
use dogtracks::services::{RecorderSettings, RegionService, TrackRecorder};
use dogtracks::AppState;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// In-memory remote store with failure injection.
pub struct MockRemote {
    inner: Mutex<MockState>,
}

struct MockState {
    next_track_id: u64,
    next_position_id: u64,
    next_spot_id: u64,
    tracks: Vec<RemoteTrack>,
    created: Vec<NewTrack>,
    appended: Vec<(u64, NewPosition)>,
    spots: Vec<RemoteHidingSpot>,
    position_updates: Vec<(u64, PositionUpdate)>,
    regions: Vec<Region>,
    offline: bool,
    appends_before_outage: Option<usize>,
    rejected_track: Option<u64>,
    reject_creates: bool,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockState {
                next_track_id: 42,
                next_position_id: 1,
                next_spot_id: 1,
                tracks: Vec::new(),
                created: Vec::new(),
                appended: Vec::new(),
                spots: Vec::new(),
                position_updates: Vec::new(),
                regions: Vec::new(),
                offline: false,
                appends_before_outage: None,
                rejected_track: None,
                reject_creates: false,
                delay: None,
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    /// Every call fails transiently while set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Accept `n` more appends, then fail transiently.
    pub fn fail_appends_after(&self, n: usize) {
        self.state().appends_before_outage = Some(n);
    }

    pub fn heal(&self) {
        let mut st = self.state();
        st.offline = false;
        st.appends_before_outage = None;
    }

    /// Appends to this track are rejected permanently.
    pub fn reject_appends_to(&self, track_id: u64) {
        self.state().rejected_track = Some(track_id);
    }

    pub fn reject_creates(&self) {
        self.state().reject_creates = true;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn set_regions(&self, regions: Vec<Region>) {
        self.state().regions = regions;
    }

    pub fn add_spot(&self, track_id: u64, position: LatLng, found: Option<bool>) -> u64 {
        let mut st = self.state();
        let id = st.next_spot_id;
        st.next_spot_id += 1;
        st.spots.push(RemoteHidingSpot {
            id,
            track_id,
            position,
            name: Some(format!("Spot {}", id)),
            found,
        });
        id
    }

    pub fn created(&self) -> Vec<NewTrack> {
        self.state().created.clone()
    }

    /// Delivered positions as (track id, coordinate), in arrival order.
    pub fn appended(&self) -> Vec<(u64, LatLng)> {
        self.state()
            .appended
            .iter()
            .map(|(id, p)| (*id, p.position))
            .collect()
    }

    pub fn spot(&self, id: u64) -> Option<RemoteHidingSpot> {
        self.state().spots.iter().find(|s| s.id == id).cloned()
    }

    pub fn position_updates(&self) -> Vec<(u64, PositionUpdate)> {
        self.state().position_updates.clone()
    }

    async fn enter(&self) -> Result<(), AppError> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state().offline {
            return Err(AppError::TransientNetwork("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn ping(&self) -> Result<(), AppError> {
        self.enter().await
    }

    async fn create_track(&self, track: &NewTrack) -> Result<RemoteTrack, AppError> {
        self.enter().await?;
        let mut st = self.state();
        if st.reject_creates {
            return Err(AppError::NonTransientRemote("HTTP 422: invalid track".to_string()));
        }
        let id = st.next_track_id;
        st.next_track_id += 1;
        st.created.push(track.clone());
        let created = RemoteTrack {
            id,
            name: track.name.clone(),
            track_type: track.track_type,
            created_at: "2025-06-01T10:00:00".to_string(),
            human_track_id: track.human_track_id,
            positions: Vec::new(),
        };
        st.tracks.push(created.clone());
        Ok(created)
    }

    async fn append_position(
        &self,
        track_id: u64,
        position: &NewPosition,
    ) -> Result<RemoteTrack, AppError> {
        self.enter().await?;
        let mut st = self.state();
        if st.rejected_track == Some(track_id) {
            return Err(AppError::NonTransientRemote("HTTP 404: Track not found".to_string()));
        }
        if let Some(left) = st.appends_before_outage {
            if left == 0 {
                return Err(AppError::TransientNetwork("HTTP 503".to_string()));
            }
            st.appends_before_outage = Some(left - 1);
        }
        let position_id = st.next_position_id;
        st.next_position_id += 1;
        st.appended.push((track_id, position.clone()));
        let Some(track) = st.tracks.iter_mut().find(|t| t.id == track_id) else {
            // Tracks seeded directly in tests are accepted without a record
            return Ok(RemoteTrack {
                id: track_id,
                name: None,
                track_type: TrackType::Human,
                created_at: "2025-06-01T10:00:00".to_string(),
                human_track_id: None,
                positions: vec![RemotePosition {
                    id: Some(position_id),
                    position: position.position,
                    timestamp: position.timestamp.clone(),
                    accuracy: position.accuracy,
                }],
            });
        };
        track.positions.push(RemotePosition {
            id: Some(position_id),
            position: position.position,
            timestamp: position.timestamp.clone(),
            accuracy: position.accuracy,
        });
        Ok(track.clone())
    }

    async fn fetch_track(&self, track_id: u64) -> Result<RemoteTrack, AppError> {
        self.enter().await?;
        self.state()
            .tracks
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
            .ok_or_else(|| AppError::NonTransientRemote("HTTP 404: Track not found".to_string()))
    }

    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>, AppError> {
        self.enter().await?;
        Ok(self.state().tracks.clone())
    }

    async fn list_regions(&self) -> Result<Vec<Region>, AppError> {
        self.enter().await?;
        Ok(self.state().regions.clone())
    }

    async fn evaluate(&self, point: LatLng) -> Result<Vec<RegionResult>, AppError> {
        self.enter().await?;
        let regions = self.state().regions.clone();
        dogtracks::services::evaluator::evaluate_all(point, &regions)
    }

    async fn list_hiding_spots(&self, track_id: u64) -> Result<Vec<RemoteHidingSpot>, AppError> {
        self.enter().await?;
        Ok(self
            .state()
            .spots
            .iter()
            .filter(|s| s.track_id == track_id)
            .cloned()
            .collect())
    }

    async fn create_hiding_spot(
        &self,
        track_id: u64,
        position: LatLng,
        name: &str,
    ) -> Result<RemoteHidingSpot, AppError> {
        self.enter().await?;
        let mut st = self.state();
        let spot = RemoteHidingSpot {
            id: st.next_spot_id,
            track_id,
            position,
            name: Some(name.to_string()),
            found: None,
        };
        st.next_spot_id += 1;
        st.spots.push(spot.clone());
        Ok(spot)
    }

    async fn update_hiding_spot(
        &self,
        track_id: u64,
        spot_id: u64,
        found: Option<bool>,
    ) -> Result<RemoteHidingSpot, AppError> {
        self.enter().await?;
        let mut st = self.state();
        let spot = st
            .spots
            .iter_mut()
            .find(|s| s.id == spot_id && s.track_id == track_id)
            .ok_or_else(|| AppError::NonTransientRemote("HTTP 404: Spot not found".to_string()))?;
        spot.found = found;
        Ok(spot.clone())
    }

    async fn update_position(
        &self,
        position_id: u64,
        update: &PositionUpdate,
    ) -> Result<(), AppError> {
        self.enter().await?;
        self.state().position_updates.push((position_id, update.clone()));
        Ok(())
    }
}

/// Circle of 50 m around central Stockholm.
#[allow(dead_code)]
pub fn stockholm_regions() -> RegionService {
    RegionService::from_regions(vec![Region {
        id: 1,
        name: Some("Stockholm".to_string()),
        shape: RegionShape::Circle {
            center: LatLng::new(59.334, 18.066),
            radius_m: 50.0,
        },
    }])
    .unwrap()
}

#[allow(dead_code)]
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
}

#[allow(dead_code)]
pub fn sample(lat: f64, lng: f64, secs: i64) -> Sample {
    Sample {
        position: LatLng::new(lat, lng),
        accuracy: Some(5.0),
        timestamp: at(secs),
    }
}

#[allow(dead_code)]
pub fn recorder_with(
    remote: &Arc<MockRemote>,
    store: LocalStore,
    regions: RegionService,
) -> Arc<TrackRecorder> {
    let remote: Arc<dyn RemoteStore> = remote.clone();
    Arc::new(TrackRecorder::new(
        store,
        remote,
        regions,
        RecorderSettings::default(),
    ))
}

/// Everything currently buffered on an event subscription.
#[allow(dead_code)]
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Create a test app over an in-memory store and a mock remote.
/// Returns the router, the shared state and the mock.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MockRemote>) {
    let remote = MockRemote::new();
    let recorder = recorder_with(&remote, LocalStore::in_memory(), stockholm_regions());
    let state = Arc::new(AppState {
        config: Config::default(),
        recorder,
    });
    (create_router(state.clone()), state, remote)
}
