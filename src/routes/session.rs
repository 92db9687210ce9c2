// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Capture control: sessions, samples, connectivity and hiding spots.

use crate::error::Result;
use crate::models::{DrainReport, HidingSpot, LatLng, Sample, Track, TrackId, TrackType};
use crate::services::recorder::{RecorderStatus, SampleOutcome, SpotUpdate};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session/start", post(start_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/samples", post(record_sample))
        .route("/api/connectivity", post(set_connectivity))
        .route("/api/sync/flush", post(flush))
        .route("/api/spots", post(add_spot))
        .route("/api/spots/{spot_id}", put(update_spot))
}

// ─── Sessions ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct StartRequest {
    pub track_type: TrackType,
    pub reference_track_id: Option<TrackId>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<Track>)> {
    request.validate()?;
    let track = state
        .recorder
        .start(request.track_type, request.reference_track_id, request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(track)))
}

async fn stop_session(State(state): State<Arc<AppState>>) -> Result<Json<Track>> {
    Ok(Json(state.recorder.stop()?))
}

// ─── Samples ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct SampleRequest {
    #[validate(nested)]
    pub position: LatLng,
    #[validate(range(min = 0.0))]
    pub accuracy: Option<f64>,
    /// Capture time; defaults to arrival time
    pub timestamp: Option<DateTime<Utc>>,
}

async fn record_sample(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SampleRequest>,
) -> Result<Json<SampleOutcome>> {
    request.validate()?;
    let sample = Sample {
        position: request.position,
        accuracy: request.accuracy,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
    };
    Ok(Json(state.recorder.record(sample)?))
}

// ─── Connectivity and sync ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

async fn set_connectivity(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectivityRequest>,
) -> Result<Json<RecorderStatus>> {
    state.recorder.set_connectivity(request.online);
    Ok(Json(state.recorder.status()?))
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub online: bool,
    /// `None` when offline or when a drain was already running
    pub report: Option<DrainReport>,
}

async fn flush(State(state): State<Arc<AppState>>) -> Result<Json<FlushResponse>> {
    let report = state.recorder.flush_now().await?;
    Ok(Json(FlushResponse {
        online: state.recorder.is_online(),
        report,
    }))
}

// ─── Hiding spots ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AddSpotRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

async fn add_spot(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddSpotRequest>,
) -> Result<(StatusCode, Json<HidingSpot>)> {
    request.validate()?;
    let spot = state.recorder.add_hiding_spot(request.name).await?;
    Ok((StatusCode::CREATED, Json(spot)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpotRequest {
    pub found: Option<bool>,
}

async fn update_spot(
    State(state): State<Arc<AppState>>,
    Path(spot_id): Path<u64>,
    Json(request): Json<UpdateSpotRequest>,
) -> Result<Json<SpotUpdate>> {
    Ok(Json(
        state.recorder.mark_spot_found(spot_id, request.found).await?,
    ))
}
