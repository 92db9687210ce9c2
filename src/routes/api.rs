// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read paths, region evaluation and position corrections.

use crate::error::Result;
use crate::models::{EngineEvent, LatLng, Region, Track, TrackDetail, TrackId};
use crate::services::comparison::TrackComparison;
use crate::services::correction::{CorrectionOutcome, CorrectionRequest};
use crate::services::evaluator::RegionResult;
use crate::services::recorder::RecorderStatus;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/events", get(get_recent_events))
        .route("/api/events/stream", get(stream_events))
        .route("/api/regions", get(get_regions))
        .route("/api/evaluate", post(evaluate))
        .route("/api/tracks", get(list_tracks))
        .route("/api/tracks/{track_id}", get(get_track))
        .route("/api/tracks/{track_id}/comparison", get(compare_with_reference))
        .route("/api/compare", get(compare_tracks))
        .route(
            "/api/tracks/{track_id}/positions/{position_id}",
            put(correct_position),
        )
        .route(
            "/api/tracks/{track_id}/positions/{position_id}/suggestion",
            get(suggest_correction),
        )
}

// ─── Status and events ───────────────────────────────────────

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<RecorderStatus>> {
    Ok(Json(state.recorder.status()?))
}

/// Most recent region events, newest first.
async fn get_recent_events(State(state): State<Arc<AppState>>) -> Json<Vec<EngineEvent>> {
    Json(state.recorder.recent_events())
}

/// Live engine events as server-sent events.
async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.recorder.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().comment("unserializable event"));
                    return Some((Ok::<Event, Infallible>(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ─── Regions ─────────────────────────────────────────────────

async fn get_regions(State(state): State<Arc<AppState>>) -> Json<Vec<Region>> {
    Json(state.recorder.regions())
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvaluateSource {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EvaluateRequest {
    #[validate(nested)]
    pub position: LatLng,
    #[serde(default)]
    pub source: EvaluateSource,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub position: LatLng,
    pub results: Vec<RegionResult>,
}

/// Containment of one point in every region (no events are emitted).
async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>> {
    request.validate()?;
    let results = match request.source {
        EvaluateSource::Local => state.recorder.evaluate_local(request.position)?,
        EvaluateSource::Remote => state.recorder.evaluate_remote(request.position).await?,
    };
    Ok(Json(EvaluateResponse {
        position: request.position,
        results,
    }))
}

// ─── Tracks ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TracksQuery {
    #[serde(default)]
    include_remote: bool,
}

async fn list_tracks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TracksQuery>,
) -> Result<Json<Vec<Track>>> {
    Ok(Json(state.recorder.list_tracks(params.include_remote).await?))
}

async fn get_track(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<TrackId>,
) -> Result<Json<TrackDetail>> {
    Ok(Json(state.recorder.track_detail(track_id).await?))
}

/// Dog track against the human track it was following.
async fn compare_with_reference(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<TrackId>,
) -> Result<Json<TrackComparison>> {
    Ok(Json(state.recorder.compare_with_reference(track_id).await?))
}

#[derive(Debug, Deserialize)]
struct CompareQuery {
    human_track_id: TrackId,
    dog_track_id: TrackId,
}

async fn compare_tracks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CompareQuery>,
) -> Result<Json<TrackComparison>> {
    Ok(Json(
        state
            .recorder
            .compare_tracks(params.human_track_id, params.dog_track_id)
            .await?,
    ))
}

async fn correct_position(
    State(state): State<Arc<AppState>>,
    Path((track_id, position_id)): Path<(TrackId, u64)>,
    Json(request): Json<CorrectionRequest>,
) -> Result<Json<CorrectionOutcome>> {
    Ok(Json(
        state
            .recorder
            .correct_position(track_id, position_id, request)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub suggestion: Option<LatLng>,
}

async fn suggest_correction(
    State(state): State<Arc<AppState>>,
    Path((track_id, position_id)): Path<(TrackId, u64)>,
) -> Result<Json<SuggestionResponse>> {
    Ok(Json(SuggestionResponse {
        suggestion: state.recorder.suggest_correction(track_id, position_id)?,
    }))
}
