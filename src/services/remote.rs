// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote store client.
//!
//! [`RemoteStore`] is the seam between the engine and the central HTTP API;
//! [`HttpRemoteStore`] is the production implementation. Every failure is
//! classified as transient (retry later) or non-transient (drop).

use crate::error::AppError;
use crate::models::{HidingSpot, LatLng, Region, TrackId, TrackType, VerifiedStatus};
use crate::services::evaluator::RegionResult;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body for `POST /tracks`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTrack {
    pub track_type: TrackType,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_track_id: Option<u64>,
}

/// Body for `POST /tracks/{id}/positions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPosition {
    pub position: LatLng,
    pub accuracy: Option<f64>,
    /// Capture time; servers that stamp arrival time ignore it
    pub timestamp: String,
}

impl NewPosition {
    pub fn new(position: LatLng, accuracy: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            accuracy,
            timestamp: format_utc_rfc3339(timestamp),
        }
    }
}

/// Body for `PUT /track-positions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub verified_status: VerifiedStatus,
    pub corrected_position: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePosition {
    #[serde(default)]
    pub id: Option<u64>,
    pub position: LatLng,
    pub timestamp: String,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteTrack {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub track_type: TrackType,
    pub created_at: String,
    #[serde(default)]
    pub human_track_id: Option<u64>,
    #[serde(default)]
    pub positions: Vec<RemotePosition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteHidingSpot {
    pub id: u64,
    pub track_id: u64,
    pub position: LatLng,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub found: Option<bool>,
}

impl From<RemoteHidingSpot> for HidingSpot {
    fn from(spot: RemoteHidingSpot) -> Self {
        HidingSpot {
            id: spot.id,
            track_id: TrackId::Remote(spot.track_id),
            position: spot.position,
            name: spot.name.unwrap_or_else(|| format!("Spot {}", spot.id)),
            found: spot.found,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    results: Vec<RegionResult>,
}

/// Operations the engine needs from the central store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), AppError>;

    async fn create_track(&self, track: &NewTrack) -> Result<RemoteTrack, AppError>;

    /// Append one position; returns the updated track.
    async fn append_position(
        &self,
        track_id: u64,
        position: &NewPosition,
    ) -> Result<RemoteTrack, AppError>;

    async fn fetch_track(&self, track_id: u64) -> Result<RemoteTrack, AppError>;

    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>, AppError>;

    async fn list_regions(&self) -> Result<Vec<Region>, AppError>;

    /// Server-side region evaluation of a single point.
    async fn evaluate(&self, point: LatLng) -> Result<Vec<RegionResult>, AppError>;

    async fn list_hiding_spots(&self, track_id: u64) -> Result<Vec<RemoteHidingSpot>, AppError>;

    async fn create_hiding_spot(
        &self,
        track_id: u64,
        position: LatLng,
        name: &str,
    ) -> Result<RemoteHidingSpot, AppError>;

    async fn update_hiding_spot(
        &self,
        track_id: u64,
        spot_id: u64,
        found: Option<bool>,
    ) -> Result<RemoteHidingSpot, AppError>;

    /// Overwrite the verification fields of a delivered position.
    async fn update_position(&self, position_id: u64, update: &PositionUpdate)
        -> Result<(), AppError>;
}

/// Client for the central HTTP API.
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(send_error)?;
        check_response_json(response).await
    }
}

/// Classify a request that produced no response.
fn send_error(err: reqwest::Error) -> AppError {
    if err.is_builder() {
        AppError::NonTransientRemote(format!("invalid request: {}", err))
    } else {
        AppError::TransientNetwork(err.to_string())
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> AppError {
    let code = status.as_u16();
    if code == 408 || code == 429 || status.is_server_error() {
        tracing::warn!(status = code, "Remote store temporarily unavailable");
        AppError::TransientNetwork(format!("HTTP {}", status))
    } else {
        AppError::NonTransientRemote(format!("HTTP {}: {}", status, body))
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), AppError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::NonTransientRemote(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn ping(&self) -> Result<(), AppError> {
        let response = self
            .http
            .get(self.url("/ping"))
            .send()
            .await
            .map_err(send_error)?;
        check_response(response).await
    }

    async fn create_track(&self, track: &NewTrack) -> Result<RemoteTrack, AppError> {
        let response = self
            .http
            .post(self.url("/tracks"))
            .json(track)
            .send()
            .await
            .map_err(send_error)?;
        check_response_json(response).await
    }

    async fn append_position(
        &self,
        track_id: u64,
        position: &NewPosition,
    ) -> Result<RemoteTrack, AppError> {
        let response = self
            .http
            .post(self.url(&format!("/tracks/{}/positions", track_id)))
            .json(position)
            .send()
            .await
            .map_err(send_error)?;
        check_response_json(response).await
    }

    async fn fetch_track(&self, track_id: u64) -> Result<RemoteTrack, AppError> {
        self.get_json(&format!("/tracks/{}", track_id)).await
    }

    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>, AppError> {
        self.get_json("/tracks").await
    }

    async fn list_regions(&self) -> Result<Vec<Region>, AppError> {
        self.get_json("/geofences").await
    }

    async fn evaluate(&self, point: LatLng) -> Result<Vec<RegionResult>, AppError> {
        let response = self
            .http
            .post(self.url("/evaluate"))
            .json(&serde_json::json!({ "position": point }))
            .send()
            .await
            .map_err(send_error)?;
        let body: EvaluateResponse = check_response_json(response).await?;
        Ok(body.results)
    }

    async fn list_hiding_spots(&self, track_id: u64) -> Result<Vec<RemoteHidingSpot>, AppError> {
        self.get_json(&format!("/tracks/{}/hiding-spots", track_id))
            .await
    }

    async fn create_hiding_spot(
        &self,
        track_id: u64,
        position: LatLng,
        name: &str,
    ) -> Result<RemoteHidingSpot, AppError> {
        let response = self
            .http
            .post(self.url(&format!("/tracks/{}/hiding-spots", track_id)))
            .json(&serde_json::json!({ "position": position, "name": name }))
            .send()
            .await
            .map_err(send_error)?;
        check_response_json(response).await
    }

    async fn update_hiding_spot(
        &self,
        track_id: u64,
        spot_id: u64,
        found: Option<bool>,
    ) -> Result<RemoteHidingSpot, AppError> {
        let response = self
            .http
            .put(self.url(&format!("/tracks/{}/hiding-spots/{}", track_id, spot_id)))
            .json(&serde_json::json!({ "found": found }))
            .send()
            .await
            .map_err(send_error)?;
        check_response_json(response).await
    }

    async fn update_position(
        &self,
        position_id: u64,
        update: &PositionUpdate,
    ) -> Result<(), AppError> {
        let response = self
            .http
            .put(self.url(&format!("/track-positions/{}", position_id)))
            .json(update)
            .send()
            .await
            .map_err(send_error)?;
        check_response(response).await
    }
}
