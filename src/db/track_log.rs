// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Append-only track log.
//!
//! Positions are stored one record per key, ordered by a per-track sequence
//! number. Raw coordinates are never rewritten; only the verification fields
//! of a position may change after it is appended.

use super::{decode, encode, get_json, keys, KeyValueStore, WriteOp};
use crate::error::{AppError, Result};
use crate::models::{
    HidingSpot, Position, Region, Sample, SessionMarker, Track, TrackDetail, TrackId,
};
use crate::time_utils::format_utc_rfc3339;

/// Log operations over a borrowed store.
pub struct TrackLog<'a> {
    kv: &'a mut dyn KeyValueStore,
}

impl<'a> TrackLog<'a> {
    pub(crate) fn new(kv: &'a mut dyn KeyValueStore) -> Self {
        Self { kv }
    }

    pub fn create_track(&mut self, track: &Track) -> Result<()> {
        let batch = self.create_track_ops(track)?;
        self.kv.apply(batch)?;
        Ok(())
    }

    pub(crate) fn create_track_ops(&self, track: &Track) -> Result<Vec<WriteOp>> {
        if self.kv.get(&keys::track(track.id))?.is_some() {
            return Err(AppError::BadRequest(format!(
                "track {} already exists",
                track.id
            )));
        }
        Ok(vec![WriteOp::Put(keys::track(track.id), encode(track)?)])
    }

    pub fn get_track(&self, id: TrackId) -> Result<Option<Track>> {
        get_json(&*self.kv, &keys::track(id))
    }

    pub fn contains_track(&self, id: TrackId) -> Result<bool> {
        Ok(self.kv.get(&keys::track(id))?.is_some())
    }

    /// All tracks, newest first.
    pub fn list_tracks(&self) -> Result<Vec<Track>> {
        let mut tracks = self
            .kv
            .scan_prefix(keys::TRACK_PREFIX)?
            .into_iter()
            .map(|(key, bytes)| decode::<Track>(&key, &bytes))
            .collect::<Result<Vec<_>>>()?;
        tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tracks)
    }

    /// Append one sample and return the stored position.
    pub fn append(&mut self, track_id: TrackId, sample: &Sample) -> Result<Position> {
        let (position, batch) = self.append_ops(track_id, sample)?;
        self.kv.apply(batch)?;
        Ok(position)
    }

    /// Build the write for an append without applying it.
    ///
    /// Rejects samples older than the last stored position; equal timestamps
    /// are accepted and keep arrival order.
    pub(crate) fn append_ops(
        &self,
        track_id: TrackId,
        sample: &Sample,
    ) -> Result<(Position, Vec<WriteOp>)> {
        if !self.contains_track(track_id)? {
            return Err(AppError::NotFound(format!("track {}", track_id)));
        }
        let next_seq = match self.last_position(track_id)? {
            Some(last) => {
                if sample.timestamp < last.timestamp {
                    return Err(AppError::OutOfOrderPosition {
                        timestamp: format_utc_rfc3339(sample.timestamp),
                    });
                }
                last.id + 1
            }
            None => 0,
        };
        let position = Position::from_sample(next_seq, track_id, sample);
        let op = WriteOp::Put(keys::position(track_id, next_seq), encode(&position)?);
        Ok((position, vec![op]))
    }

    /// Every position of a track, in append order.
    pub fn read_all(&self, track_id: TrackId) -> Result<Vec<Position>> {
        self.kv
            .scan_prefix(&keys::positions(track_id))?
            .into_iter()
            .map(|(key, bytes)| decode(&key, &bytes))
            .collect()
    }

    pub fn last_position(&self, track_id: TrackId) -> Result<Option<Position>> {
        match self.kv.last_with_prefix(&keys::positions(track_id))? {
            Some((key, bytes)) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_position(&self, track_id: TrackId, position_id: u64) -> Result<Option<Position>> {
        get_json(&*self.kv, &keys::position(track_id, position_id))
    }

    /// Rewrite the verification fields of a stored position.
    pub fn update_position(&mut self, position: &Position) -> Result<()> {
        let key = keys::position(position.track_id, position.id);
        let stored: Position = get_json(&*self.kv, &key)?
            .ok_or_else(|| AppError::NotFound(format!("position {}", position.id)))?;
        if stored.position != position.position || stored.timestamp != position.timestamp {
            return Err(AppError::BadRequest(
                "raw coordinates of a recorded position cannot change".to_string(),
            ));
        }
        self.kv.put(key, encode(position)?)?;
        Ok(())
    }

    pub fn detail(&self, id: TrackId) -> Result<Option<TrackDetail>> {
        let Some(track) = self.get_track(id)? else {
            return Ok(None);
        };
        let positions = self.read_all(id)?;
        Ok(Some(TrackDetail { track, positions }))
    }

    /// Record that the remote store acknowledged a position.
    ///
    /// Advances the track's reconciliation pointer past `position_id` and
    /// remembers the remote id of the position if one was returned.
    pub fn mark_synced(
        &mut self,
        track_id: TrackId,
        position_id: u64,
        remote_position_id: Option<u64>,
    ) -> Result<()> {
        let Some(mut track) = self.get_track(track_id)? else {
            return Err(AppError::NotFound(format!("track {}", track_id)));
        };
        let mut batch = Vec::new();
        if position_id + 1 > track.synced_positions {
            track.synced_positions = position_id + 1;
            batch.push(WriteOp::Put(keys::track(track_id), encode(&track)?));
        }
        if let Some(remote_id) = remote_position_id {
            if let Some(mut position) = self.get_position(track_id, position_id)? {
                position.remote_id = Some(remote_id);
                batch.push(WriteOp::Put(
                    keys::position(track_id, position_id),
                    encode(&position)?,
                ));
            }
        }
        if !batch.is_empty() {
            self.kv.apply(batch)?;
        }
        Ok(())
    }

    /// Replace every reference to `old` with `new` in one batch.
    pub fn remap_track_id(&mut self, old: TrackId, new: TrackId) -> Result<()> {
        let batch = self.remap_ops(old, new)?;
        self.kv.apply(batch)?;
        Ok(())
    }

    pub(crate) fn remap_ops(&self, old: TrackId, new: TrackId) -> Result<Vec<WriteOp>> {
        let Some(mut track) = self.get_track(old)? else {
            return Err(AppError::NotFound(format!("track {}", old)));
        };
        if self.contains_track(new)? {
            return Err(AppError::LocalStoreCorruption(format!(
                "cannot remap {} to {}: target track already exists",
                old, new
            )));
        }

        let mut batch = vec![WriteOp::Delete(keys::track(old))];
        track.id = new;
        batch.push(WriteOp::Put(keys::track(new), encode(&track)?));

        for mut position in self.read_all(old)? {
            batch.push(WriteOp::Delete(keys::position(old, position.id)));
            position.track_id = new;
            batch.push(WriteOp::Put(keys::position(new, position.id), encode(&position)?));
        }

        // Dog tracks recorded against this one while it was local
        for mut other in self.list_tracks()? {
            if other.id != old && other.reference_track_id == Some(old) {
                other.reference_track_id = Some(new);
                batch.push(WriteOp::Put(keys::track(other.id), encode(&other)?));
            }
        }

        if let Some(mut marker) = self.session()? {
            let mut changed = false;
            if marker.track_id == old {
                marker.track_id = new;
                changed = true;
            }
            if marker.reference_track_id == Some(old) {
                marker.reference_track_id = Some(new);
                changed = true;
            }
            if changed {
                batch.push(WriteOp::Put(keys::SESSION.to_string(), encode(&marker)?));
            }
        }

        if let Some(mut spots) = self.cached_spots(old)? {
            for spot in &mut spots {
                spot.track_id = new;
            }
            batch.push(WriteOp::Delete(keys::spots(old)));
            batch.push(WriteOp::Put(keys::spots(new), encode(&spots)?));
        }

        Ok(batch)
    }

    pub fn session(&self) -> Result<Option<SessionMarker>> {
        get_json(&*self.kv, keys::SESSION)
    }

    pub fn set_session(&mut self, marker: &SessionMarker) -> Result<()> {
        self.kv.put(keys::SESSION.to_string(), encode(marker)?)?;
        Ok(())
    }

    pub fn clear_session(&mut self) -> Result<()> {
        self.kv.apply(vec![WriteOp::Delete(keys::SESSION.to_string())])?;
        Ok(())
    }

    pub fn cached_regions(&self) -> Result<Option<Vec<Region>>> {
        get_json(&*self.kv, keys::REGIONS)
    }

    pub fn cache_regions(&mut self, regions: &[Region]) -> Result<()> {
        self.kv.put(keys::REGIONS.to_string(), encode(&regions)?)?;
        Ok(())
    }

    /// Hiding spots last fetched for a human track.
    pub fn cached_spots(&self, track_id: TrackId) -> Result<Option<Vec<HidingSpot>>> {
        get_json(&*self.kv, &keys::spots(track_id))
    }

    pub fn cache_spots(&mut self, track_id: TrackId, spots: &[HidingSpot]) -> Result<()> {
        self.kv.put(keys::spots(track_id), encode(&spots)?)?;
        Ok(())
    }
}
