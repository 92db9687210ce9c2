// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync reconciler: drains the offline queue to the remote store.
//!
//! A drain takes a snapshot of the queue and processes it in two passes:
//! track creations first (so appends can be retargeted to server ids), then
//! appends in FIFO order. Entries leave the durable queue only when the
//! remote store acknowledges them or rejects them permanently, so anything
//! not delivered stays in its original position for the next cycle.
//!
//! Only one drain runs at a time; a trigger that arrives while a drain is in
//! progress is a no-op.

use crate::error::{AppError, Result};
use crate::models::{DrainReport, EngineEvent, QueueEntry, TrackId};
use crate::services::events::EventBus;
use crate::services::remote::{NewPosition, NewTrack, RemoteStore};
use crate::services::state::{lock, EngineState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Snapshots per drain before yielding to the next trigger.
const MAX_ROUNDS: usize = 16;

#[derive(Debug, Default)]
pub struct SyncReconciler {
    draining: AtomicBool,
}

/// Clears the draining flag when the drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Pass {
    Done,
    Halted,
}

impl SyncReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Drain the queue if online and no other drain is running.
    ///
    /// Returns `None` when the call was coalesced or skipped.
    pub async fn drain(
        &self,
        state: &Mutex<EngineState>,
        remote: &dyn RemoteStore,
        events: &EventBus,
    ) -> Result<Option<DrainReport>> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Drain already in progress, coalescing trigger");
            return Ok(None);
        }
        let _guard = DrainGuard(&self.draining);

        if !lock(state).online {
            return Ok(None);
        }

        let mut report = DrainReport::default();
        for _ in 0..MAX_ROUNDS {
            let snapshot = lock(state).store.queue().entries()?;
            if snapshot.is_empty() {
                break;
            }
            tracing::info!(entries = snapshot.len(), "Draining offline queue");
            if let Pass::Halted = self
                .drain_snapshot(snapshot, state, remote, events, &mut report)
                .await?
            {
                break;
            }
        }

        if !report.is_empty() {
            tracing::info!(
                created = report.created,
                appended = report.appended,
                dropped = report.dropped,
                requeued = report.requeued,
                "Drain finished"
            );
            events.emit(EngineEvent::SyncCompleted {
                report: report.clone(),
            });
        }
        Ok(Some(report))
    }

    async fn drain_snapshot(
        &self,
        snapshot: Vec<(u64, QueueEntry)>,
        state: &Mutex<EngineState>,
        remote: &dyn RemoteStore,
        events: &EventBus,
        report: &mut DrainReport,
    ) -> Result<Pass> {
        let (mut creates, mut appends): (Vec<_>, Vec<_>) =
            snapshot.into_iter().partition(|(_, entry)| entry.is_create());

        let mut i = 0;
        while i < creates.len() {
            let (seq, entry) = creates[i].clone();
            let QueueEntry::CreateTrack { client_id, track } = &entry else {
                i += 1;
                continue;
            };
            let request = NewTrack {
                track_type: track.track_type,
                name: Some(track.name.clone()),
                human_track_id: track.reference_track_id.and_then(|r| r.remote()),
            };

            match remote.create_track(&request).await {
                Ok(created) => {
                    let new_id = TrackId::Remote(created.id);
                    lock(state).remap_track(*client_id, new_id, Some(seq))?;
                    for (_, pending) in creates.iter_mut().skip(i + 1).chain(appends.iter_mut()) {
                        pending.retarget(*client_id, new_id);
                    }
                    report.created += 1;
                    report.remapped.push((*client_id, new_id));
                    events.emit(EngineEvent::TrackRemapped {
                        old_id: *client_id,
                        new_id,
                    });
                }
                Err(err) if err.is_transient() => {
                    report.requeued += (creates.len() - i + appends.len()) as u32;
                    go_offline(state, events, &err);
                    return Ok(Pass::Halted);
                }
                Err(err) => {
                    // Appends for a track the server refused can never land
                    let removed = {
                        let mut st = lock(state);
                        st.last_error = Some(err.class());
                        st.store.queue().remove_track(*client_id)?
                    };
                    appends.retain(|(_, pending)| pending.track_id() != *client_id);
                    report.dropped += removed as u32;
                    drop_entry(events, &entry, &err);
                }
            }
            i += 1;
        }

        let total = appends.len();
        for (done, (seq, entry)) in appends.into_iter().enumerate() {
            let QueueEntry::AppendPosition {
                track_id,
                position_id,
                position,
                accuracy,
                timestamp,
            } = &entry
            else {
                continue;
            };

            let Some(remote_id) = track_id.remote() else {
                let err = AppError::NonTransientRemote(format!(
                    "track {} was never created remotely",
                    track_id
                ));
                lock(state).store.queue().ack(seq)?;
                report.dropped += 1;
                drop_entry(events, &entry, &err);
                continue;
            };

            let request = NewPosition::new(*position, *accuracy, *timestamp);
            match remote.append_position(remote_id, &request).await {
                Ok(updated) => {
                    let remote_position_id = updated.positions.last().and_then(|p| p.id);
                    let mut st = lock(state);
                    st.store.queue().ack(seq)?;
                    st.store
                        .log()
                        .mark_synced(*track_id, *position_id, remote_position_id)?;
                    report.appended += 1;
                }
                Err(err) if err.is_transient() => {
                    report.requeued += (total - done) as u32;
                    go_offline(state, events, &err);
                    return Ok(Pass::Halted);
                }
                Err(err) => {
                    {
                        let mut st = lock(state);
                        st.last_error = Some(err.class());
                        st.store.queue().ack(seq)?;
                    }
                    report.dropped += 1;
                    drop_entry(events, &entry, &err);
                }
            }
        }

        Ok(Pass::Done)
    }
}

fn go_offline(state: &Mutex<EngineState>, events: &EventBus, err: &AppError) {
    tracing::warn!(error = %err, "Remote store unreachable, pausing sync");
    let changed = {
        let mut st = lock(state);
        st.last_error = Some(err.class());
        st.set_online(false)
    };
    if changed {
        events.emit(EngineEvent::ConnectivityChanged { online: false });
    }
}

fn drop_entry(events: &EventBus, entry: &QueueEntry, err: &AppError) {
    tracing::error!(entry = %entry.describe(), error = %err, "Dropping rejected queue entry");
    events.emit(EngineEvent::EntryDropped {
        entry: entry.describe(),
        class: err.class(),
        reason: err.to_string(),
    });
}
