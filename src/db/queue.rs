// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable FIFO of mutations awaiting the remote store.
//!
//! Each entry is its own record keyed by a monotonically increasing sequence
//! number. Entries are removed only once the remote store has acknowledged
//! them, so a crash mid-drain re-delivers rather than loses.

use super::{decode, encode, keys, KeyValueStore, WriteOp};
use crate::error::Result;
use crate::models::{QueueEntry, TrackId};

pub struct OfflineQueue<'a> {
    kv: &'a mut dyn KeyValueStore,
    next_seq: &'a mut u64,
}

impl<'a> OfflineQueue<'a> {
    pub(crate) fn new(kv: &'a mut dyn KeyValueStore, next_seq: &'a mut u64) -> Self {
        Self { kv, next_seq }
    }

    pub fn enqueue(&mut self, entry: &QueueEntry) -> Result<u64> {
        let seq = *self.next_seq;
        let op = self.enqueue_op(entry)?;
        self.kv.apply(vec![op])?;
        Ok(seq)
    }

    /// Reserve the next sequence number and build the write for `entry`.
    pub(crate) fn enqueue_op(&mut self, entry: &QueueEntry) -> Result<WriteOp> {
        let seq = *self.next_seq;
        *self.next_seq += 1;
        Ok(WriteOp::Put(keys::queue(seq), encode(entry)?))
    }

    /// Snapshot of every pending entry with its sequence number, oldest first.
    pub fn entries(&self) -> Result<Vec<(u64, QueueEntry)>> {
        self.kv
            .scan_prefix(keys::QUEUE_PREFIX)?
            .into_iter()
            .filter_map(|(key, bytes)| keys::seq_of(&key).map(|seq| (seq, key, bytes)))
            .map(|(seq, key, bytes)| Ok((seq, decode(&key, &bytes)?)))
            .collect()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.kv.scan_prefix(keys::QUEUE_PREFIX)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove an acknowledged (or dropped) entry.
    pub fn ack(&mut self, seq: u64) -> Result<()> {
        self.kv.apply(vec![WriteOp::Delete(keys::queue(seq))])?;
        Ok(())
    }

    /// Rewrites for every pending entry that refers to `old`.
    pub(crate) fn retarget_ops(&self, old: TrackId, new: TrackId) -> Result<Vec<WriteOp>> {
        let mut batch = Vec::new();
        for (seq, mut entry) in self.entries()? {
            if entry.retarget(old, new) {
                batch.push(WriteOp::Put(keys::queue(seq), encode(&entry)?));
            }
        }
        Ok(batch)
    }

    /// Drop every pending entry belonging to `track_id`. Returns how many.
    pub fn remove_track(&mut self, track_id: TrackId) -> Result<usize> {
        let batch: Vec<WriteOp> = self
            .entries()?
            .into_iter()
            .filter(|(_, entry)| entry.track_id() == track_id)
            .map(|(seq, _)| WriteOp::Delete(keys::queue(seq)))
            .collect();
        let removed = batch.len();
        if removed > 0 {
            self.kv.apply(batch)?;
        }
        Ok(removed)
    }
}
