// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local durable store.
//!
//! Everything the engine persists lives in one ordered key-value store so
//! that a sample's log record and its queue entry commit in a single atomic
//! batch. [`TrackLog`] and [`OfflineQueue`] are borrowed views over the same
//! [`LocalStore`].

pub mod memory;
pub mod queue;
pub mod sqlite;
pub mod track_log;

pub use memory::MemoryStore;
pub use queue::OfflineQueue;
pub use sqlite::SqliteStore;
pub use track_log::TrackLog;

use crate::error::{AppError, Result};
use crate::models::{Position, QueueEntry, Sample, Track, TrackId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Key layout. Numeric suffixes are zero-padded so key order is sequence order.
pub mod keys {
    use crate::models::TrackId;

    pub const TRACK_PREFIX: &str = "track/";
    pub const QUEUE_PREFIX: &str = "queue/";
    pub const SESSION: &str = "session";
    pub const REGIONS: &str = "regions";

    pub fn track(id: TrackId) -> String {
        format!("{}{}", TRACK_PREFIX, id)
    }

    pub fn positions(id: TrackId) -> String {
        format!("pos/{}/", id)
    }

    pub fn position(id: TrackId, seq: u64) -> String {
        format!("pos/{}/{:012}", id, seq)
    }

    pub fn queue(seq: u64) -> String {
        format!("{}{:020}", QUEUE_PREFIX, seq)
    }

    pub fn spots(id: TrackId) -> String {
        format!("spots/{}", id)
    }

    /// Parse the trailing sequence number of a position or queue key.
    pub fn seq_of(key: &str) -> Option<u64> {
        key.rsplit('/').next()?.parse().ok()
    }
}

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// Errors from the storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to decode record {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::LocalStoreCorruption(err.to_string())
    }
}

/// Ordered key-value storage with atomic batches.
///
/// Implementations must make a successful `apply` durable before returning.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &str) -> std::result::Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// The entry with the greatest key starting with `prefix`.
    fn last_with_prefix(
        &self,
        prefix: &str,
    ) -> std::result::Result<Option<(String, Vec<u8>)>, StoreError>;

    /// Apply every operation or none of them.
    fn apply(&mut self, batch: Vec<WriteOp>) -> std::result::Result<(), StoreError>;

    fn put(&mut self, key: String, value: Vec<u8>) -> std::result::Result<(), StoreError> {
        self.apply(vec![WriteOp::Put(key, value)])
    }
}

/// Smallest string greater than every string starting with `prefix`.
pub(crate) fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value).map_err(StoreError::from)?)
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })?)
}

pub(crate) fn get_json<T: DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(bytes) => decode(key, &bytes).map(Some),
        None => Ok(None),
    }
}

/// The engine's durable state: track log plus offline queue.
pub struct LocalStore {
    kv: Box<dyn KeyValueStore>,
    next_queue_seq: u64,
}

impl LocalStore {
    /// Wrap a backend, resuming the queue sequence after its last entry.
    pub fn new(kv: impl KeyValueStore + 'static) -> Result<Self> {
        let next_queue_seq = kv
            .scan_prefix(keys::QUEUE_PREFIX)?
            .last()
            .and_then(|(key, _)| keys::seq_of(key))
            .map_or(0, |seq| seq + 1);
        Ok(Self {
            kv: Box::new(kv),
            next_queue_seq,
        })
    }

    /// Open (or create) an SQLite-backed store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(SqliteStore::open(path)?)
    }

    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            kv: Box::new(MemoryStore::default()),
            next_queue_seq: 0,
        }
    }

    pub fn log(&mut self) -> TrackLog<'_> {
        TrackLog::new(self.kv.as_mut())
    }

    pub fn queue(&mut self) -> OfflineQueue<'_> {
        OfflineQueue::new(self.kv.as_mut(), &mut self.next_queue_seq)
    }

    /// Create a local-only track and queue its remote creation, atomically.
    pub fn create_local_track(&mut self, track: &Track) -> Result<()> {
        let mut batch = self.log().create_track_ops(track)?;
        batch.push(self.queue().enqueue_op(&QueueEntry::CreateTrack {
            client_id: track.id,
            track: track.clone(),
        })?);
        self.kv.apply(batch)?;
        Ok(())
    }

    /// Append a sample to the log and queue it for delivery, atomically.
    pub fn append_and_enqueue(&mut self, track_id: TrackId, sample: &Sample) -> Result<Position> {
        let (position, mut batch) = self.log().append_ops(track_id, sample)?;
        batch.push(self.queue().enqueue_op(&QueueEntry::AppendPosition {
            track_id,
            position_id: position.id,
            position: position.position,
            accuracy: position.accuracy,
            timestamp: position.timestamp,
        })?);
        self.kv.apply(batch)?;
        Ok(position)
    }

    /// Move a track to its server id and retarget queued work, atomically.
    ///
    /// `create_seq` is the queue entry that created the track remotely; it is
    /// acknowledged in the same batch.
    pub fn remap_track(&mut self, old: TrackId, new: TrackId, create_seq: Option<u64>) -> Result<()> {
        let mut batch = self.log().remap_ops(old, new)?;
        batch.extend(self.queue().retarget_ops(old, new)?);
        if let Some(seq) = create_seq {
            batch.push(WriteOp::Delete(keys::queue(seq)));
        }
        self.kv.apply(batch)?;
        tracing::info!(old = %old, new = %new, "Remapped track id");
        Ok(())
    }
}
