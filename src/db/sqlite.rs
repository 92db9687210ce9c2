// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite backend for the local store.

use super::{prefix_upper_bound, KeyValueStore, StoreError, WriteOp};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;

/// Single-table key-value store on SQLite.
///
/// WAL journaling with `synchronous = FULL` makes each committed batch
/// durable before `apply` returns.
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        // In-memory databases report "memory" here; either answer is fine
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL
            ) WITHOUT ROWID;
            "#,
        )
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut stmt = self.db.prepare_cached("SELECT value FROM kv WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let entries = match prefix_upper_bound(prefix) {
            Some(upper) => {
                let mut stmt = self.db.prepare_cached(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![prefix, upper], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                rows.collect::<SqlResult<Vec<_>>>()?
            }
            None => {
                let mut stmt = self
                    .db
                    .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt.query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<SqlResult<Vec<_>>>()?
            }
        };
        Ok(entries)
    }

    fn last_with_prefix(&self, prefix: &str) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        // Only the empty prefix lacks an upper bound
        let upper = prefix_upper_bound(prefix).unwrap_or_else(|| char::MAX.to_string());
        let mut stmt = self.db.prepare_cached(
            "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![prefix, upper])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }

    fn apply(&mut self, batch: Vec<WriteOp>) -> Result<(), StoreError> {
        let tx = self.db.transaction()?;
        {
            let mut put = tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")?;
            let mut delete = tx.prepare_cached("DELETE FROM kv WHERE key = ?")?;
            for op in &batch {
                match op {
                    WriteOp::Put(key, value) => {
                        put.execute(params![key, value])?;
                    }
                    WriteOp::Delete(key) => {
                        delete.execute(params![key])?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
