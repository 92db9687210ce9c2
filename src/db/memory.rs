// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory backend (no durability).

use super::{prefix_upper_bound, KeyValueStore, StoreError, WriteOp};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn last_with_prefix(&self, prefix: &str) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        let last = match prefix_upper_bound(prefix) {
            Some(upper) => self.entries.range(prefix.to_string()..upper).next_back(),
            None => self.entries.range(prefix.to_string()..).next_back(),
        };
        Ok(last.map(|(key, value)| (key.clone(), value.clone())))
    }

    fn apply(&mut self, batch: Vec<WriteOp>) -> Result<(), StoreError> {
        for op in batch {
            match op {
                WriteOp::Put(key, value) => {
                    self.entries.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_with_prefix_is_bounded() {
        let mut store = MemoryStore::default();
        store
            .apply(vec![
                WriteOp::Put("pos/7/000000000000".into(), b"a".to_vec()),
                WriteOp::Put("pos/7/000000000001".into(), b"b".to_vec()),
                WriteOp::Put("pos/70/000000000000".into(), b"x".to_vec()),
            ])
            .unwrap();
        assert_eq!(
            store.last_with_prefix("pos/7/").unwrap(),
            Some(("pos/7/000000000001".to_string(), b"b".to_vec()))
        );
        assert_eq!(store.last_with_prefix("pos/8/").unwrap(), None);
    }
}
