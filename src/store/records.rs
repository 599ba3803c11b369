//! Record Map
//!
//! Concurrent id → record mapping.
//!
//! # Design
//!
//! - `DashMap` shards the keyspace; each shard has its own lock, so writers
//!   on different ids rarely contend
//! - In-place updates run under the shard's write lock, making
//!   read-check-update atomic per key
//! - A snapshot gate (`RwLock<()>`) is held shared by every writer and
//!   exclusively by [`RecordMap::sorted_snapshot`], so a snapshot never
//!   observes a half-applied batch of writes across shards

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::model::Transaction;

/// Concurrent record storage. Exposes only atomic operations.
#[derive(Default)]
pub struct RecordMap {
    map: DashMap<String, Transaction>,
    /// Shared by writers, exclusive for whole-map snapshots
    snapshot_gate: RwLock<()>,
}

impl RecordMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its id, returning the record it replaced
    pub fn insert(&self, record: Transaction) -> Option<Transaction> {
        let _gate = self.snapshot_gate.read();
        self.map.insert(record.id.clone(), record)
    }

    /// Remove the record for `id`
    pub fn remove(&self, id: &str) -> Option<Transaction> {
        let _gate = self.snapshot_gate.read();
        self.map.remove(id).map(|(_, record)| record)
    }

    /// Update an existing record in place.
    ///
    /// Returns the updated record, or `None` without inserting anything when
    /// `id` is absent. The closure runs while the key's shard is write-locked.
    pub fn update<F>(&self, id: &str, f: F) -> Option<Transaction>
    where
        F: FnOnce(&mut Transaction),
    {
        let _gate = self.snapshot_gate.read();
        let mut entry = self.map.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Get a copy of the record for `id`
    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.map.get(id).map(|entry| entry.value().clone())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Consistent copy of every record, ascending by id
    pub fn sorted_snapshot(&self) -> Vec<Transaction> {
        let mut records: Vec<Transaction> = {
            let _gate = self.snapshot_gate.write();
            self.map.iter().map(|entry| entry.value().clone()).collect()
        };
        // ids are unique, so an unstable sort is deterministic
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(id: &str, amount: f64) -> Transaction {
        Transaction::new(id, format!("Transaction {}", id), amount)
    }

    #[test]
    fn test_insert_get() {
        let map = RecordMap::new();
        assert!(map.is_empty());

        assert!(map.insert(record("a", 1.0)).is_none());
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some(record("a", 1.0)));
        assert_eq!(map.get("b"), None);
    }

    #[test]
    fn test_insert_replaces() {
        let map = RecordMap::new();
        map.insert(record("a", 1.0));

        let old = map.insert(record("a", 2.0));
        assert_eq!(old, Some(record("a", 1.0)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").unwrap().amount, 2.0);
    }

    #[test]
    fn test_remove() {
        let map = RecordMap::new();
        map.insert(record("a", 1.0));

        assert_eq!(map.remove("a"), Some(record("a", 1.0)));
        assert!(map.is_empty());
        assert_eq!(map.remove("a"), None);
    }

    #[test]
    fn test_update_in_place() {
        let map = RecordMap::new();
        map.insert(record("a", 1.0));

        let updated = map.update("a", |r| {
            r.description = "changed".to_string();
            r.amount = 9.0;
        });

        let updated = updated.unwrap();
        assert_eq!(updated.id, "a");
        assert_eq!(updated.description, "changed");
        assert_eq!(map.get("a"), Some(updated));
    }

    #[test]
    fn test_update_missing_does_not_insert() {
        let map = RecordMap::new();
        let mut called = false;
        assert!(map.update("ghost", |_| called = true).is_none());
        assert!(!called);
        assert!(map.is_empty());
    }

    #[test]
    fn test_sorted_snapshot_is_lexicographic() {
        let map = RecordMap::new();
        for i in 1..=12 {
            map.insert(record(&i.to_string(), i as f64));
        }

        let ids: Vec<String> = map.sorted_snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec!["1", "10", "11", "12", "2", "3", "4", "5", "6", "7", "8", "9"]
        );
    }

    #[test]
    fn test_concurrent_updates_same_key() {
        let map = Arc::new(RecordMap::new());
        map.insert(record("shared", 0.0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for _ in 0..500 {
                        map.update("shared", |r| {
                            r.description = format!("writer-{}", t);
                            r.amount = t as f64;
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Fields always come from the same writer
        let r = map.get("shared").unwrap();
        assert_eq!(r.description, format!("writer-{}", r.amount as usize));
    }

    #[test]
    fn test_concurrent_snapshot_and_writes() {
        let map = Arc::new(RecordMap::new());

        let writer = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..2000 {
                    map.insert(record(&format!("{:05}", i), i as f64));
                }
            })
        };

        for _ in 0..50 {
            let snapshot = map.sorted_snapshot();
            assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));
        }

        writer.join().unwrap();
        assert_eq!(map.sorted_snapshot().len(), 2000);
    }
}
