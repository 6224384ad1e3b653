//! Short-lived cache of recall results.
//!
//! Keyed on the first [`KEY_CHARS`] characters of the query, so two queries
//! that share that prefix share an entry. Entries live for [`TTL`]. When a
//! new key arrives at [`CAPACITY`], the entry with the oldest insertion time
//! is evicted (insertion order, not access order).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pal_types::MemoryHit;

pub const TTL: Duration = Duration::from_secs(30);
pub const CAPACITY: usize = 50;
pub const KEY_CHARS: usize = 80;

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: Instant,
    results: Vec<MemoryHit>,
}

/// TTL-bounded recall cache. Owned by the recall layer; not shared.
#[derive(Debug)]
pub struct RecallCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl Default for RecallCache {
    fn default() -> Self {
        Self::new(TTL, CAPACITY)
    }
}

impl RecallCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Cache key for `query`: its first [`KEY_CHARS`] characters.
    pub fn key_for(query: &str) -> String {
        query.chars().take(KEY_CHARS).collect()
    }

    /// Cached results for `query` if inserted less than the TTL before `now`.
    pub fn get(&self, query: &str, now: Instant) -> Option<&[MemoryHit]> {
        let entry = self.entries.get(&Self::key_for(query))?;
        (now.saturating_duration_since(entry.inserted_at) < self.ttl)
            .then_some(entry.results.as_slice())
    }

    /// Store `results` for `query` as of `now`.
    ///
    /// Replacing an existing key never evicts. Inserting a new key into a
    /// full cache first drops the single oldest entry.
    pub fn insert(&mut self, query: &str, results: Vec<MemoryHit>, now: Instant) {
        let key = Self::key_for(query);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                inserted_at: now,
                results,
            },
        );
    }

    /// Number of stored entries, expired ones included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
