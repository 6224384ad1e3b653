//! Latest-snapshot perception buffer.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use pal_types::{NO_PERCEPTION_SCENE, PerceptionSnapshot};
use tracing::{debug, warn};

/// Snapshots older than this are reported with `stale` set.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Slot {
    snapshot: PerceptionSnapshot,
    updated_at: Option<Instant>,
}

/// Single-slot store for the most recent perception snapshot.
///
/// Every ingest overwrites the slot. Readers get an owned clone, so a cycle
/// always works on a consistent snapshot even while new messages arrive.
#[derive(Debug, Default)]
pub struct PerceptionBuffer {
    slot: Mutex<Slot>,
}

impl PerceptionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot.
    pub fn ingest(&self, snapshot: PerceptionSnapshot) {
        self.ingest_at(snapshot, Instant::now());
    }

    pub fn ingest_at(&self, snapshot: PerceptionSnapshot, now: Instant) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(
            objects = snapshot.object_count,
            has_person = snapshot.has_person,
            "perception updated"
        );
        slot.snapshot = snapshot;
        slot.updated_at = Some(now);
    }

    /// Normalise an inbound message and store it.
    ///
    /// Malformed messages are logged and dropped; the previous snapshot stays
    /// in place. Returns `true` when the message was accepted.
    pub fn ingest_value(&self, payload: &serde_json::Value) -> bool {
        match PerceptionSnapshot::from_value(payload) {
            Ok(snapshot) => {
                self.ingest(snapshot);
                true
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed perception message");
                false
            }
        }
    }

    /// Clone of the latest snapshot as of now.
    pub fn latest(&self) -> PerceptionSnapshot {
        self.latest_at(Instant::now())
    }

    /// Clone of the latest snapshot as seen at `now`.
    ///
    /// Before the first ingest this is [`PerceptionSnapshot::waiting`]. Once
    /// the stored snapshot is older than [`STALE_AFTER`] the clone carries
    /// `stale = true` and its `age` in seconds (one decimal).
    pub fn latest_at(&self, now: Instant) -> PerceptionSnapshot {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(updated_at) = slot.updated_at else {
            return PerceptionSnapshot::waiting();
        };

        let mut snapshot = slot.snapshot.clone();
        let age = now.saturating_duration_since(updated_at);
        if age > STALE_AFTER {
            snapshot.stale = true;
            snapshot.age = Some((age.as_secs_f64() * 10.0).round() / 10.0);
        }
        snapshot
    }

    /// `true` once at least one snapshot has been ingested.
    pub fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .updated_at
            .is_some()
    }
}
