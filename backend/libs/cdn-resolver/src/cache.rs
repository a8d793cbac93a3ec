//! Resolution cache: one entry per logical resource, lazily expired.

use crate::registry::Origin;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// What a resolution settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Remote(Origin),
    LocalFallback,
}

#[derive(Debug, Clone)]
pub struct ResolutionEntry {
    pub resource_id: String,
    pub selection: Selection,
    pub url: String,
    pub resolved_at: Instant,
    pub ttl: Duration,
}

impl ResolutionEntry {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.resolved_at) > self.ttl
    }

    pub fn is_local(&self) -> bool {
        self.selection == Selection::LocalFallback
    }

    pub fn origin(&self) -> Option<&Origin> {
        match &self.selection {
            Selection::Remote(origin) => Some(origin),
            Selection::LocalFallback => None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Bumped by every invalidation
    epoch: u64,
    entry: Option<ResolutionEntry>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

/// Per-resource cache of resolution decisions.
///
/// Every read and write of a key happens under that key's shard lock, so a
/// reader never sees a partially written entry.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    slots: DashMap<String, Slot>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `id`; an expired entry is dropped and reported absent
    pub fn get(&self, id: &str) -> Option<ResolutionEntry> {
        let mut slot = self.slots.get_mut(id)?;
        let expired = slot.entry.as_ref()?.is_expired();
        if expired {
            debug!(resource = %id, "Resolution cache entry expired");
            slot.entry = None;
            return None;
        }
        slot.entry.clone()
    }

    /// Store `entry`, replacing whatever was cached for `id`
    pub fn put(&self, id: &str, entry: ResolutionEntry) {
        self.slots.entry(id.to_string()).or_default().entry = Some(entry);
    }

    /// Current invalidation epoch of `id`
    pub fn epoch(&self, id: &str) -> u64 {
        self.slots.get(id).map(|slot| slot.epoch).unwrap_or(0)
    }

    /// Store `entry` only if `id` was not invalidated since `epoch` was read.
    ///
    /// Returns `false` when the write was discarded as stale.
    pub fn put_if_current(&self, id: &str, entry: ResolutionEntry, epoch: u64) -> bool {
        let mut slot = self.slots.entry(id.to_string()).or_default();
        if slot.epoch != epoch {
            debug!(
                resource = %id,
                expected = epoch,
                current = slot.epoch,
                "Discarding stale resolution"
            );
            return false;
        }
        slot.entry = Some(entry);
        true
    }

    /// Drop the entry for `id` and reject writes from resolutions already in flight
    pub fn invalidate(&self, id: &str) -> bool {
        let mut slot = self.slots.entry(id.to_string()).or_default();
        slot.epoch += 1;
        let removed = slot.entry.take().is_some();
        if removed {
            info!(resource = %id, "Resolution cache invalidated");
        }
        removed
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        for mut slot in self.slots.iter_mut() {
            if slot.entry.as_ref().is_some_and(|e| e.is_expired_at(now)) {
                slot.entry = None;
                purged += 1;
            }
        }
        // Slots that were never invalidated carry no state worth keeping
        self.slots
            .retain(|_, slot| slot.entry.is_some() || slot.epoch > 0);

        if purged > 0 {
            debug!("Purged {} expired resolution entries", purged);
        }
        purged
    }

    /// Entries that have not expired yet
    pub fn active_entries(&self) -> Vec<ResolutionEntry> {
        let now = Instant::now();
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.clone())
            .filter(|entry| !entry.is_expired_at(now))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut total = 0;
        let mut expired = 0;
        for slot in self.slots.iter() {
            if let Some(entry) = &slot.entry {
                total += 1;
                if entry.is_expired_at(now) {
                    expired += 1;
                }
            }
        }

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }

    pub fn clear(&self) {
        let count = self.slots.len();
        self.slots.clear();
        info!("Resolution cache cleared: {} keys", count);
    }
}
