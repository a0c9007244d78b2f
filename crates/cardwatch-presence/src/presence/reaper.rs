//! Read-time staleness filtering for viewing and editing lists.
//!
//! There is no background sweep. Reads hide entries older than the TTL
//! but never delete them; a stale entry stays in the store until the next
//! write to its key replaces or removes it.

use super::store::PresenceStore;
use super::types::{IndicatorEntry, ResourceKey};

/// Whether an entry is younger than `ttl_ms` at `now_ms`. Entries without
/// a receive time never expire.
pub fn is_fresh(entry: &IndicatorEntry, now_ms: i64, ttl_ms: i64) -> bool {
    match entry.received_at {
        Some(received) => now_ms - received < ttl_ms,
        None => true,
    }
}

pub fn fresh_entries(entries: &[IndicatorEntry], now_ms: i64, ttl_ms: i64) -> Vec<IndicatorEntry> {
    entries
        .iter()
        .filter(|e| is_fresh(e, now_ms, ttl_ms))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessReaper {
    pub viewing_ttl_ms: i64,
    pub editing_ttl_ms: i64,
}

impl Default for StalenessReaper {
    fn default() -> Self {
        Self {
            viewing_ttl_ms: 60_000,
            editing_ttl_ms: 120_000,
        }
    }
}

impl StalenessReaper {
    pub fn new(viewing_ttl_ms: i64, editing_ttl_ms: i64) -> Self {
        Self {
            viewing_ttl_ms,
            editing_ttl_ms,
        }
    }

    pub fn viewing_users(
        &self,
        store: &PresenceStore,
        key: &ResourceKey,
        now_ms: i64,
    ) -> Vec<IndicatorEntry> {
        fresh_entries(store.viewing_entries(key), now_ms, self.viewing_ttl_ms)
    }

    pub fn editing_users(
        &self,
        store: &PresenceStore,
        key: &ResourceKey,
        now_ms: i64,
    ) -> Vec<IndicatorEntry> {
        fresh_entries(store.editing_entries(key), now_ms, self.editing_ttl_ms)
    }
}
