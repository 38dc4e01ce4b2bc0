//! Replay cache of terminal outcomes keyed by idempotency key

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::outcome::SagaOutcome;

struct Entry {
    outcome: SagaOutcome,
    stored_at: Instant,
}

/// In-process memory of recent outcomes, bounded by a TTL
///
/// Not durable: after a restart or expiry the ledger's outcome journal is
/// the source of truth.
pub struct ReplayCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl ReplayCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<SagaOutcome> {
        {
            let entry = self.entries.get(key)?;
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.outcome.clone());
            }
        }
        self.entries
            .remove_if(key, |_, e| e.stored_at.elapsed() >= self.ttl);
        None
    }

    pub fn insert(&self, key: &str, outcome: SagaOutcome) {
        self.entries.insert(
            key.to_string(),
            Entry {
                outcome,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed = removed, "Replay cache purged");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_within_ttl() {
        let cache = ReplayCache::new(Duration::from_secs(60));
        cache.insert("K1", SagaOutcome::failed("same_party"));
        assert_eq!(cache.get("K1"), Some(SagaOutcome::failed("same_party")));
        assert_eq!(cache.get("K2"), None);
    }

    #[test]
    fn test_expired_entries_disappear() {
        let cache = ReplayCache::new(Duration::from_millis(20));
        cache.insert("K1", SagaOutcome::failed("below_min"));
        cache.insert("K2", SagaOutcome::failed("below_min"));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("K1"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
