//! Per-customer read cache for receivable lists.
//!
//! Entries are filled on read and dropped by every write path once the write
//! has committed. A fill carries the customer's version as it was before the
//! store was read; if any invalidation happened since, the fill is discarded.
//! A disabled cache never stores anything.

use crate::models::Receivable;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Version of one customer's entry, taken before reading the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheVersion(u64);

#[derive(Debug, Default)]
pub struct ReceivableCache {
    enabled: bool,
    entries: DashMap<Uuid, Vec<Receivable>>,
    versions: DashMap<Uuid, u64>,
}

impl ReceivableCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
            versions: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, customer_id: &Uuid) -> Option<Vec<Receivable>> {
        if !self.enabled {
            return None;
        }
        self.entries.get(customer_id).map(|entry| entry.value().clone())
    }

    /// Take before reading the store. Registers the customer so that
    /// `clear` also bumps it.
    pub fn version(&self, customer_id: &Uuid) -> CacheVersion {
        if !self.enabled {
            return CacheVersion(0);
        }
        CacheVersion(*self.versions.entry(*customer_id).or_insert(0))
    }

    /// Store `receivables` unless the customer was invalidated after
    /// `version` was taken. Returns whether the entry was stored.
    pub fn put(&self, customer_id: Uuid, receivables: Vec<Receivable>, version: CacheVersion) -> bool {
        if !self.enabled {
            return false;
        }
        // The version guard is held across the insert so an invalidation
        // either lands before the check or removes the entry afterwards.
        let current = self.versions.entry(customer_id).or_insert(0);
        if *current != version.0 {
            debug!(customer_id = %customer_id, "Discarding stale receivable cache fill");
            return false;
        }
        self.entries.insert(customer_id, receivables);
        drop(current);
        true
    }

    pub fn invalidate(&self, customer_id: &Uuid) {
        if !self.enabled {
            return;
        }
        *self.versions.entry(*customer_id).or_insert(0) += 1;
        if self.entries.remove(customer_id).is_some() {
            debug!(customer_id = %customer_id, "Receivable cache entry invalidated");
        }
    }

    pub fn clear(&self) {
        for mut version in self.versions.iter_mut() {
            *version += 1;
        }
        self.entries.clear();
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
    fn test_disabled_cache_stores_nothing() {
        let cache = ReceivableCache::disabled();
        let customer_id = Uuid::new_v4();
        let version = cache.version(&customer_id);
        assert!(!cache.put(customer_id, Vec::new(), version));
        assert!(cache.get(&customer_id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_drops_only_that_customer() {
        let cache = ReceivableCache::new(true);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, Vec::new(), cache.version(&a));
        cache.put(b, Vec::new(), cache.version(&b));

        cache.invalidate(&a);

        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fill_read_before_an_invalidation_is_discarded() {
        let cache = ReceivableCache::new(true);
        let customer_id = Uuid::new_v4();

        let version = cache.version(&customer_id);
        // A write commits and invalidates while the listing is in flight.
        cache.invalidate(&customer_id);

        assert!(!cache.put(customer_id, Vec::new(), version));
        assert!(cache.get(&customer_id).is_none());

        let fresh = cache.version(&customer_id);
        assert!(cache.put(customer_id, Vec::new(), fresh));
        assert!(cache.get(&customer_id).is_some());
    }

    #[test]
    fn test_clear_discards_fills_in_flight() {
        let cache = ReceivableCache::new(true);
        let customer_id = Uuid::new_v4();

        let version = cache.version(&customer_id);
        cache.clear();

        assert!(!cache.put(customer_id, Vec::new(), version));
        assert!(cache.is_empty());
    }
}
