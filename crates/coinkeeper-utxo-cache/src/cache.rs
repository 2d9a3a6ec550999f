use crate::backend::OutputEntry;
use crate::entry::CacheEntry;
use bitcoin::OutPoint;
use coinkeeper_primitives::Coin;
use std::collections::HashMap;

/// In-memory map of cached outputs with byte and dirtiness accounting.
///
/// Every mutation goes through this type so that `size_bytes` and `dirty_count`
/// never need a rescan of the entries.
#[derive(Debug, Default)]
pub(crate) struct CoinCache {
    entries: HashMap<OutPoint, CacheEntry>,
    size_bytes: usize,
    dirty_count: usize,
    hits: u64,
    misses: u64,
}

impl CoinCache {
    /// Returns the cached state of `outpoint` and records a hit, or `None` on miss.
    ///
    /// Misses are recorded by the caller once the batch of missing outpoints is known.
    pub(crate) fn lookup(&mut self, outpoint: &OutPoint) -> Option<Option<Coin>> {
        let coin = self.entries.get(outpoint).map(|entry| entry.coin.clone())?;
        self.hits += 1;
        Some(coin)
    }

    /// Records a hit and returns `true` if `outpoint` is cached, without cloning it.
    pub(crate) fn probe(&mut self, outpoint: &OutPoint) -> bool {
        let cached = self.entries.contains_key(outpoint);
        if cached {
            self.hits += 1;
        }
        cached
    }

    pub(crate) fn get(&self, outpoint: &OutPoint) -> Option<&CacheEntry> {
        self.entries.get(outpoint)
    }

    pub(crate) fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub(crate) fn record_misses(&mut self, count: usize) {
        self.misses += count as u64;
    }

    pub(crate) fn insert(&mut self, entry: CacheEntry) {
        self.account_added(&entry);
        if let Some(old) = self.entries.insert(entry.outpoint, entry) {
            self.account_removed(&old);
        }
    }

    pub(crate) fn remove(&mut self, outpoint: &OutPoint) -> Option<CacheEntry> {
        let entry = self.entries.remove(outpoint)?;
        self.account_removed(&entry);
        Some(entry)
    }

    /// Mutates the entry of `outpoint` in place, keeping the accounting exact.
    pub(crate) fn modify<R>(
        &mut self,
        outpoint: &OutPoint,
        f: impl FnOnce(&mut CacheEntry) -> R,
    ) -> Option<R> {
        let entry = self.entries.get_mut(outpoint)?;

        let old_size = entry.size_in_bytes();
        let was_dirty = entry.dirty;

        let result = f(entry);

        self.size_bytes = self.size_bytes - old_size + entry.size_in_bytes();
        match (was_dirty, entry.dirty) {
            (false, true) => self.dirty_count += 1,
            (true, false) => self.dirty_count -= 1,
            _ => {}
        }

        Some(result)
    }

    /// Returns the dirty entries ordered by outpoint.
    pub(crate) fn dirty_entries(&self) -> Vec<OutputEntry> {
        let mut modified = self
            .entries
            .values()
            .filter(|entry| entry.dirty)
            .map(|entry| OutputEntry {
                outpoint: entry.outpoint,
                coin: entry.coin.clone(),
            })
            .collect::<Vec<_>>();
        modified.sort_unstable_by_key(|entry| entry.outpoint);
        modified
    }

    /// Marks every dirty entry as durably written.
    pub(crate) fn mark_flushed(&mut self) -> usize {
        let mut flushed = 0;
        for entry in self.entries.values_mut().filter(|entry| entry.dirty) {
            entry.dirty = false;
            entry.exists_in_backing = true;
            flushed += 1;
        }
        self.dirty_count = 0;
        flushed
    }

    /// Evicts each clean persisted entry with a probability of `1 / one_in`.
    ///
    /// Returns the number of evicted entries.
    pub(crate) fn evict(&mut self, rng: &mut fastrand::Rng, one_in: u32) -> usize {
        let size_bytes = &mut self.size_bytes;
        let before = self.entries.len();

        self.entries.retain(|_, entry| {
            if entry.is_evictable() && rng.u32(..one_in) == 0 {
                *size_bytes -= entry.size_in_bytes();
                false
            } else {
                true
            }
        });

        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
        self.dirty_count = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub(crate) fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses
    }

    fn account_added(&mut self, entry: &CacheEntry) {
        self.size_bytes += entry.size_in_bytes();
        if entry.dirty {
            self.dirty_count += 1;
        }
    }

    fn account_removed(&mut self, entry: &CacheEntry) {
        self.size_bytes -= entry.size_in_bytes();
        if entry.dirty {
            self.dirty_count -= 1;
        }
    }
}
