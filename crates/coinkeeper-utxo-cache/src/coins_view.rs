//! Write-back coins cache between block validation and the backing store.
//!
//! All mutable state lives behind a single lock which is held for the whole duration
//! of every operation, backing store calls included. This makes "check the cache,
//! fetch the missing coins, populate the cache" atomic with respect to a concurrent
//! block application or eviction.

use crate::backend::{BackingStore, RewindIndexCache, StakeChainStore};
use crate::cache::CoinCache;
use crate::change::OutputChange;
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::flush::FlushController;
use crate::metrics::{CacheStats, StatsSink};
use crate::rewind_window::{RewindWindow, retention_depth};
use crate::{Error, Result};
use bitcoin::OutPoint;
use coinkeeper_primitives::{ChainParams, ChainTip, Coin, RewindRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "utxo_cache";

/// Undo bookkeeping of the block being applied.
struct PendingUndo {
    record: RewindRecord,
    /// Outputs added by this block so far.
    created: HashSet<OutPoint>,
    /// Outputs spent by this block, reported to the rewind index.
    spent: HashMap<OutPoint, u32>,
}

struct Inner {
    cache: CoinCache,
    window: RewindWindow,
    flush: FlushController,
    cache_tip: Option<ChainTip>,
    backing_tip: Option<ChainTip>,
    rng: fastrand::Rng,
}

impl Inner {
    fn total_bytes(&self) -> usize {
        self.cache.size_bytes() + self.window.size_bytes()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.cache.hits(),
            misses: self.cache.misses(),
            entries: self.cache.len(),
            dirty: self.cache.dirty_count(),
            cache_bytes: self.cache.size_bytes(),
            rewind_window_bytes: self.window.size_bytes(),
            rewind_window_len: self.window.len(),
            flushes: self.flush.flushes(),
        }
    }

    fn spend(&mut self, outpoint: OutPoint, undo: &mut PendingUndo) -> Result<()> {
        let Some(entry) = self.cache.get(&outpoint) else {
            return Ok(());
        };
        let exists_in_backing = entry.exists_in_backing;

        if entry.coin.is_none() {
            if exists_in_backing {
                return Err(Error::CoinMismatch(outpoint));
            }
            // Never persisted and already gone, nothing durable changes.
            self.cache.remove(&outpoint);
            return Ok(());
        }

        let Some(coin) = self
            .cache
            .modify(&outpoint, |entry| {
                entry.dirty = true;
                entry.coin.take()
            })
            .flatten()
        else {
            return Ok(());
        };

        if undo.created.remove(&outpoint) {
            // Created and spent by the same block, a rewind has nothing to restore.
            undo.record.unrecord_create(&outpoint);
        } else {
            undo.spent.insert(outpoint, undo.record.height);
            undo.record.record_spend(outpoint, coin);
        }

        if !exists_in_backing {
            self.cache.remove(&outpoint);
        }

        Ok(())
    }

    fn add(&mut self, outpoint: OutPoint, coin: Coin, undo: &mut PendingUndo) -> Result<()> {
        if let Some(existing) = self.cache.get(&outpoint).and_then(|entry| entry.coin.as_ref()) {
            // Duplicate coinbase txids (BIP30) may overwrite an earlier unspent coinbase.
            if !existing.is_coinbase {
                return Err(Error::InvalidOverride(outpoint));
            }
            tracing::warn!(target: LOG_TARGET, ?outpoint, "Overriding unspent coinbase output");
        }

        self.cache.modify(&outpoint, |entry| {
            entry.coin = Some(coin);
            entry.dirty = true;
        });

        if undo.created.insert(outpoint) {
            undo.record.record_create(outpoint);
        }

        Ok(())
    }
}

/// Cached view of the UTXO set backed by a [`BackingStore`].
pub struct CachedCoinsView<B> {
    backend: Arc<B>,
    chain_params: ChainParams,
    eviction_one_in: u32,
    inner: Mutex<Inner>,
    rewind_index: Option<Arc<dyn RewindIndexCache>>,
    stake_chain: Option<Arc<dyn StakeChainStore>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
}

impl<B: BackingStore> CachedCoinsView<B> {
    /// Constructs a new instance of [`CachedCoinsView`].
    pub fn new(backend: Arc<B>, chain_params: ChainParams, config: CacheConfig) -> Self {
        let inner = Inner {
            cache: CoinCache::default(),
            window: RewindWindow::default(),
            flush: FlushController::new(config.flush_interval, config.max_cache_bytes),
            cache_tip: None,
            backing_tip: None,
            rng: config.rng(),
        };

        Self {
            backend,
            chain_params,
            eviction_one_in: config.eviction_one_in.max(1),
            inner: Mutex::new(inner),
            rewind_index: None,
            stake_chain: None,
            stats_sink: None,
        }
    }

    /// Attaches a rewind data index.
    pub fn with_rewind_index(mut self, rewind_index: Arc<dyn RewindIndexCache>) -> Self {
        self.rewind_index = Some(rewind_index);
        self
    }

    /// Attaches a proof-of-stake chain store flushed together with the coins.
    pub fn with_stake_chain(mut self, stake_chain: Arc<dyn StakeChainStore>) -> Self {
        self.stake_chain = Some(stake_chain);
        self
    }

    /// Attaches a receiver of the cache statistics.
    pub fn with_stats_sink(mut self, stats_sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(stats_sink);
        self
    }

    /// Returns the backing store.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns the tip of the cache, loading it from the backing store on first use.
    pub fn tip(&self) -> Result<ChainTip> {
        let mut inner = self.inner.lock();
        self.load_tip(&mut inner)
    }

    /// Returns the state of every requested output.
    ///
    /// `None` means the output does not exist or is known to be spent.
    pub fn fetch(&self, outpoints: &[OutPoint]) -> Result<HashMap<OutPoint, Option<Coin>>> {
        let mut inner = self.inner.lock();

        let mut coins = HashMap::with_capacity(outpoints.len());
        let mut missing = Vec::new();

        for outpoint in outpoints {
            match inner.cache.lookup(outpoint) {
                Some(coin) => {
                    coins.insert(*outpoint, coin);
                }
                None => missing.push(*outpoint),
            }
        }

        if !missing.is_empty() {
            coins.extend(self.fetch_missing(&mut inner, missing)?);
            self.evict_if_needed(&mut inner);
        }

        Ok(coins)
    }

    /// Warms the cache with `outpoints` ahead of block validation.
    pub fn prefetch(&self, outpoints: &[OutPoint]) -> Result<()> {
        let mut inner = self.inner.lock();

        let missing = outpoints
            .iter()
            .filter(|outpoint| !inner.cache.probe(outpoint))
            .copied()
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            self.fetch_missing(&mut inner, missing)?;
            self.evict_if_needed(&mut inner);
        }

        Ok(())
    }

    /// Applies the UTXO changes of the block `new_tip`, built on top of `old_tip`.
    ///
    /// Errors other than [`Error::TipMismatch`] leave the cache partially updated and
    /// must be treated as fatal.
    pub fn save_changes(
        &self,
        changes: &[OutputChange],
        old_tip: ChainTip,
        new_tip: ChainTip,
    ) -> Result<()> {
        let mut inner = self.inner.lock();

        let expected = self.load_tip(&mut inner)?;
        if expected != old_tip {
            return Err(Error::TipMismatch {
                expected,
                got: old_tip,
            });
        }
        inner.cache_tip = Some(new_tip);

        let mut undo = PendingUndo {
            record: RewindRecord::new(new_tip.height, old_tip),
            created: HashSet::new(),
            spent: HashMap::new(),
        };

        for change in changes {
            let outpoint = change.outpoint;

            if !inner.cache.contains(&outpoint) {
                if !change.created_from_block {
                    // Evicted or never loaded, the coin has to be read back.
                    self.fetch_missing(&mut inner, vec![outpoint])?;
                }
                if !inner.cache.contains(&outpoint) {
                    inner.cache.insert(CacheEntry::unknown(outpoint));
                }
            }

            match &change.coin {
                None => inner.spend(outpoint, &mut undo)?,
                Some(coin) => inner.add(outpoint, coin.clone(), &mut undo)?,
            }
        }

        let PendingUndo { record, spent, .. } = undo;

        tracing::debug!(
            target: LOG_TARGET,
            "Saved block {new_tip}: {} spent, {} created, {} cached coins",
            record.outputs_to_restore.len(),
            record.outputs_to_remove.len(),
            inner.cache.len(),
        );

        inner.window.push(record);
        let retention = retention_depth(&self.chain_params, new_tip.height);
        inner.window.trim(new_tip.height, retention);

        if let Some(rewind_index) = &self.rewind_index {
            if !spent.is_empty() {
                rewind_index.save(spent);
            }
        }

        self.report(&inner);

        Ok(())
    }

    /// Writes the dirty coins and the rewind window to the backing store.
    ///
    /// Unless `force` is set, this only happens once the flush interval elapsed or the
    /// memory budget is exceeded.
    pub fn flush(&self, force: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        self.flush_locked(&mut inner, force)
    }

    /// Disconnects the tip block and returns the new tip.
    pub fn rewind(&self) -> Result<ChainTip> {
        let mut inner = self.inner.lock();

        self.flush_locked(&mut inner, true)?;

        let tip = self.backend.rewind().map_err(Error::Backend)?;

        let dirty = inner.cache.dirty_count();
        if dirty > 0 {
            tracing::error!(
                target: LOG_TARGET,
                "{dirty} dirty entries survived the flush before rewind"
            );
            return Err(Error::DirtyOnRewind(dirty));
        }

        // Every remaining entry is clean and can be read back from the backing store.
        inner.cache.clear();
        inner.window.clear();
        inner.cache_tip = Some(tip);
        inner.backing_tip = Some(tip);

        if let Some(rewind_index) = &self.rewind_index {
            rewind_index.remove(tip.height + 1);
        }

        tracing::info!(target: LOG_TARGET, "Rewound UTXO cache to {tip}");

        self.report(&inner);

        Ok(tip)
    }

    /// Returns the rewind record at `height`, from memory if not flushed yet.
    pub fn rewind_data(&self, height: u32) -> Result<Option<RewindRecord>> {
        let inner = self.inner.lock();

        if let Some(record) = inner.window.get(height) {
            return Ok(Some(record.clone()));
        }

        self.backend.rewind_data(height).map_err(Error::Backend)
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    /// Returns the cache tip, initializing both tips from the backing store on first use.
    fn load_tip(&self, inner: &mut Inner) -> Result<ChainTip> {
        if let Some(tip) = inner.cache_tip {
            return Ok(tip);
        }

        let tip = self.backend.tip().map_err(Error::Backend)?;
        inner.cache_tip = Some(tip);
        inner.backing_tip = Some(tip);

        Ok(tip)
    }

    fn flush_locked(&self, inner: &mut Inner, force: bool) -> Result<()> {
        if !force && !inner.flush.should_flush(inner.total_bytes()) {
            return Ok(());
        }

        // Both tips are loaded together before the first block is applied.
        let (Some(cache_tip), Some(backing_tip)) = (inner.cache_tip, inner.backing_tip) else {
            return Ok(());
        };

        let modified = inner.cache.dirty_entries();

        if modified.is_empty() && inner.window.is_empty() && backing_tip == cache_tip {
            inner.flush.reset_timer();
            return Ok(());
        }

        let now = Instant::now();

        self.backend
            .save_changes(&modified, backing_tip, cache_tip, inner.window.records())
            .map_err(Error::Backend)?;

        inner.cache.mark_flushed();
        let rewind_records = inner.window.len();
        inner.window.clear();
        inner.backing_tip = Some(cache_tip);
        inner.flush.on_flushed();

        if let Some(rewind_index) = &self.rewind_index {
            rewind_index.flush(cache_tip.height);
        }

        if let Some(stake_chain) = &self.stake_chain {
            stake_chain.flush(true).map_err(Error::Backend)?;
        }

        tracing::info!(
            target: LOG_TARGET,
            "Flushed {} coins and {rewind_records} rewind records at {cache_tip} in {}ms",
            modified.len(),
            now.elapsed().as_millis(),
        );

        self.report(inner);

        Ok(())
    }

    /// Reads `missing` from the backing store in one batch and caches the existing coins.
    fn fetch_missing(
        &self,
        inner: &mut Inner,
        mut missing: Vec<OutPoint>,
    ) -> Result<Vec<(OutPoint, Option<Coin>)>> {
        missing.sort_unstable();
        missing.dedup();

        let coins = self.backend.fetch_coins(&missing).map_err(Error::Backend)?;

        if coins.len() != missing.len() {
            return Err(Error::InvalidFetchResponse {
                requested: missing.len(),
                got: coins.len(),
            });
        }

        inner.cache.record_misses(missing.len());

        for (outpoint, coin) in missing.iter().zip(&coins) {
            if let Some(coin) = coin {
                inner
                    .cache
                    .insert(CacheEntry::persisted(*outpoint, coin.clone()));
            }
        }

        Ok(missing.into_iter().zip(coins).collect())
    }

    fn evict_if_needed(&self, inner: &mut Inner) {
        if !inner.flush.is_over_limit(inner.total_bytes()) {
            return;
        }

        let Inner { cache, rng, .. } = inner;
        let evicted = cache.evict(rng, self.eviction_one_in);

        tracing::debug!(
            target: LOG_TARGET,
            "Evicted {evicted} coins, cache size: {} bytes",
            cache.size_bytes(),
        );
    }

    fn report(&self, inner: &Inner) {
        if let Some(stats_sink) = &self.stats_sink {
            stats_sink.report(&inner.stats());
        }
    }
}
