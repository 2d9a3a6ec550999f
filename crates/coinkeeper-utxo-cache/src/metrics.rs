use substrate_prometheus_endpoint::{Gauge, PrometheusError, Registry, U64, register};

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required a backing store read.
    pub misses: u64,
    /// Number of cached entries.
    pub entries: usize,
    /// Number of entries not yet written to the backing store.
    pub dirty: usize,
    /// Accounted size of the cached entries.
    pub cache_bytes: usize,
    /// Accounted size of the in-memory rewind records.
    pub rewind_window_bytes: usize,
    /// Number of in-memory rewind records.
    pub rewind_window_len: usize,
    /// Number of flushes performed since start.
    pub flushes: u64,
}

/// Receiver of cache statistics, e.g. a metrics exporter or an informant.
pub trait StatsSink: Send + Sync {
    /// Called with a fresh snapshot after every state-changing operation.
    fn report(&self, stats: &CacheStats);
}

/// Prometheus gauges mirroring [`CacheStats`].
pub struct Metrics {
    cache_hits: Gauge<U64>,
    cache_misses: Gauge<U64>,
    cache_entries: Gauge<U64>,
    dirty_entries: Gauge<U64>,
    cache_size: Gauge<U64>,
    rewind_window_size: Gauge<U64>,
    flushes: Gauge<U64>,
}

impl Metrics {
    pub fn register(registry: &Registry) -> Result<Self, PrometheusError> {
        Ok(Self {
            cache_hits: register(
                Gauge::new("coinkeeper_utxo_cache_hits", "Number of UTXO cache hits")?,
                registry,
            )?,
            cache_misses: register(
                Gauge::new("coinkeeper_utxo_cache_misses", "Number of UTXO cache misses")?,
                registry,
            )?,
            cache_entries: register(
                Gauge::new(
                    "coinkeeper_utxo_cache_entries",
                    "Number of outputs held in the UTXO cache",
                )?,
                registry,
            )?,
            dirty_entries: register(
                Gauge::new(
                    "coinkeeper_utxo_cache_dirty_entries",
                    "Number of cached outputs not yet flushed to disk",
                )?,
                registry,
            )?,
            cache_size: register(
                Gauge::new(
                    "coinkeeper_utxo_cache_size_bytes",
                    "Accounted size of the UTXO cache in bytes",
                )?,
                registry,
            )?,
            rewind_window_size: register(
                Gauge::new(
                    "coinkeeper_utxo_cache_rewind_window_bytes",
                    "Accounted size of the in-memory rewind data in bytes",
                )?,
                registry,
            )?,
            flushes: register(
                Gauge::new("coinkeeper_utxo_cache_flushes", "Number of UTXO cache flushes")?,
                registry,
            )?,
        })
    }
}

impl StatsSink for Metrics {
    fn report(&self, stats: &CacheStats) {
        self.cache_hits.set(stats.hits);
        self.cache_misses.set(stats.misses);
        self.cache_entries.set(stats.entries as u64);
        self.dirty_entries.set(stats.dirty as u64);
        self.cache_size.set(stats.cache_bytes as u64);
        self.rewind_window_size.set(stats.rewind_window_bytes as u64);
        self.flushes.set(stats.flushes);
    }
}
