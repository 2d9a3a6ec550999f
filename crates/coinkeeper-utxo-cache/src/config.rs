use std::time::Duration;

/// Configuration options for the coins cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Memory budget for cached coins plus in-memory rewind data, in bytes.
    pub max_cache_bytes: usize,

    /// Maximum time between two flushes to the backing store.
    pub flush_interval: Duration,

    /// Each evictable entry is dropped with a probability of one in `eviction_one_in`
    /// during an eviction pass.
    pub eviction_one_in: u32,

    /// Seed of the eviction RNG, a random seed is used if `None`.
    pub rng_seed: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 200 << 20, // 200 MiB
            flush_interval: Duration::from_secs(60),
            eviction_one_in: 3,
            rng_seed: None,
        }
    }
}

impl CacheConfig {
    /// Create a builder for configuring the cache.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Returns the eviction RNG described by this configuration.
    pub(crate) fn rng(&self) -> fastrand::Rng {
        match self.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}

/// Builder pattern for [`CacheConfig`].
#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set the memory budget in bytes.
    pub fn max_cache_bytes(mut self, bytes: usize) -> Self {
        self.config.max_cache_bytes = bytes;
        self
    }

    /// Set the memory budget in MiB.
    pub fn max_cache_size_mb(self, size: usize) -> Self {
        self.max_cache_bytes(size << 20)
    }

    /// Set the maximum time between two flushes.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the eviction probability to one in `one_in`, `0` is treated as `1`.
    pub fn eviction_one_in(mut self, one_in: u32) -> Self {
        self.config.eviction_one_in = one_in.max(1);
        self
    }

    /// Seed the eviction RNG.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Build the final [`CacheConfig`].
    pub fn build(self) -> CacheConfig {
        self.config
    }
}
