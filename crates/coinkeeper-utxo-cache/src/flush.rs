use std::time::{Duration, Instant};

/// Decides when the cache has to be written to the backing store.
#[derive(Debug)]
pub(crate) struct FlushController {
    interval: Duration,
    max_cache_bytes: usize,
    last_flush: Instant,
    flushes: u64,
}

impl FlushController {
    pub(crate) fn new(interval: Duration, max_cache_bytes: usize) -> Self {
        Self {
            interval,
            max_cache_bytes,
            last_flush: Instant::now(),
            flushes: 0,
        }
    }

    /// Whether `total_bytes` of cached coins and rewind data exceed the budget.
    pub(crate) fn is_over_limit(&self, total_bytes: usize) -> bool {
        total_bytes > self.max_cache_bytes
    }

    pub(crate) fn should_flush(&self, total_bytes: usize) -> bool {
        self.last_flush.elapsed() > self.interval || self.is_over_limit(total_bytes)
    }

    /// Restarts the interval without counting a write, used when there was nothing to flush.
    pub(crate) fn reset_timer(&mut self) {
        self.last_flush = Instant::now();
    }

    pub(crate) fn on_flushed(&mut self) {
        self.reset_timer();
        self.flushes += 1;
    }

    pub(crate) fn flushes(&self) -> u64 {
        self.flushes
    }
}
