use bitcoin::OutPoint;
use coinkeeper_primitives::{Coin, OUTPOINT_SIZE};

/// Fixed part of a cache entry: the outpoint and the two flags.
const ENTRY_FIXED_SIZE: usize = OUTPOINT_SIZE + 2;

/// Cached state of a single output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Output reference.
    pub outpoint: OutPoint,
    /// Current state of the output, `None` if it is spent.
    pub coin: Option<Coin>,
    /// Whether the backing store holds a record for this output.
    pub exists_in_backing: bool,
    /// Whether `coin` differs from what the backing store holds.
    pub dirty: bool,
}

impl CacheEntry {
    /// Entry for a coin loaded from the backing store.
    pub fn persisted(outpoint: OutPoint, coin: Coin) -> Self {
        Self {
            outpoint,
            coin: Some(coin),
            exists_in_backing: true,
            dirty: false,
        }
    }

    /// Placeholder for an output the backing store has never seen.
    ///
    /// It must receive a coin or be removed before the cache lock is released.
    pub fn unknown(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            coin: None,
            exists_in_backing: false,
            dirty: false,
        }
    }

    /// Only clean entries already in the backing store can be re-fetched after eviction.
    pub fn is_evictable(&self) -> bool {
        !self.dirty && self.exists_in_backing
    }

    /// Returns the number of bytes this entry accounts for.
    pub fn size_in_bytes(&self) -> usize {
        ENTRY_FIXED_SIZE + self.coin.as_ref().map_or(0, Coin::size_in_bytes)
    }
}
