//! RocksDB backing store for the Coinkeeper UTXO cache.
//!
//! ## Layout
//!
//! - **UTXO set**: one key per unspent output, O(1) lookups and batched multi-gets.
//! - **Rewind log**: the per-height rewind records written by the cache on flush.
//! - **Metadata**: tip of the persisted UTXO set and the number of unspent outputs.
//!
//! Every write goes through a single [`rocksdb::WriteBatch`], the store is never left
//! between two tips.

mod error;
mod storage;

pub use error::Error;
pub use storage::{RocksDbStore, UtxoIterator};

/// Result type for UTXO storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Column family names for RocksDB.
mod cf {
    /// Column family for UTXO entries.
    /// Key: OutPoint (txid || vout) = 36 bytes
    /// Value: Coin (bincode)
    pub const UTXOS: &str = "utxos";

    /// Column family for rewind records.
    /// Key: block height (u32, big-endian)
    /// Value: RewindRecord (bincode)
    pub const UNDO: &str = "undo";

    /// Column family for metadata.
    /// Keys: "tip_height", "tip_hash", "utxo_count"
    pub const META: &str = "meta";
}

/// Metadata keys.
mod meta_keys {
    pub const TIP_HEIGHT: &[u8] = b"tip_height";
    pub const TIP_HASH: &[u8] = b"tip_hash";
    pub const UTXO_COUNT: &[u8] = b"utxo_count";
}
