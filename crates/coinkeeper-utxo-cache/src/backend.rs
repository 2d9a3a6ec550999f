//! Interfaces of the collaborators the cache calls into.

use bitcoin::OutPoint;
use coinkeeper_primitives::{ChainTip, Coin, RewindRecord};
use std::collections::HashMap;

/// Error type returned by the collaborators.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// A modified output handed to the backing store on flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    /// Output reference.
    pub outpoint: OutPoint,
    /// New state of the output, `None` if it must be deleted.
    pub coin: Option<Coin>,
}

/// Durable store of the UTXO set and of the per-height rewind log.
pub trait BackingStore: Send + Sync {
    /// Returns the tip the persisted UTXO set corresponds to.
    fn tip(&self) -> Result<ChainTip, BackendError>;

    /// Query coins by outpoints.
    ///
    /// Returns a vector of the same length as the input, with `Some(Coin)` for
    /// UTXOs that exist and `None` for those that don't.
    fn fetch_coins(&self, outpoints: &[OutPoint]) -> Result<Vec<Option<Coin>>, BackendError>;

    /// Atomically applies `modified` together with `rewind_records`, moving the tip from
    /// `old_tip` to `new_tip`.
    ///
    /// Must be rejected if `old_tip` is not the current tip of the store.
    fn save_changes(
        &self,
        modified: &[OutputEntry],
        old_tip: ChainTip,
        new_tip: ChainTip,
        rewind_records: &[RewindRecord],
    ) -> Result<(), BackendError>;

    /// Undoes exactly one block using the persisted rewind log and returns the new tip.
    fn rewind(&self) -> Result<ChainTip, BackendError>;

    /// Returns the persisted rewind record at `height`, if any.
    fn rewind_data(&self, height: u32) -> Result<Option<RewindRecord>, BackendError>;
}

/// Index from spent outpoints to the height of the rewind record that restores them.
///
/// Proof-of-stake chains use it to look up the spent coin of a stake without scanning
/// the rewind log.
pub trait RewindIndexCache: Send + Sync {
    /// Records the outputs spent by a block.
    fn save(&self, items: HashMap<OutPoint, u32>);

    /// Called once the cache has been flushed up to `tip_height`.
    fn flush(&self, tip_height: u32);

    /// Called once the block at `height` has been rewound.
    fn remove(&self, height: u32);
}

/// Store of the proof-of-stake chain data, flushed together with the coins.
pub trait StakeChainStore: Send + Sync {
    /// Persists the pending stake data.
    fn flush(&self, force: bool) -> Result<(), BackendError>;
}
