//! Error types for the UTXO cache.

use crate::BackendError;
use bitcoin::OutPoint;
use coinkeeper_primitives::ChainTip;

/// Errors that can occur during UTXO cache operations.
///
/// None of them are recoverable locally, the block processing must stop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tip supplied to `save_changes` is not the tip of the cache.
    #[error("Tip mismatch: cache is at {expected}, got {got}")]
    TipMismatch { expected: ChainTip, got: ChainTip },

    /// A coin known to the backing store is already spent in the cache.
    #[error("Coin mismatch: {0} is persisted but already spent")]
    CoinMismatch(OutPoint),

    /// A non-coinbase coin would be overwritten.
    #[error("Invalid override of unspent non-coinbase output {0}")]
    InvalidOverride(OutPoint),

    /// Dirty entries survived the flush preceding a rewind.
    #[error("{0} dirty cache entries found on rewind")]
    DirtyOnRewind(usize),

    /// The backing store answered a fetch with the wrong number of coins.
    #[error("Invalid fetch response: requested {requested} coins, got {got}")]
    InvalidFetchResponse { requested: usize, got: usize },

    /// Backing store error.
    #[error("Backing store error: {0}")]
    Backend(#[source] BackendError),
}
