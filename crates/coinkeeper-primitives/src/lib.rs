//! Primitives shared by the Coinkeeper UTXO cache, its backing stores and the node.

mod chain_params;
mod coin;
mod rewind;

use bitcoin::constants::genesis_block;
use bitcoin::{BlockHash, Network};
use serde::{Deserialize, Serialize};

pub use bitcoin::OutPoint;
pub use chain_params::ChainParams;
pub use coin::Coin;
pub use rewind::RewindRecord;

/// Size of an [`OutPoint`] in the accounting model: txid (32 bytes) || vout (4 bytes).
pub const OUTPOINT_SIZE: usize = 36;

/// Reference to a block on the chain, identified by its height and hash.
///
/// Used for both the tip of the in-memory cache and the tip of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTip {
    /// Block height.
    pub height: u32,
    /// Block hash.
    pub hash: BlockHash,
}

impl ChainTip {
    /// Constructs a new instance of [`ChainTip`].
    pub fn new(height: u32, hash: BlockHash) -> Self {
        Self { height, hash }
    }

    /// Returns the tip of a chain that only contains the genesis block of `network`.
    pub fn genesis(network: Network) -> Self {
        Self {
            height: 0,
            hash: genesis_block(network).block_hash(),
        }
    }
}

impl std::fmt::Display for ChainTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{},{}", self.height, self.hash)
    }
}
