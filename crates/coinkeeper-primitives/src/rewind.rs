//! Per-block rewind data for chain reorganizations.
//!
//! When a block is applied, we save the coins that were spent and the outpoints
//! that were created. This allows us to revert the block if needed during a reorg.

use crate::{ChainTip, Coin, OUTPOINT_SIZE};
use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};

/// Fixed part of a rewind record: height (4) + previous tip height (4) and hash (32).
const RECORD_FIXED_SIZE: usize = 40;

/// Undo data for a single block.
///
/// Contains all information needed to go from `height` back to `previous_tip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindRecord {
    /// Height of the block this record undoes.
    pub height: u32,
    /// Tip of the chain before the block was applied.
    pub previous_tip: ChainTip,
    /// Coins that were spent in this block.
    /// These need to be restored when reverting.
    pub outputs_to_restore: Vec<(OutPoint, Coin)>,
    /// Outpoints that were created in this block.
    /// These need to be removed when reverting.
    pub outputs_to_remove: Vec<OutPoint>,
}

impl RewindRecord {
    /// Create a new empty RewindRecord.
    pub fn new(height: u32, previous_tip: ChainTip) -> Self {
        Self {
            height,
            previous_tip,
            outputs_to_restore: Vec::new(),
            outputs_to_remove: Vec::new(),
        }
    }

    /// Record a spent coin.
    pub fn record_spend(&mut self, outpoint: OutPoint, coin: Coin) {
        self.outputs_to_restore.push((outpoint, coin));
    }

    /// Record a created output.
    pub fn record_create(&mut self, outpoint: OutPoint) {
        self.outputs_to_remove.push(outpoint);
    }

    /// Forget a created output, used when it is spent again within the same block.
    ///
    /// Returns `true` if the outpoint had been recorded.
    pub fn unrecord_create(&mut self, outpoint: &OutPoint) -> bool {
        match self.outputs_to_remove.iter().rposition(|o| o == outpoint) {
            Some(index) => {
                self.outputs_to_remove.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of bytes this record accounts for.
    pub fn size_in_bytes(&self) -> usize {
        let restore = self
            .outputs_to_restore
            .iter()
            .map(|(_, coin)| OUTPOINT_SIZE + coin.size_in_bytes())
            .sum::<usize>();
        RECORD_FIXED_SIZE + restore + self.outputs_to_remove.len() * OUTPOINT_SIZE
    }

    /// Serialize to bytes for storage.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("RewindRecord serialization should not fail")
    }

    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Returns true if no UTXO changes were recorded.
    pub fn is_empty(&self) -> bool {
        self.outputs_to_restore.is_empty() && self.outputs_to_remove.is_empty()
    }
}
