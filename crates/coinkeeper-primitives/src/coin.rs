use bitcoin::TxOut;
use serde::{Deserialize, Serialize};

/// Fixed part of a coin in the accounting model.
///
/// coinbase flag (1) + coinstake flag (1) + amount (8) + height (4) + time (4)
/// + script length prefix (8).
const COIN_FIXED_SIZE: usize = 26;

/// Unspent transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Whether the coin is from a coinbase transaction.
    pub is_coinbase: bool,
    /// Whether the coin is from a coinstake transaction.
    ///
    /// Always `false` on proof-of-work chains.
    pub is_coinstake: bool,
    /// Transfer value in satoshis.
    pub amount: u64,
    /// Block height at which the containing transaction was included.
    pub height: u32,
    /// Timestamp of the containing transaction, used for maturity on proof-of-stake chains.
    pub time: u32,
    /// Spending condition of the output.
    pub script_pubkey: Vec<u8>,
}

impl Coin {
    /// Constructs a coin from a transaction output included at `height`.
    pub fn from_txout(txout: &TxOut, height: u32, is_coinbase: bool) -> Self {
        Self {
            is_coinbase,
            is_coinstake: false,
            amount: txout.value.to_sat(),
            height,
            time: 0,
            script_pubkey: txout.script_pubkey.to_bytes(),
        }
    }

    /// Returns the number of bytes this coin accounts for in memory and on disk.
    pub fn size_in_bytes(&self) -> usize {
        COIN_FIXED_SIZE + self.script_pubkey.len()
    }

    /// Serialize to bytes for storage.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Coin serialization should not fail")
    }

    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
