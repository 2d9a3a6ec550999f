use bitcoin::{Block, OutPoint};
use coinkeeper_primitives::Coin;

/// A single output modification produced by a validated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChange {
    /// Output reference.
    pub outpoint: OutPoint,
    /// New state of the output, `None` if the block spends it.
    pub coin: Option<Coin>,
    /// Whether the output is known to be created by this block.
    ///
    /// Allows the cache to skip the backing store read for outputs it has not seen.
    pub created_from_block: bool,
}

impl OutputChange {
    /// Change spending `outpoint`.
    pub fn spend(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            coin: None,
            created_from_block: false,
        }
    }

    /// Change creating `coin` at `outpoint`.
    pub fn add(outpoint: OutPoint, coin: Coin) -> Self {
        Self {
            outpoint,
            coin: Some(coin),
            created_from_block: true,
        }
    }

    /// Returns the ordered UTXO changes of `block` applied at `height`.
    ///
    /// Transactions are processed in block order, inputs before outputs, so an output
    /// created and spent within the block appears as an add followed by a spend.
    /// OP_RETURN outputs are unspendable and never enter the UTXO set.
    pub fn from_block(block: &Block, height: u32) -> Vec<Self> {
        let mut changes = Vec::new();

        for tx in &block.txdata {
            let txid = tx.compute_txid();
            let is_coinbase = tx.is_coinbase();

            if !is_coinbase {
                changes.extend(
                    tx.input
                        .iter()
                        .map(|input| Self::spend(input.previous_output)),
                );
            }

            for (vout, output) in tx.output.iter().enumerate() {
                if output.script_pubkey.is_op_return() {
                    continue;
                }

                let outpoint = OutPoint {
                    txid,
                    vout: vout as u32,
                };
                changes.push(Self::add(
                    outpoint,
                    Coin::from_txout(output, height, is_coinbase),
                ));
            }
        }

        changes
    }
}

/// Returns the outpoints spent by `block`, suitable for prefetching.
pub fn spent_outpoints(block: &Block) -> Vec<OutPoint> {
    block
        .txdata
        .iter()
        .filter(|tx| !tx.is_coinbase())
        .flat_map(|tx| tx.input.iter().map(|input| input.previous_output))
        .collect()
}
