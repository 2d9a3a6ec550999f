use crate::Result;
use crate::cli::CoinsView;
use coinkeeper_primitives::ChainTip;
use serde::Serialize;

/// Disconnect blocks from the tip.
#[derive(Debug, Clone, clap::Args)]
pub struct Rewind {
    /// Number of blocks to disconnect.
    #[arg(long, default_value_t = 1)]
    pub blocks: u32,
}

impl Rewind {
    /// Rewinds the UTXO set block by block and returns the resulting tip.
    pub fn run(&self, coins: &CoinsView) -> Result<ChainTip> {
        let mut tip = coins.tip()?;

        for _ in 0..self.blocks {
            if tip.height == 0 {
                tracing::warn!("Reached genesis, nothing left to rewind");
                break;
            }
            tip = coins.rewind()?;
        }

        Ok(tip)
    }
}

/// Inspect the rewind record of a block.
#[derive(Debug, Clone, clap::Args)]
pub struct RewindData {
    /// Height of the block.
    #[arg(long)]
    pub height: u32,
}

/// Overview of a rewind record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindSummary {
    pub height: u32,
    pub previous_tip: ChainTip,
    pub outputs_to_restore: usize,
    pub outputs_to_remove: usize,
    /// Total value of the outputs restored by a rewind, in satoshis.
    pub restored_amount: u64,
}

impl RewindData {
    pub fn run(&self, coins: &CoinsView) -> Result<Option<RewindSummary>> {
        let Some(record) = coins.rewind_data(self.height)? else {
            return Ok(None);
        };

        Ok(Some(RewindSummary {
            height: record.height,
            previous_tip: record.previous_tip,
            outputs_to_restore: record.outputs_to_restore.len(),
            outputs_to_remove: record.outputs_to_remove.len(),
            restored_amount: record
                .outputs_to_restore
                .iter()
                .map(|(_, coin)| coin.amount)
                .sum(),
        }))
    }
}
