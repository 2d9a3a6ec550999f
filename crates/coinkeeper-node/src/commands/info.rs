use crate::Result;
use crate::cli::CoinsView;
use bitcoin::{BlockHash, Network};
use serde::Serialize;

/// Summary of the UTXO set and of the cache in front of it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub network: Network,
    pub best_height: u32,
    pub best_hash: BlockHash,
    /// Tip persisted in the UTXO database.
    pub stored_height: u32,
    pub utxo_count: u64,
    pub cached_coins: usize,
    pub cache_bytes: usize,
    pub rewind_window_len: usize,
}

impl ChainInfo {
    pub fn collect(coins: &CoinsView, network: Network) -> Result<Self> {
        let tip = coins.tip()?;
        let store = coins.backend();
        let stats = coins.stats();

        Ok(Self {
            network,
            best_height: tip.height,
            best_hash: tip.hash,
            stored_height: store.best_tip().height,
            utxo_count: store.utxo_count(),
            cached_coins: stats.entries,
            cache_bytes: stats.cache_bytes,
            rewind_window_len: stats.rewind_window_len,
        })
    }
}
