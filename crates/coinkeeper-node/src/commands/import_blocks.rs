use crate::{Error, Result};
use bitcoin::Block;
use coinkeeper_primitives::ChainTip;
use coinkeeper_utxo_cache::{BackingStore, CachedCoinsView, OutputChange, spent_outpoints};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Import Bitcoin blocks into the UTXO set.
#[derive(clap::Parser, Debug, Clone)]
pub struct ImportBlocks {
    /// File containing the raw blocks in hex, one block per line.
    ///
    /// Blocks must be in chain order, the first one building on the current tip.
    #[clap(value_name = "FILE")]
    pub path: PathBuf,

    /// Number of blocks to import.
    ///
    /// The process will stop after importing the specified number of blocks.
    #[clap(long)]
    pub block_count: Option<usize>,
}

pub struct ImportBlocksCmd {
    path: PathBuf,
    block_count: Option<usize>,
}

impl ImportBlocksCmd {
    /// Constructs a new instance of [`ImportBlocksCmd`].
    pub fn new(cmd: &ImportBlocks) -> Self {
        Self {
            path: cmd.path.clone(),
            block_count: cmd.block_count,
        }
    }

    /// Run the import-blocks command, returns the new tip.
    pub fn run<B: BackingStore>(&self, coins: &CachedCoinsView<B>) -> Result<ChainTip> {
        let reader = BufReader::new(File::open(&self.path)?);

        let mut tip = coins.tip()?;

        tracing::info!("Start to import blocks from {} on top of {tip}", self.path.display());

        const INTERVAL: Duration = Duration::from_secs(1);

        // The last time progress has been reported.
        let mut last_update = Instant::now();

        // Tip height at the last report, `None` if nothing has been reported yet.
        let mut last_height: Option<u32> = None;

        let mut total_imported = 0;

        for (index, line) in reader.lines().enumerate() {
            if self.block_count.is_some_and(|block_count| total_imported == block_count) {
                break;
            }

            let line = line?;
            let hex_block = line.trim();
            if hex_block.is_empty() {
                continue;
            }

            let block = decode_block(hex_block).map_err(|reason| Error::InvalidBlock {
                line: index + 1,
                reason,
            })?;

            tip = import_block(coins, &block, tip)?;
            total_imported += 1;

            coins.flush(false)?;

            let now = Instant::now();
            if total_imported % 1000 == 0 || now > last_update + INTERVAL {
                let speed = calculate_import_speed(tip.height, last_height, last_update);
                let stats = coins.stats();

                tracing::info!(
                    "Imported {total_imported} blocks,{speed} best {tip}, {} cached coins ({} KiB), {} dirty",
                    stats.entries,
                    stats.cache_bytes >> 10,
                    stats.dirty,
                );

                last_height.replace(tip.height);
                last_update = now;
            }
        }

        coins.flush(true)?;

        tracing::info!("Imported {total_imported} blocks successfully, best {tip}");

        Ok(tip)
    }
}

fn decode_block(hex_block: &str) -> std::result::Result<Block, String> {
    let raw_block = hex::decode(hex_block).map_err(|err| format!("Invalid hex data: {err}"))?;
    bitcoin::consensus::deserialize(&raw_block).map_err(|err| format!("Bad block data: {err}"))
}

/// Applies the UTXO changes of `block` on top of `tip` and returns the new tip.
fn import_block<B: BackingStore>(
    coins: &CachedCoinsView<B>,
    block: &Block,
    tip: ChainTip,
) -> Result<ChainTip> {
    let block_hash = block.block_hash();

    if block.header.prev_blockhash != tip.hash {
        return Err(Error::BlockDoesNotConnect { block_hash, tip });
    }

    let new_tip = ChainTip::new(tip.height + 1, block_hash);

    coins.prefetch(&spent_outpoints(block))?;
    coins.save_changes(&OutputChange::from_block(block, new_tip.height), tip, new_tip)?;

    Ok(new_tip)
}

/// Calculates `(best_number - last_number) / (now - last_update)` and returns a `String`
/// representing the speed of import.
fn calculate_import_speed(
    best_number: u32,
    last_number: Option<u32>,
    last_update: Instant,
) -> String {
    // Number of milliseconds elapsed since last time.
    let elapsed_ms = last_update.elapsed().as_millis();

    // Number of blocks that have been imported since last time.
    let diff = match last_number {
        None => return String::new(),
        Some(n) => best_number.saturating_sub(n),
    };

    if elapsed_ms == 0 {
        return String::new();
    }

    // Number of blocks per second, with one decimal.
    let speed = u128::from(diff) * 10_000 / elapsed_ms;

    format!(" {}.{} bps,", speed / 10, speed % 10)
}
