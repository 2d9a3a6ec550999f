pub mod params;

use crate::commands::import_blocks::{ImportBlocks, ImportBlocksCmd};
use crate::commands::info::ChainInfo;
use crate::commands::rewind::{Rewind, RewindData};
use crate::{Result, logging};
use clap::Parser;
use coinkeeper_utxo_cache::{CachedCoinsView, Metrics};
use coinkeeper_utxo_storage::RocksDbStore;
use params::CommonParams;
use std::sync::Arc;
use substrate_prometheus_endpoint::Registry;

/// Cache of the node backed by the RocksDB store.
pub(crate) type CoinsView = CachedCoinsView<RocksDbStore>;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Import hex encoded blocks into the UTXO set.
    ImportBlocks(ImportBlocks),

    /// Show the tip and the size of the UTXO set.
    Info,

    /// Disconnect blocks from the tip of the UTXO set.
    Rewind(Rewind),

    /// Show the rewind data of a block.
    RewindData(RewindData),
}

/// Coinkeeper UTXO node.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub common_params: CommonParams,
}

/// Parse and run command line arguments
pub fn run() -> Result<()> {
    let Cli {
        command,
        common_params,
    } = Cli::parse();

    logging::init_logging(&common_params.log)?;

    let coins = open_coins_view(&common_params)?;

    match command {
        Command::ImportBlocks(cmd) => {
            // The endpoint is served until the runtime is dropped at the end of the import.
            let mut prometheus_runtime = None;

            let coins = match common_params.prometheus_addr() {
                Some(addr) => {
                    let registry = Registry::new();
                    let metrics = Metrics::register(&registry)?;

                    let runtime = tokio::runtime::Builder::new_multi_thread()
                        .enable_all()
                        .build()?;
                    runtime.spawn(async move {
                        if let Err(err) =
                            substrate_prometheus_endpoint::init_prometheus(addr, registry).await
                        {
                            tracing::error!(?err, "Prometheus endpoint exited");
                        }
                    });
                    prometheus_runtime = Some(runtime);

                    coins.with_stats_sink(Arc::new(metrics))
                }
                None => coins,
            };

            ImportBlocksCmd::new(&cmd).run(&coins)?;

            drop(prometheus_runtime);
        }
        Command::Info => {
            let info = ChainInfo::collect(&coins, common_params.bitcoin_network())?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Rewind(cmd) => {
            let tip = cmd.run(&coins)?;
            println!("{tip}");
        }
        Command::RewindData(cmd) => match cmd.run(&coins)? {
            Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            None => println!("No rewind data at height {}", cmd.height),
        },
    }

    Ok(())
}

fn open_coins_view(params: &CommonParams) -> Result<CoinsView> {
    let path = params.storage_path();
    std::fs::create_dir_all(&path)?;

    tracing::info!("📦 UTXO storage at {}", path.display());

    let store = RocksDbStore::open(&path, params.bitcoin_network())?;

    Ok(CachedCoinsView::new(
        Arc::new(store),
        params.chain_params(),
        params.cache_config(),
    ))
}
