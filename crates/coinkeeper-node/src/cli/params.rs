use clap::Parser;
use coinkeeper_primitives::ChainParams;
use coinkeeper_utxo_cache::CacheConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Chain.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Chain {
    /// Bitcoin mainnet.
    #[default]
    BitcoinMainnet,
    /// Bitcoin testnet
    BitcoinTestnet,
    /// Bitcoin signet.
    BitcoinSignet,
    /// Bitcoin regtest.
    BitcoinRegtest,
}

impl Chain {
    /// Returns the name of the data directory of this chain.
    pub fn id(&self) -> &'static str {
        // Convert to kebab-case for consistency in CLI.
        match self {
            Self::BitcoinMainnet => "bitcoin-mainnet",
            Self::BitcoinTestnet => "bitcoin-testnet",
            Self::BitcoinSignet => "bitcoin-signet",
            Self::BitcoinRegtest => "bitcoin-regtest",
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub struct CommonParams {
    /// Specify custom base path.
    #[arg(long, short = 'd', value_name = "PATH", default_value = ".coinkeeper")]
    pub base_path: PathBuf,

    /// Specify the chain.
    #[arg(long, value_name = "CHAIN", default_value = "bitcoin-mainnet")]
    pub network: Chain,

    /// Sets a custom logging filter (syntax: `<target>=<level>`).
    ///
    /// Log levels (least to most verbose) are `error`, `warn`, `info`, `debug`, and `trace`.
    ///
    /// *Example*: `--log info,utxo_cache=debug`.
    #[arg(short = 'l', long, value_name = "LOG_PATTERN", default_value = "info")]
    pub log: String,

    /// Memory budget of the UTXO cache in MiB, rewind data included.
    #[arg(long, default_value_t = 200)]
    pub cache_size_mb: usize,

    /// Maximum number of seconds between two flushes of the UTXO cache.
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub flush_interval: u64,

    /// Expose Prometheus metrics on this port during block import.
    #[arg(long, value_name = "PORT")]
    pub prometheus_port: Option<u16>,
}

impl CommonParams {
    /// Determines the Bitcoin network type based on the current chain setting.
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self.network {
            Chain::BitcoinMainnet => bitcoin::Network::Bitcoin,
            Chain::BitcoinTestnet => bitcoin::Network::Testnet,
            Chain::BitcoinSignet => bitcoin::Network::Signet,
            Chain::BitcoinRegtest => bitcoin::Network::Regtest,
        }
    }

    /// Location of the UTXO database.
    pub fn storage_path(&self) -> PathBuf {
        self.base_path.join(self.network.id()).join("utxo")
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams::new(self.bitcoin_network())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .max_cache_size_mb(self.cache_size_mb)
            .flush_interval(Duration::from_secs(self.flush_interval))
            .build()
    }

    pub fn prometheus_addr(&self) -> Option<SocketAddr> {
        self.prometheus_port
            .map(|port| SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port))
    }
}
