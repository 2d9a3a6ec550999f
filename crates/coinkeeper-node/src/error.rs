use bitcoin::BlockHash;
use coinkeeper_primitives::ChainTip;

/// Node error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] coinkeeper_utxo_cache::Error),

    #[error(transparent)]
    Storage(#[from] coinkeeper_utxo_storage::Error),

    #[error("Invalid block at line {line}: {reason}")]
    InvalidBlock { line: usize, reason: String },

    #[error("Block {block_hash} does not connect to the current tip {tip}")]
    BlockDoesNotConnect { block_hash: BlockHash, tip: ChainTip },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Prometheus(#[from] substrate_prometheus_endpoint::PrometheusError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
