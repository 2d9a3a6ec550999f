//! Error types for the RocksDB backing store.

use coinkeeper_primitives::ChainTip;

/// Errors that can occur during UTXO storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RocksDB error.
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The changes do not build on the persisted tip.
    #[error("Stale tip: store is at {expected}, changes build on {got}")]
    TipMismatch { expected: ChainTip, got: ChainTip },

    /// Rewind record not found.
    #[error("Rewind data not found for height {0}")]
    UndoNotFound(u32),

    /// Malformed metadata entry.
    #[error("Corrupted metadata: {0}")]
    CorruptedMetadata(&'static str),

    /// UTXO count went out of range, the metadata no longer matches the UTXO set.
    #[error("UTXO count out of range: {0}")]
    InvalidUtxoCount(String),

    /// Storage not initialized.
    #[error("Storage not initialized")]
    NotInitialized,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
