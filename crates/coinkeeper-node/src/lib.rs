//! Coinkeeper Node Library.
//!
//! Drives the UTXO cache on top of the RocksDB store from the command line: block import,
//! chain rewind and inspection of the persisted state.

mod cli;
mod commands;
mod error;
mod logging;

pub use self::cli::run;
pub use self::error::Error;

/// Result type of the node commands.
pub type Result<T> = std::result::Result<T, Error>;
