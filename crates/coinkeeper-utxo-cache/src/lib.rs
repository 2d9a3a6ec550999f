//! Write-back UTXO cache for Coinkeeper.
//!
//! This crate provides the cache layer sitting between block validation and a
//! persistent UTXO store.
//!
//! ## Architecture
//!
//! - **Coins cache**: map of cached outputs with dirty/persisted flags and exact byte
//!   accounting.
//! - **Rewind window**: per-block undo records kept in memory between two flushes,
//!   trimmed to the reorganization depth the chain can require.
//! - **Flush**: dirty coins and rewind records are written to the [`BackingStore`] in
//!   one atomic batch, when the flush interval elapses or the memory budget is exceeded.
//! - **Eviction**: clean coins already persisted are randomly dropped under memory
//!   pressure, dirty coins are never evicted.
//!
//! The entry point is [`CachedCoinsView`].

mod backend;
mod cache;
mod change;
mod coins_view;
mod config;
mod entry;
mod error;
mod flush;
mod metrics;
mod rewind_window;

#[cfg(test)]
mod tests;

pub use backend::{BackendError, BackingStore, OutputEntry, RewindIndexCache, StakeChainStore};
pub use change::{OutputChange, spent_outpoints};
pub use coins_view::CachedCoinsView;
pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::Error;
pub use metrics::{CacheStats, Metrics, StatsSink};
pub use rewind_window::{
    BELOW_CHECKPOINT_REWIND_RETENTION, DEFAULT_REWIND_RETENTION, retention_depth,
};

/// Result type for UTXO cache operations.
pub type Result<T> = std::result::Result<T, Error>;
