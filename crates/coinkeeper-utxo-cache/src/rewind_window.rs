//! Trailing window of rewind records kept in memory between two flushes.

use coinkeeper_primitives::{ChainParams, RewindRecord};
use std::collections::VecDeque;

/// Retention used when the chain defines no maximum reorganization length.
pub const DEFAULT_REWIND_RETENTION: u32 = 100;

/// Retention used below the last checkpoint, where reorganizations are not supported.
pub const BELOW_CHECKPOINT_REWIND_RETENTION: u32 = 10;

/// Returns how many trailing heights of rewind data must be kept at `tip_height`.
pub fn retention_depth(chain_params: &ChainParams, tip_height: u32) -> u32 {
    if tip_height >= chain_params.last_checkpoint_height {
        chain_params
            .max_reorg_length()
            .map_or(DEFAULT_REWIND_RETENTION, |max_reorg| max_reorg + 1)
    } else {
        BELOW_CHECKPOINT_REWIND_RETENTION
    }
}

/// Rewind records ordered by ascending height.
#[derive(Debug, Default)]
pub(crate) struct RewindWindow {
    records: VecDeque<RewindRecord>,
    size_bytes: usize,
}

impl RewindWindow {
    /// Appends `record`, replacing any record at the same or a greater height.
    pub(crate) fn push(&mut self, record: RewindRecord) {
        while self
            .records
            .back()
            .is_some_and(|last| last.height >= record.height)
        {
            if let Some(stale) = self.records.pop_back() {
                self.size_bytes -= stale.size_in_bytes();
            }
        }

        self.size_bytes += record.size_in_bytes();
        self.records.push_back(record);
    }

    /// Drops the records that fall out of a window of `retention` heights ending at
    /// `tip_height`.
    ///
    /// Returns the number of dropped records.
    pub(crate) fn trim(&mut self, tip_height: u32, retention: u32) -> usize {
        let Some(cutoff) = tip_height.checked_sub(retention) else {
            return 0;
        };

        let mut removed = 0;
        while self
            .records
            .front()
            .is_some_and(|first| first.height <= cutoff)
        {
            if let Some(record) = self.records.pop_front() {
                self.size_bytes -= record.size_in_bytes();
                removed += 1;
            }
        }
        removed
    }

    pub(crate) fn get(&self, height: u32) -> Option<&RewindRecord> {
        self.records
            .binary_search_by_key(&height, |record| record.height)
            .ok()
            .and_then(|index| self.records.get(index))
    }

    /// Returns all the records as a contiguous slice, oldest first.
    pub(crate) fn records(&mut self) -> &[RewindRecord] {
        self.records.make_contiguous()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.size_bytes = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}
