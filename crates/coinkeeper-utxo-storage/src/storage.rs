//! UTXO set and rewind log storage using RocksDB.

use crate::{Error, Result, cf, meta_keys};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Network, OutPoint};
use coinkeeper_primitives::{ChainParams, ChainTip, Coin, RewindRecord};
use coinkeeper_utxo_cache::{BackendError, BackingStore, OutputEntry, retention_depth};
use parking_lot::RwLock;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;

const LOG_TARGET: &str = "utxo_storage";

/// Convert OutPoint to storage key (36 bytes).
///
/// Format: txid (32 bytes, raw) || vout (4 bytes, little-endian)
fn outpoint_to_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(outpoint.txid.as_ref());
    key[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}

/// Parse storage key back to OutPoint.
fn key_to_outpoint(key: &[u8; 36]) -> OutPoint {
    let mut txid_bytes = [0u8; 32];
    txid_bytes.copy_from_slice(&key[..32]);
    let txid = bitcoin::Txid::from_byte_array(txid_bytes);
    let mut vout_bytes = [0u8; 4];
    vout_bytes.copy_from_slice(&key[32..]);
    OutPoint {
        txid,
        vout: u32::from_le_bytes(vout_bytes),
    }
}

/// Persistent UTXO set with a per-height rewind log.
///
/// Backing store of [`CachedCoinsView`](coinkeeper_utxo_cache::CachedCoinsView): the
/// cache writes batches of modified coins together with the rewind records of the
/// blocks they belong to, and delegates block disconnection to [`Self::rewind_block`].
pub struct RocksDbStore {
    /// RocksDB instance.
    db: DB,
    /// Decides how many trailing rewind records are kept.
    chain_params: ChainParams,
    /// Tip of the persisted UTXO set.
    tip: RwLock<ChainTip>,
    /// Total UTXO count.
    utxo_count: RwLock<u64>,
}

impl RocksDbStore {
    /// Open or create UTXO storage at the given path.
    ///
    /// A fresh store starts at the genesis block of `network`, whose outputs are not
    /// spendable and therefore never part of the UTXO set.
    pub fn open(path: &Path, network: Network) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Optimize for UTXO workload
        db_opts.set_write_buffer_size(256 * 1024 * 1024); // 256MB write buffer
        db_opts.set_max_write_buffer_number(4);
        db_opts.set_target_file_size_base(256 * 1024 * 1024);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Enable bloom filters for faster lookups
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(cf::UTXOS, Options::default()),
            ColumnFamilyDescriptor::new(cf::UNDO, Options::default()),
            ColumnFamilyDescriptor::new(cf::META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let tip = match Self::load_tip(&db)? {
            Some(tip) => tip,
            None => {
                let genesis = ChainTip::genesis(network);
                let cf_meta = db.cf_handle(cf::META).ok_or(Error::NotInitialized)?;
                let mut batch = WriteBatch::default();
                put_meta(&mut batch, cf_meta, genesis, 0);
                db.write(batch)?;
                genesis
            }
        };
        let utxo_count = Self::load_utxo_count(&db)?;

        tracing::info!(target: LOG_TARGET, "Opened UTXO storage at {tip}, {utxo_count} UTXOs");

        Ok(Self {
            db,
            chain_params: ChainParams::new(network),
            tip: RwLock::new(tip),
            utxo_count: RwLock::new(utxo_count),
        })
    }

    /// Get a UTXO by outpoint.
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        let cf_utxos = self.cf(cf::UTXOS)?;

        self.db
            .get_cf(cf_utxos, outpoint_to_key(outpoint))?
            .map(|bytes| Coin::decode(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Get many UTXOs in one batched read, aligned with `outpoints`.
    pub fn get_many(&self, outpoints: &[OutPoint]) -> Result<Vec<Option<Coin>>> {
        let cf_utxos = self.cf(cf::UTXOS)?;

        self.db
            .multi_get_cf(
                outpoints
                    .iter()
                    .map(|outpoint| (cf_utxos, outpoint_to_key(outpoint))),
            )
            .into_iter()
            .map(|value| -> Result<Option<Coin>> {
                match value? {
                    Some(bytes) => Ok(Some(Coin::decode(&bytes)?)),
                    None => Ok(None),
                }
            })
            .collect()
    }

    /// Atomically writes `modified` and `rewind_records`, moving the tip from `old_tip`
    /// to `new_tip`.
    ///
    /// Persisted rewind records deeper than the reorg window at `new_tip` are deleted in
    /// the same batch.
    pub fn write_changes(
        &self,
        modified: &[OutputEntry],
        old_tip: ChainTip,
        new_tip: ChainTip,
        rewind_records: &[RewindRecord],
    ) -> Result<()> {
        let mut tip = self.tip.write();

        if *tip != old_tip {
            return Err(Error::TipMismatch {
                expected: *tip,
                got: old_tip,
            });
        }

        let cf_utxos = self.cf(cf::UTXOS)?;
        let cf_undo = self.cf(cf::UNDO)?;
        let cf_meta = self.cf(cf::META)?;

        let existing = self.exists_many(cf_utxos, modified.iter().map(|entry| &entry.outpoint))?;

        let mut batch = WriteBatch::default();
        let mut created: u64 = 0;
        let mut spent: u64 = 0;

        for (entry, exists) in modified.iter().zip(existing) {
            let key = outpoint_to_key(&entry.outpoint);
            match &entry.coin {
                Some(coin) => {
                    batch.put_cf(cf_utxos, key, coin.encode());
                    if !exists {
                        created += 1;
                    }
                }
                None => {
                    batch.delete_cf(cf_utxos, key);
                    if exists {
                        spent += 1;
                    }
                }
            }
        }

        for record in rewind_records {
            batch.put_cf(cf_undo, record.height.to_be_bytes(), record.encode());
        }

        // Rewind records that fell out of the reorg window, heights `..=cutoff`.
        let retention = retention_depth(&self.chain_params, new_tip.height);
        if let Some(cutoff) = new_tip.height.checked_sub(retention) {
            batch.delete_range_cf(
                cf_undo,
                0u32.to_be_bytes(),
                cutoff.saturating_add(1).to_be_bytes(),
            );
        }

        let mut utxo_count = self.utxo_count.write();
        let new_utxo_count = utxo_count
            .checked_add(created)
            .and_then(|count| count.checked_sub(spent))
            .ok_or_else(|| {
                Error::InvalidUtxoCount(format!("{} +{created} -{spent}", *utxo_count))
            })?;

        put_meta(&mut batch, cf_meta, new_tip, new_utxo_count);

        // Atomic write
        self.db.write(batch)?;

        *tip = new_tip;
        *utxo_count = new_utxo_count;

        tracing::debug!(
            target: LOG_TARGET,
            "Saved changes {old_tip} -> {new_tip}: +{created} -{spent} UTXOs, {} rewind records, total: {new_utxo_count}",
            rewind_records.len(),
        );

        Ok(())
    }

    /// Disconnects the tip block using its rewind record and returns the new tip.
    pub fn rewind_block(&self) -> Result<ChainTip> {
        let mut tip = self.tip.write();
        let height = tip.height;

        let record = self
            .undo_record(height)?
            .ok_or(Error::UndoNotFound(height))?;

        let cf_utxos = self.cf(cf::UTXOS)?;
        let cf_undo = self.cf(cf::UNDO)?;
        let cf_meta = self.cf(cf::META)?;

        let mut batch = WriteBatch::default();

        // Remove created UTXOs
        let removed = self.exists_many(cf_utxos, record.outputs_to_remove.iter())?;
        for outpoint in &record.outputs_to_remove {
            batch.delete_cf(cf_utxos, outpoint_to_key(outpoint));
        }

        // Restore spent UTXOs
        let restored = self.exists_many(
            cf_utxos,
            record.outputs_to_restore.iter().map(|(outpoint, _)| outpoint),
        )?;
        for (outpoint, coin) in &record.outputs_to_restore {
            batch.put_cf(cf_utxos, outpoint_to_key(outpoint), coin.encode());
        }

        let removed_count = removed.into_iter().filter(|exists| *exists).count() as u64;
        let restored_count = restored.into_iter().filter(|exists| !exists).count() as u64;

        let mut utxo_count = self.utxo_count.write();
        let new_utxo_count = utxo_count
            .checked_sub(removed_count)
            .and_then(|count| count.checked_add(restored_count))
            .ok_or_else(|| {
                Error::InvalidUtxoCount(format!(
                    "{} -{removed_count} +{restored_count} on rewind",
                    *utxo_count
                ))
            })?;

        let new_tip = record.previous_tip;
        put_meta(&mut batch, cf_meta, new_tip, new_utxo_count);

        // Delete the rewind record we just used
        batch.delete_cf(cf_undo, height.to_be_bytes());

        // Atomic write
        self.db.write(batch)?;

        *tip = new_tip;
        *utxo_count = new_utxo_count;

        tracing::info!(
            target: LOG_TARGET,
            "Rewound block #{height}: -{removed_count} +{restored_count} UTXOs, now at {new_tip}",
        );

        Ok(new_tip)
    }

    /// Returns the persisted rewind record at `height`.
    pub fn undo_record(&self, height: u32) -> Result<Option<RewindRecord>> {
        let cf_undo = self.cf(cf::UNDO)?;

        self.db
            .get_cf(cf_undo, height.to_be_bytes())?
            .map(|bytes| RewindRecord::decode(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Get the tip of the persisted UTXO set.
    pub fn best_tip(&self) -> ChainTip {
        *self.tip.read()
    }

    /// Get the current UTXO count.
    pub fn utxo_count(&self) -> u64 {
        *self.utxo_count.read()
    }

    /// Iterate over all UTXOs (for verification/debugging).
    ///
    /// Returns an iterator that yields (OutPoint, Coin) pairs in lexicographic order.
    pub fn iter_utxos(&self) -> Result<UtxoIterator<'_>> {
        let cf_utxos = self.cf(cf::UTXOS)?;
        let mut iter = self.db.raw_iterator_cf(cf_utxos);
        iter.seek_to_first();
        Ok(UtxoIterator { iter })
    }

    // --- Private helper methods ---

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or(Error::NotInitialized)
    }

    fn exists_many<'a>(
        &self,
        cf_utxos: &ColumnFamily,
        outpoints: impl Iterator<Item = &'a OutPoint>,
    ) -> Result<Vec<bool>> {
        self.db
            .multi_get_cf(outpoints.map(|outpoint| (cf_utxos, outpoint_to_key(outpoint))))
            .into_iter()
            .map(|value| value.map(|bytes| bytes.is_some()).map_err(Error::from))
            .collect()
    }

    fn load_tip(db: &DB) -> Result<Option<ChainTip>> {
        let Some(cf) = db.cf_handle(cf::META) else {
            return Ok(None);
        };

        let height = db.get_cf(cf, meta_keys::TIP_HEIGHT)?;
        let hash = db.get_cf(cf, meta_keys::TIP_HASH)?;

        match (height, hash) {
            (Some(height), Some(hash)) => {
                let height: [u8; 4] = height
                    .try_into()
                    .map_err(|_| Error::CorruptedMetadata("tip height"))?;
                let hash: [u8; 32] = hash
                    .try_into()
                    .map_err(|_| Error::CorruptedMetadata("tip hash"))?;
                Ok(Some(ChainTip::new(
                    u32::from_le_bytes(height),
                    BlockHash::from_byte_array(hash),
                )))
            }
            (None, None) => Ok(None),
            _ => Err(Error::CorruptedMetadata("incomplete tip")),
        }
    }

    fn load_utxo_count(db: &DB) -> Result<u64> {
        let Some(cf) = db.cf_handle(cf::META) else {
            return Ok(0);
        };

        match db.get_cf(cf, meta_keys::UTXO_COUNT)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| Error::CorruptedMetadata("utxo count"))?;
                Ok(u64::from_le_bytes(bytes))
            }
            None => Ok(0),
        }
    }
}

fn put_meta(batch: &mut WriteBatch, cf_meta: &ColumnFamily, tip: ChainTip, utxo_count: u64) {
    batch.put_cf(cf_meta, meta_keys::TIP_HEIGHT, tip.height.to_le_bytes());
    batch.put_cf(cf_meta, meta_keys::TIP_HASH, tip.hash.to_byte_array());
    batch.put_cf(cf_meta, meta_keys::UTXO_COUNT, utxo_count.to_le_bytes());
}

impl BackingStore for RocksDbStore {
    fn tip(&self) -> Result<ChainTip, BackendError> {
        Ok(self.best_tip())
    }

    fn fetch_coins(&self, outpoints: &[OutPoint]) -> Result<Vec<Option<Coin>>, BackendError> {
        Ok(self.get_many(outpoints)?)
    }

    fn save_changes(
        &self,
        modified: &[OutputEntry],
        old_tip: ChainTip,
        new_tip: ChainTip,
        rewind_records: &[RewindRecord],
    ) -> Result<(), BackendError> {
        Ok(self.write_changes(modified, old_tip, new_tip, rewind_records)?)
    }

    fn rewind(&self) -> Result<ChainTip, BackendError> {
        Ok(self.rewind_block()?)
    }

    fn rewind_data(&self, height: u32) -> Result<Option<RewindRecord>, BackendError> {
        Ok(self.undo_record(height)?)
    }
}

/// Iterator over all UTXOs in the storage.
///
/// Yields (OutPoint, Coin) pairs in lexicographic order by OutPoint key.
pub struct UtxoIterator<'a> {
    iter: rocksdb::DBRawIterator<'a>,
}

impl Iterator for UtxoIterator<'_> {
    type Item = (OutPoint, Coin);

    fn next(&mut self) -> Option<Self::Item> {
        while self.iter.valid() {
            if let (Some(key), Some(value)) = (self.iter.key(), self.iter.value()) {
                if let Ok(key_array) = <[u8; 36]>::try_from(key) {
                    let outpoint = key_to_outpoint(&key_array);
                    let coin = Coin::decode(value).ok()?;
                    self.iter.next();
                    return Some((outpoint, coin));
                }
            }
            self.iter.next();
        }
        None
    }
}
