//! Scenario tests of [`CachedCoinsView`](crate::CachedCoinsView) against an in-memory
//! backing store.

mod reorg_tests;

use crate::{BackendError, BackingStore, OutputEntry};
use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version as TxVersion;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, PubkeyHash, ScriptBuf, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness, absolute,
};
use coinkeeper_primitives::{ChainTip, Coin, RewindRecord};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

struct MockState {
    coins: HashMap<OutPoint, Coin>,
    undo: BTreeMap<u32, RewindRecord>,
    tip: ChainTip,
}

/// Minimal backing store for deterministic UTXO testing.
pub struct MockBackend {
    state: Mutex<MockState>,
    fetch_calls: AtomicUsize,
    save_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(tip: ChainTip) -> Self {
        Self::with_coins(tip, [])
    }

    pub fn with_coins(tip: ChainTip, coins: impl IntoIterator<Item = (OutPoint, Coin)>) -> Self {
        Self {
            state: Mutex::new(MockState {
                coins: coins.into_iter().collect(),
                undo: BTreeMap::new(),
                tip,
            }),
            fetch_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
        }
    }

    pub fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.state.lock().coins.get(outpoint).cloned()
    }

    pub fn current_tip(&self) -> ChainTip {
        self.state.lock().tip
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl BackingStore for MockBackend {
    fn tip(&self) -> Result<ChainTip, BackendError> {
        Ok(self.state.lock().tip)
    }

    fn fetch_coins(&self, outpoints: &[OutPoint]) -> Result<Vec<Option<Coin>>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(outpoints
            .iter()
            .map(|outpoint| state.coins.get(outpoint).cloned())
            .collect())
    }

    fn save_changes(
        &self,
        modified: &[OutputEntry],
        old_tip: ChainTip,
        new_tip: ChainTip,
        rewind_records: &[RewindRecord],
    ) -> Result<(), BackendError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();

        if state.tip != old_tip {
            return Err(format!("stale tip {old_tip}, store is at {}", state.tip).into());
        }

        for entry in modified {
            match &entry.coin {
                Some(coin) => state.coins.insert(entry.outpoint, coin.clone()),
                None => state.coins.remove(&entry.outpoint),
            };
        }
        for record in rewind_records {
            state.undo.insert(record.height, record.clone());
        }
        state.tip = new_tip;

        Ok(())
    }

    fn rewind(&self) -> Result<ChainTip, BackendError> {
        let mut state = self.state.lock();
        let height = state.tip.height;
        let record = state
            .undo
            .remove(&height)
            .ok_or_else(|| format!("no rewind data at height {height}"))?;

        for outpoint in &record.outputs_to_remove {
            state.coins.remove(outpoint);
        }
        for (outpoint, coin) in record.outputs_to_restore {
            state.coins.insert(outpoint, coin);
        }
        state.tip = record.previous_tip;

        Ok(state.tip)
    }

    fn rewind_data(&self, height: u32) -> Result<Option<RewindRecord>, BackendError> {
        Ok(self.state.lock().undo.get(&height).cloned())
    }
}

/// Returns a tip with a hash unique to `height`.
pub fn tip(height: u32) -> ChainTip {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&height.to_le_bytes());
    bytes[31] = 0xff;
    ChainTip::new(height, BlockHash::from_byte_array(bytes))
}

pub fn outpoint(n: u32) -> OutPoint {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&n.to_le_bytes());
    OutPoint::new(Txid::from_byte_array(bytes), 0)
}

pub fn coin(amount: u64) -> Coin {
    Coin {
        is_coinbase: false,
        is_coinstake: false,
        amount,
        height: 1,
        time: 0,
        script_pubkey: vec![0x76, 0xa9, 0x14],
    }
}

pub fn coinbase_coin(amount: u64) -> Coin {
    Coin {
        is_coinbase: true,
        ..coin(amount)
    }
}

pub fn coinbase_tx(height: u32, value: u64) -> Transaction {
    // Unique coinbase script_sig with height (like real Bitcoin blocks)
    let mut coinbase_script = vec![0x03]; // Push 3 bytes
    coinbase_script.extend_from_slice(&height.to_le_bytes()[..3]);

    Transaction {
        version: TxVersion::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(coinbase_script),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros()),
        }],
    }
}

pub fn spending_tx(inputs: &[OutPoint], value: u64) -> Transaction {
    Transaction {
        version: TxVersion::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: inputs
            .iter()
            .map(|previous_output| TxIn {
                previous_output: *previous_output,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros()),
        }],
    }
}

pub fn test_block(nonce: u32, txdata: Vec<Transaction>) -> Block {
    Block {
        header: Header {
            version: Version::TWO,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0),
            nonce,
        },
        txdata,
    }
}
