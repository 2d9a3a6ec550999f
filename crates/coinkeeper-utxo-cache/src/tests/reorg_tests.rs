use super::{MockBackend, coin, coinbase_tx, outpoint, spending_tx, test_block, tip};
use crate::{
    BackendError, CacheConfig, CachedCoinsView, Error, OutputChange, RewindIndexCache,
    StakeChainStore, spent_outpoints,
};
use bitcoin::{Network, OutPoint};
use coinkeeper_primitives::{ChainParams, ChainTip, Coin, RewindRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn test_config() -> CacheConfig {
    CacheConfig::builder()
        .flush_interval(Duration::from_secs(3600))
        .rng_seed(42)
        .build()
}

fn new_view(backend: &Arc<MockBackend>, chain_params: ChainParams) -> CachedCoinsView<MockBackend> {
    CachedCoinsView::new(backend.clone(), chain_params, test_config())
}

fn regtest() -> ChainParams {
    ChainParams::new(Network::Regtest)
}

fn save_empty_blocks(view: &CachedCoinsView<MockBackend>, heights: std::ops::RangeInclusive<u32>) {
    for height in heights {
        view.save_changes(&[], tip(height - 1), tip(height)).unwrap();
    }
}

#[test]
fn test_rewind_restores_recorded_delta() {
    let backend = Arc::new(MockBackend::with_coins(tip(0), [(outpoint(1), coin(10))]));
    let view = new_view(&backend, regtest());

    view.save_changes(
        &[
            OutputChange::spend(outpoint(1)),
            OutputChange::add(outpoint(2), coin(9)),
        ],
        tip(0),
        tip(1),
    )
    .unwrap();
    view.flush(true).unwrap();

    assert_eq!(view.rewind().unwrap(), tip(0));
    assert_eq!(view.tip().unwrap(), tip(0));

    let coins = view.fetch(&[outpoint(1), outpoint(2)]).unwrap();
    assert_eq!(coins[&outpoint(1)], Some(coin(10)));
    assert_eq!(coins[&outpoint(2)], None);
    assert_eq!(backend.coin(&outpoint(1)), Some(coin(10)));
}

#[test]
fn test_rewind_flushes_pending_blocks_first() {
    let backend = Arc::new(MockBackend::with_coins(tip(0), [(outpoint(1), coin(10))]));
    let view = new_view(&backend, regtest());

    view.save_changes(&[OutputChange::add(outpoint(2), coin(9))], tip(0), tip(1))
        .unwrap();
    view.save_changes(
        &[
            OutputChange::spend(outpoint(1)),
            OutputChange::add(outpoint(3), coin(8)),
        ],
        tip(1),
        tip(2),
    )
    .unwrap();

    assert_eq!(view.rewind().unwrap(), tip(1));
    assert_eq!(backend.current_tip(), tip(1));

    let stats = view.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.dirty, 0);
    assert_eq!(stats.rewind_window_len, 0);
    assert_eq!(stats.flushes, 1);

    let coins = view.fetch(&[outpoint(1), outpoint(2), outpoint(3)]).unwrap();
    assert_eq!(coins[&outpoint(1)], Some(coin(10)));
    assert_eq!(coins[&outpoint(2)], Some(coin(9)));
    assert_eq!(coins[&outpoint(3)], None);

    // The cache keeps working on top of the rewound tip.
    let err = view.save_changes(&[], tip(2), tip(3)).unwrap_err();
    assert!(matches!(err, Error::TipMismatch { .. }));
    view.save_changes(&[OutputChange::spend(outpoint(2))], tip(1), tip(2))
        .unwrap();
    assert_eq!(view.fetch(&[outpoint(2)]).unwrap()[&outpoint(2)], None);
}

#[test]
fn test_rewind_of_output_spent_before_reaching_backing_store() {
    let backend = Arc::new(MockBackend::new(tip(0)));
    let view = new_view(&backend, regtest());

    view.save_changes(&[OutputChange::add(outpoint(1), coin(10))], tip(0), tip(1))
        .unwrap();
    view.save_changes(
        &[
            OutputChange::spend(outpoint(1)),
            OutputChange::add(outpoint(2), coin(9)),
        ],
        tip(1),
        tip(2),
    )
    .unwrap();

    assert_eq!(view.rewind().unwrap(), tip(1));
    let coins = view.fetch(&[outpoint(1), outpoint(2)]).unwrap();
    assert_eq!(coins[&outpoint(1)], Some(coin(10)));
    assert_eq!(coins[&outpoint(2)], None);

    assert_eq!(view.rewind().unwrap(), tip(0));
    assert_eq!(view.fetch(&[outpoint(1)]).unwrap()[&outpoint(1)], None);
    assert_eq!(backend.current_tip(), tip(0));
}

#[test]
fn test_rewind_without_rewind_data_fails() {
    let backend = Arc::new(MockBackend::new(tip(3)));
    let view = new_view(&backend, regtest());

    let err = view.rewind().unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(view.tip().unwrap(), tip(3));
}

#[test]
fn test_rewind_of_block_built_from_transactions() {
    let funding = coinbase_tx(0, 5_000_000_000);
    let funding_outpoint = OutPoint::new(funding.compute_txid(), 0);
    let funding_coin = Coin::from_txout(&funding.output[0], 0, true);

    let backend = Arc::new(MockBackend::with_coins(
        tip(0),
        [(funding_outpoint, funding_coin.clone())],
    ));
    let view = new_view(&backend, regtest());

    let coinbase = coinbase_tx(1, 5_000_000_000);
    let spend = spending_tx(&[funding_outpoint], 4_000_000_000);
    let block = test_block(1, vec![coinbase.clone(), spend.clone()]);

    view.prefetch(&spent_outpoints(&block)).unwrap();
    view.save_changes(&OutputChange::from_block(&block, 1), tip(0), tip(1))
        .unwrap();

    let created = [
        OutPoint::new(coinbase.compute_txid(), 0),
        OutPoint::new(spend.compute_txid(), 0),
    ];
    let record = view.rewind_data(1).unwrap().unwrap();
    assert_eq!(record.outputs_to_restore, vec![(funding_outpoint, funding_coin.clone())]);
    assert_eq!(record.outputs_to_remove, created.to_vec());

    view.rewind().unwrap();

    let coins = view.fetch(&[funding_outpoint, created[0], created[1]]).unwrap();
    assert_eq!(coins[&funding_outpoint], Some(funding_coin));
    assert_eq!(coins[&created[0]], None);
    assert_eq!(coins[&created[1]], None);
}

#[test]
fn test_window_retains_max_reorg_length_above_checkpoint() {
    let backend = Arc::new(MockBackend::new(tip(0)));
    let chain_params = regtest()
        .with_max_reorg_length(500)
        .with_last_checkpoint_height(1000);
    let view = new_view(&backend, chain_params);

    save_empty_blocks(&view, 1..=2000);

    assert_eq!(view.stats().rewind_window_len, 501);
    assert_eq!(view.rewind_data(2000 - 501).unwrap(), None);
    assert!(view.rewind_data(2000 - 500).unwrap().is_some());
    assert!(view.rewind_data(2000).unwrap().is_some());
}

#[test]
fn test_window_below_checkpoint_is_small() {
    let backend = Arc::new(MockBackend::new(tip(0)));
    let chain_params = regtest()
        .with_max_reorg_length(500)
        .with_last_checkpoint_height(1000);
    let view = new_view(&backend, chain_params);

    save_empty_blocks(&view, 1..=500);

    assert_eq!(view.stats().rewind_window_len, 10);
    assert_eq!(view.rewind_data(490).unwrap(), None);
    assert!(view.rewind_data(491).unwrap().is_some());
}

#[test]
fn test_window_without_reorg_bound_keeps_default_depth() {
    let backend = Arc::new(MockBackend::new(tip(0)));
    let view = new_view(&backend, regtest());

    save_empty_blocks(&view, 1..=250);

    let stats = view.stats();
    assert_eq!(stats.rewind_window_len, 100);
    // Empty blocks still account for their fixed record size.
    let empty_record = RewindRecord::new(250, tip(249));
    assert_eq!(stats.rewind_window_bytes, 100 * empty_record.size_in_bytes());
    assert!(view.rewind_data(151).unwrap().is_some());
    assert_eq!(view.rewind_data(150).unwrap(), None);
}

#[test]
fn test_rewind_data_is_read_from_backing_store_after_flush() {
    let backend = Arc::new(MockBackend::with_coins(tip(0), [(outpoint(1), coin(10))]));
    let view = new_view(&backend, regtest());

    view.save_changes(&[OutputChange::spend(outpoint(1))], tip(0), tip(1))
        .unwrap();
    let in_memory = view.rewind_data(1).unwrap().unwrap();

    view.flush(true).unwrap();
    assert_eq!(view.stats().rewind_window_len, 0);
    assert_eq!(view.rewind_data(1).unwrap(), Some(in_memory));
}

#[derive(Default)]
struct RecordingRewindIndex {
    saved: Mutex<Vec<HashMap<OutPoint, u32>>>,
    flushed: Mutex<Vec<u32>>,
    removed: Mutex<Vec<u32>>,
}

impl RewindIndexCache for RecordingRewindIndex {
    fn save(&self, items: HashMap<OutPoint, u32>) {
        self.saved.lock().push(items);
    }

    fn flush(&self, tip_height: u32) {
        self.flushed.lock().push(tip_height);
    }

    fn remove(&self, height: u32) {
        self.removed.lock().push(height);
    }
}

#[derive(Default)]
struct CountingStakeChain {
    flushes: AtomicUsize,
}

impl StakeChainStore for CountingStakeChain {
    fn flush(&self, force: bool) -> Result<(), BackendError> {
        assert!(force);
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_optional_collaborators_follow_cache_lifecycle() {
    let backend = Arc::new(MockBackend::with_coins(tip(0), [(outpoint(1), coin(10))]));
    let rewind_index = Arc::new(RecordingRewindIndex::default());
    let stake_chain = Arc::new(CountingStakeChain::default());
    let view = new_view(&backend, regtest())
        .with_rewind_index(rewind_index.clone())
        .with_stake_chain(stake_chain.clone());

    view.save_changes(&[OutputChange::add(outpoint(2), coin(1))], tip(0), tip(1))
        .unwrap();
    view.save_changes(&[OutputChange::spend(outpoint(1))], tip(1), tip(2))
        .unwrap();

    // Blocks without spends are not reported.
    assert_eq!(
        *rewind_index.saved.lock(),
        vec![HashMap::from([(outpoint(1), 2)])]
    );

    view.flush(true).unwrap();
    assert_eq!(*rewind_index.flushed.lock(), vec![2]);
    assert_eq!(stake_chain.flushes.load(Ordering::SeqCst), 1);

    view.rewind().unwrap();
    assert_eq!(*rewind_index.removed.lock(), vec![2]);
    // Nothing was pending, the rewind did not flush again.
    assert_eq!(stake_chain.flushes.load(Ordering::SeqCst), 1);
}

struct FailingStakeChain;

impl StakeChainStore for FailingStakeChain {
    fn flush(&self, _force: bool) -> Result<(), BackendError> {
        Err("stake chain unavailable".into())
    }
}

#[test]
fn test_stake_chain_failure_is_reported() {
    let backend = Arc::new(MockBackend::new(tip(0)));
    let view = new_view(&backend, regtest()).with_stake_chain(Arc::new(FailingStakeChain));

    view.save_changes(&[OutputChange::add(outpoint(1), coin(1))], tip(0), tip(1))
        .unwrap();

    let err = view.flush(true).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(backend.current_tip(), tip(1));
}

#[test]
fn test_concurrent_readers_during_block_application() {
    let coins = (0..64).map(|n| (outpoint(n), coin(u64::from(n))));
    let backend = Arc::new(MockBackend::with_coins(tip(0), coins));
    let view = Arc::new(new_view(&backend, regtest()));

    let readers = (0..4)
        .map(|_| {
            let view = view.clone();
            std::thread::spawn(move || {
                for n in 0..64 {
                    let coins = view.fetch(&[outpoint(n)]).unwrap();
                    // Spent or unspent, never a different coin.
                    if let Some(coin) = &coins[&outpoint(n)] {
                        assert_eq!(coin.amount, u64::from(n));
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    let mut current: ChainTip = tip(0);
    for n in 0..64 {
        let next = tip(n + 1);
        view.save_changes(&[OutputChange::spend(outpoint(n))], current, next)
            .unwrap();
        current = next;
    }

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(view.tip().unwrap(), tip(64));
    assert_eq!(view.stats().dirty, 64);
}
