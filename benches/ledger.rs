//! Benchmarks for the liquidity ledger.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark
//! cargo bench -- pool_units
//! ```
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use liquidity_core::ledger::{
    refund_bond, slash_node_lp, AddLiquidityMsg, BlockProcessor, LedgerMsg, RefundRequest,
};
use liquidity_core::outbound::SlabOutboundQueue;
use liquidity_core::params::{Mimir, ProtocolParameters, ProtocolVersion};
use liquidity_core::store::{Keeper, MemoryStore};
use liquidity_core::types::{
    calculate_pool_units, Address, Asset, BondProviders, EventLog, LiquidityProvider, NodeAccount, NodeStatus, Pool,
    PoolStatus, PubKey, TxId,
};

// ============================================================================
// HELPER FUNCTIONS - Deterministic ledger setup
// ============================================================================

const NODE: &str = "maya1node";

fn version() -> ProtocolVersion {
    ProtocolVersion::new(1, 105, 0)
}

fn params() -> ProtocolParameters {
    ProtocolParameters::resolve(version(), &Mimir::default()).unwrap()
}

fn btc() -> Asset {
    "BTC.BTC".parse().unwrap()
}

fn provider(i: usize) -> Address {
    Address::new(format!("maya1p{i}"))
}

/// Keeper holding one node backed by `providers` positions of 1000 units each.
///
/// Provider 0 is the operator; everyone is bonded.
fn bonded_node(providers: usize) -> Keeper {
    let mut keeper = Keeper::new(MemoryStore::new());
    let units = 1_000 * providers as u128;

    let mut pool = Pool::new(btc());
    pool.balance_settlement = units * 10;
    pool.balance_asset = units;
    pool.lp_units = units;
    pool.status = PoolStatus::Available;
    keeper.set_pool(&pool).unwrap();

    let node = Address::from(NODE);
    let na = NodeAccount::new(node.clone(), NodeStatus::Standby, PubKey::from("pk-node"), provider(0), 1);
    keeper.set_node_account(&na).unwrap();

    let mut bp = BondProviders::new(node.clone());
    bp.ensure_operator(&provider(0), 500);
    for i in 0..providers {
        let address = provider(i);
        bp.add_provider(address.clone(), providers + 1).unwrap();
        bp.bond_liquidity(&address);

        let mut lp = LiquidityProvider::new(btc(), address, Address::new(format!("bc1p{i}")));
        lp.units = 1_000;
        lp.bond(&node, 1_000).unwrap();
        keeper.set_liquidity_provider(&lp).unwrap();
    }
    keeper.set_bond_providers(&bp).unwrap();
    keeper
}

/// Generate a block of symmetric adds from distinct providers.
fn generate_add_batch(count: usize, seed: u64) -> Vec<LedgerMsg> {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let asset_amount: u128 = rng.gen_range(1_000..=100_000);
            LedgerMsg::AddLiquidity(AddLiquidityMsg {
                tx_id: TxId::new(format!("ADD-{i}")),
                asset: btc(),
                settlement_amount: asset_amount * 10,
                asset_amount,
                settlement_address: provider(i),
                asset_address: Address::new(format!("bc1p{i}")),
                stage: false,
                bond_node: None,
            })
        })
        .collect()
}

// ============================================================================
// BENCHMARK: Pool Units
// ============================================================================

fn bench_pool_units(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_units");

    group.bench_function("symmetric", |b| {
        b.iter(|| {
            black_box(calculate_pool_units(
                black_box(1_000_000_000),
                black_box(50_000_000_000_000),
                black_box(100_000_000),
                black_box(5_000_000_000),
                black_box(10_000),
            ))
        })
    });

    group.bench_function("asymmetric", |b| {
        b.iter(|| {
            black_box(calculate_pool_units(
                black_box(1_000_000_000),
                black_box(50_000_000_000_000),
                black_box(100_000_000),
                black_box(0),
                black_box(2_500_000),
            ))
        })
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Slashing
// ============================================================================
// Cost grows with the number of positions pledged to the node

fn bench_slash(c: &mut Criterion) {
    let mut group = c.benchmark_group("slash_node_lp");
    group.measurement_time(Duration::from_secs(5));
    let params = params();

    for providers in [1usize, 6, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(providers), &providers, |b, &providers| {
            b.iter_batched(
                || bonded_node(providers),
                |mut keeper| {
                    let mut events = EventLog::new();
                    black_box(slash_node_lp(&mut keeper, &params, &mut events, &Address::from(NODE), 5_000))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// BENCHMARK: Bond Refund
// ============================================================================

fn bench_refund(c: &mut Criterion) {
    let mut group = c.benchmark_group("refund_bond");
    group.measurement_time(Duration::from_secs(5));
    let params = params();
    let tx_id = TxId::from("UNBOND");
    let who = provider(1);

    group.bench_function("provider_of_6", |b| {
        b.iter_batched(
            || {
                let keeper = bonded_node(6);
                let na = keeper.get_node_account(&Address::from(NODE)).unwrap();
                (keeper, na)
            },
            |(mut keeper, mut na)| {
                let mut queue = SlabOutboundQueue::default();
                let mut events = EventLog::new();
                let request = RefundRequest {
                    tx_id: &tx_id,
                    provider: &who,
                    asset: None,
                    units: 0,
                };
                black_box(refund_bond(&mut keeper, &params, &mut queue, &mut events, &request, &mut na, 10))
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

// ============================================================================
// BENCHMARK: Block Throughput
// ============================================================================

fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_throughput");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);

    for batch_size in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        let msgs = generate_add_batch(batch_size, 42);
        group.bench_with_input(BenchmarkId::new("adds", batch_size), &msgs, |b, msgs| {
            b.iter_batched(
                || BlockProcessor::new(Keeper::new(MemoryStore::new()), version()),
                |mut processor| black_box(processor.process_block(1, msgs)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_units, bench_slash, bench_refund, bench_block);
criterion_main!(benches);
