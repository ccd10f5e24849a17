//! Stress tests for the liquidity ledger.
//!
//! These tests verify:
//! 1. Unit conservation and bond containment hold after every block
//! 2. The processor stays stable under long random message streams
//! 3. Determinism is preserved across runs
//!
//! ## Running Stress Tests
//!
//! ```bash
//! # Run all stress tests (release mode recommended)
//! cargo test --release --test stress_test -- --nocapture
//!
//! # Run specific test
//! cargo test --release --test stress_test stress_random_blocks -- --nocapture
//! ```

use std::time::Instant;

use liquidity_core::ledger::{
    slash_node_lp, AddLiquidityMsg, BlockProcessor, BondMsg, LeaveMsg, LedgerMsg, UnbondMsg, WithdrawLiquidityMsg,
};
use liquidity_core::params::{Mimir, ProtocolParameters, ProtocolVersion};
use liquidity_core::store::{Keeper, MemoryStore};
use liquidity_core::types::{Address, Asset, EventLog, PubKey, TxId, Vault, VaultType};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// TEST CONSTANTS
// ============================================================================

/// Blocks in the main stress run
const STRESS_BLOCK_COUNT: u64 = 500;

/// Upper bound on messages per generated block
const MAX_MSGS_PER_BLOCK: usize = 20;

/// Distinct liquidity providers in the generated traffic
const USER_COUNT: usize = 8;

/// A slash is applied between blocks at this interval
const SLASH_INTERVAL: u64 = 25;

const NODE: &str = "maya1node";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn version() -> ProtocolVersion {
    ProtocolVersion::new(1, 105, 0)
}

fn pools() -> Vec<Asset> {
    vec!["BTC.BTC".parse().unwrap(), "ETH.ETH".parse().unwrap()]
}

fn user(i: usize) -> Address {
    Address::new(format!("maya1u{i}"))
}

/// Generate one block of random messages.
///
/// Uses the caller's seeded RNG for reproducibility. Same seed = same blocks.
fn generate_block(rng: &mut ChaCha8Rng, height: u64, assets: &[Asset]) -> Vec<LedgerMsg> {
    let count = rng.gen_range(0..=MAX_MSGS_PER_BLOCK);
    let mut msgs = Vec::with_capacity(count);

    for i in 0..count {
        let tx_id = TxId::new(format!("TX-{height}-{i}"));
        let who = rng.gen_range(0..USER_COUNT);
        let asset = assets[rng.gen_range(0..assets.len())].clone();

        let msg = match rng.gen_range(0..100u32) {
            // Adds dominate so pools stay funded
            0..=44 => {
                let settlement: u128 = if rng.gen_bool(0.9) { rng.gen_range(1_000..=1_000_000) } else { 0 };
                let asset_amount: u128 = if rng.gen_bool(0.9) { rng.gen_range(100..=100_000) } else { 0 };
                LedgerMsg::AddLiquidity(AddLiquidityMsg {
                    tx_id,
                    asset,
                    settlement_amount: settlement,
                    asset_amount,
                    settlement_address: user(who),
                    asset_address: Address::new(format!("ext-u{who}")),
                    stage: rng.gen_bool(0.2),
                    bond_node: None,
                })
            }
            45..=64 => LedgerMsg::WithdrawLiquidity(WithdrawLiquidityMsg {
                tx_id,
                asset,
                address: user(who),
                basis_points: rng.gen_range(0..=10_000),
                amount: 0,
            }),
            65..=79 => {
                // u0 operates the node and adds the others as providers
                let provider = (who == 0 && rng.gen_bool(0.5)).then(|| user(rng.gen_range(1..USER_COUNT)));
                let fee = (who == 0 && rng.gen_bool(0.1)).then(|| rng.gen_range(0..=2_000));
                LedgerMsg::Bond(BondMsg {
                    tx_id,
                    node_address: Address::from(NODE),
                    bond_address: user(who),
                    bond_provider_address: provider,
                    operator_fee: fee,
                    pub_key: PubKey::from("pk-node"),
                    amount: 0,
                })
            }
            80..=94 => {
                let pool = rng.gen_bool(0.5).then(|| asset.clone());
                let units = if pool.is_some() { rng.gen_range(0..=500) } else { 0 };
                LedgerMsg::Unbond(UnbondMsg {
                    tx_id,
                    node_address: Address::from(NODE),
                    bond_address: user(who),
                    bond_provider_address: None,
                    asset: pool,
                    units,
                    amount: 0,
                })
            }
            95..=97 => LedgerMsg::Leave(LeaveMsg {
                tx_id,
                node_address: Address::from(NODE),
                signer: user(who),
            }),
            _ => LedgerMsg::Churn(Vault::new(
                PubKey::new(format!("pk-asgard-{height}-{i}")),
                VaultType::Asgard,
                vec![],
                height,
            )),
        };
        msgs.push(msg);
    }

    msgs
}

/// Check conservation and bond containment for every pool.
fn check_invariants(keeper: &Keeper, assets: &[Asset], height: u64) {
    for asset in assets {
        if !keeper.pool_exists(asset) {
            continue;
        }
        let pool = keeper.get_pool(asset).unwrap();
        let positions = keeper.liquidity_providers(asset).unwrap();
        let held: u128 = positions.iter().map(|lp| lp.units).sum();
        assert_eq!(held, pool.lp_units, "units of {asset} not conserved at height {height}");
        for lp in &positions {
            assert!(
                lp.total_bonded_units() <= lp.units,
                "{} pledges {} of {} units at height {height}",
                lp.owner(),
                lp.total_bonded_units(),
                lp.units
            );
        }
    }
}

/// Run a deterministic block sequence and return the final state root.
fn run_deterministic_sequence(seed: u64, blocks: u64) -> [u8; 32] {
    let assets = pools();
    let params = ProtocolParameters::resolve(version(), &Mimir::default()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut processor = BlockProcessor::new(Keeper::new(MemoryStore::new()), version());

    for height in 1..=blocks {
        let msgs = generate_block(&mut rng, height, &assets);
        processor.process_block(height, &msgs).unwrap();
        if height % SLASH_INTERVAL == 0 {
            let mut events = EventLog::new();
            let amount = rng.gen_range(1..=10_000);
            slash_node_lp(processor.keeper_mut(), &params, &mut events, &Address::from(NODE), amount).unwrap();
        }
        check_invariants(processor.keeper(), &assets, height);
    }

    processor.keeper().state_root()
}

// ============================================================================
// STRESS TESTS
// ============================================================================

/// Main stress test: random traffic over many blocks.
///
/// # Verification
/// - No panics during execution
/// - Conservation and containment after every block
/// - Some messages succeed and some are rejected
#[test]
fn stress_random_blocks() {
    println!("\n=== STRESS TEST: {} Random Blocks ===\n", STRESS_BLOCK_COUNT);

    let assets = pools();
    let params = ProtocolParameters::resolve(version(), &Mimir::default()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut processor = BlockProcessor::new(Keeper::new(MemoryStore::new()), version());

    let mut processed = 0u64;
    let mut failed = 0u64;
    let mut outbound = 0u64;
    let mut slashed = 0u128;

    let start = Instant::now();
    for height in 1..=STRESS_BLOCK_COUNT {
        let msgs = generate_block(&mut rng, height, &assets);
        let receipt = processor.process_block(height, &msgs).unwrap();
        assert_eq!(receipt.messages_processed, msgs.len() as u64);
        assert_eq!(receipt.state_root, processor.keeper().state_root());
        processed += receipt.messages_processed;
        failed += receipt.messages_failed;
        outbound += receipt.outbound_queued;

        if height % SLASH_INTERVAL == 0 {
            let mut events = EventLog::new();
            let amount = rng.gen_range(1..=10_000);
            slashed += slash_node_lp(processor.keeper_mut(), &params, &mut events, &Address::from(NODE), amount)
                .unwrap();
        }
        check_invariants(processor.keeper(), &assets, height);
    }
    let elapsed = start.elapsed();
    let throughput = processed as f64 / elapsed.as_secs_f64();

    println!("=== RESULTS ===");
    println!("  Messages processed: {:>12}", processed);
    println!("  Messages failed:    {:>12}", failed);
    println!("  Outbound queued:    {:>12}", outbound);
    println!("  Value slashed:      {:>12}", slashed);
    println!("  Pending outbound:   {:>12}", processor.queue().len());
    println!();
    println!("  Elapsed time:       {:>12.2?}", elapsed);
    println!("  Throughput:         {:>12.0} msgs/sec", throughput);
    println!();
    println!("  State root:         {}", hex::encode(processor.keeper().state_root()));

    assert!(processed > 0, "Expected some messages");
    assert!(failed > 0, "Random traffic should include rejected messages");
    assert!(failed < processed, "Expected some messages to succeed");

    println!("\n=== STRESS TEST PASSED ===\n");
}

/// Verify determinism: Same sequence produces identical state root.
///
/// Every node replays the same blocks and must land on the same state.
#[test]
fn verify_determinism() {
    println!("\n=== DETERMINISM TEST ===\n");

    const TEST_BLOCKS: u64 = 200;
    const SEED: u64 = 12345;

    println!("Running {} blocks (seed={})...", TEST_BLOCKS, SEED);

    let root1 = run_deterministic_sequence(SEED, TEST_BLOCKS);
    let root2 = run_deterministic_sequence(SEED, TEST_BLOCKS);

    println!("  Run 1 state root: {}", hex::encode(root1));
    println!("  Run 2 state root: {}", hex::encode(root2));

    assert_eq!(root1, root2, "State roots must match for determinism");

    let root3 = run_deterministic_sequence(SEED + 1, TEST_BLOCKS);
    println!("  Different seed:   {}", hex::encode(root3));
    assert_ne!(root1, root3, "Different seeds should produce different roots");

    println!("\n=== DETERMINISM VERIFIED ===\n");
}

/// Test varying block counts to watch processing cost grow with state.
#[test]
fn stress_scaling() {
    println!("\n=== SCALING TEST ===\n");

    let test_sizes = [10u64, 100, 300];

    println!("{:>12} {:>12} {:>12}", "Blocks", "Time", "Per block");
    println!("{:-<12} {:-<12} {:-<12}", "", "", "");

    for &size in &test_sizes {
        let start = Instant::now();
        run_deterministic_sequence(42, size);
        let elapsed = start.elapsed();
        let per_block_us = elapsed.as_micros() as f64 / size as f64;

        println!("{:>12} {:>12.2?} {:>10.2}μs", size, elapsed, per_block_us);
    }

    println!("\n=== SCALING TEST COMPLETE ===\n");
}
