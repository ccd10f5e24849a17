//! Liquidity Core - Binary Entry Point
//!
//! Runs a short scripted sequence of blocks against an in-memory store:
//! two providers add liquidity, bond it to a node, and get it back when a
//! churn retires the node's Yggdrasil vault. Set `RUST_LOG=debug` for the
//! ledger's own logs.

use liquidity_core::ledger::{calc_node_liquidity_bond, AddLiquidityMsg, BlockProcessor, BondMsg, LedgerMsg};
use liquidity_core::params::{Mimir, ProtocolParameters, ProtocolVersion};
use liquidity_core::store::{Keeper, MemoryStore};
use liquidity_core::types::amount::{from_base_units_trimmed, ONE};
use liquidity_core::types::{Address, Asset, BlockReceipt, PubKey, TxId, Vault, VaultType};
use liquidity_core::Result;
use tracing_subscriber::EnvFilter;

fn add(tx: &str, owner: &str, settlement: u128, asset: u128) -> Result<LedgerMsg> {
    Ok(LedgerMsg::AddLiquidity(AddLiquidityMsg {
        tx_id: TxId::from(tx),
        asset: "BTC.BTC".parse()?,
        settlement_amount: settlement,
        asset_amount: asset,
        settlement_address: Address::new(format!("maya1{owner}")),
        asset_address: Address::new(format!("bc1{owner}")),
        stage: false,
        bond_node: None,
    }))
}

fn bond(tx: &str, signer: &str, provider: Option<&str>) -> LedgerMsg {
    LedgerMsg::Bond(BondMsg {
        tx_id: TxId::from(tx),
        node_address: Address::from("maya1node"),
        bond_address: Address::new(format!("maya1{signer}")),
        bond_provider_address: provider.map(|p| Address::new(format!("maya1{p}"))),
        operator_fee: None,
        pub_key: PubKey::from("pk-node"),
        amount: 0,
    })
}

fn report(receipt: &BlockReceipt, processor: &BlockProcessor) {
    println!(
        "block {:>3}: {} msgs, {} failed, {} events, {} outbound, root {}",
        receipt.height,
        receipt.messages_processed,
        receipt.messages_failed,
        receipt.events_emitted,
        receipt.outbound_queued,
        &receipt.state_root_hex()[..16],
    );
    for event in processor.events() {
        println!("           - {}", event.kind());
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("===========================================");
    println!("  Liquidity Core - ledger walkthrough");
    println!("===========================================");
    println!();

    let mut processor = BlockProcessor::new(Keeper::new(MemoryStore::new()), ProtocolVersion::new(1, 105, 0));
    let btc: Asset = "BTC.BTC".parse()?;

    let receipt = processor.process_block(
        1,
        &[
            add("ADD-ALICE", "alice", 10_000 * ONE, ONE)?,
            add("ADD-BOB", "bob", 5_000 * ONE, ONE / 2)?,
        ],
    )?;
    report(&receipt, &processor);

    let receipt = processor.process_block(
        2,
        &[
            bond("BOND-ALICE", "alice", None),
            bond("ADD-PROVIDER", "alice", Some("bob")),
            bond("BOND-BOB", "bob", None),
        ],
    )?;
    report(&receipt, &processor);

    let node = Address::from("maya1node");
    let ygg = Vault::new(PubKey::from("pk-node"), VaultType::Yggdrasil, vec![PubKey::from("pk-node")], 2);
    processor.keeper_mut().set_vault(&ygg)?;
    let params = ProtocolParameters::resolve(processor.version(), &Mimir::default())?;
    let bonded = calc_node_liquidity_bond(processor.keeper(), &params, &node)?;
    println!();
    println!("node bond: {} CACAO", from_base_units_trimmed(bonded));
    println!();

    let asgard = Vault::new(PubKey::from("pk-asgard-3"), VaultType::Asgard, vec![], 3);
    let receipt = processor.process_block(3, &[LedgerMsg::Churn(asgard)])?;
    report(&receipt, &processor);

    println!();
    let pool = processor.keeper().get_pool(&btc)?;
    println!(
        "pool {}: {} CACAO / {} BTC, {} units",
        pool.asset,
        from_base_units_trimmed(pool.balance_settlement),
        from_base_units_trimmed(pool.balance_asset),
        pool.lp_units
    );
    for lp in processor.keeper().liquidity_providers(&btc)? {
        println!(
            "  {}: {} units, {} bonded",
            lp.owner(),
            lp.units,
            lp.total_bonded_units()
        );
    }
    Ok(())
}
