//! Shared fixtures for ledger unit tests.

use crate::params::{Mimir, ProtocolParameters, ProtocolVersion};
use crate::store::Keeper;
use crate::types::{
    Address, Asset, LiquidityProvider, NodeAccount, NodeStatus, Pool, PoolStatus, PubKey, Vault, VaultType,
};

pub(crate) fn params() -> ProtocolParameters {
    params_at(ProtocolVersion::new(1, 105, 0))
}

pub(crate) fn params_at(version: ProtocolVersion) -> ProtocolParameters {
    ProtocolParameters::resolve(version, &Mimir::default()).unwrap()
}

pub(crate) fn btc() -> Asset {
    "BTC.BTC".parse().unwrap()
}

pub(crate) fn eth() -> Asset {
    "ETH.ETH".parse().unwrap()
}

/// Available pool with the given balances and LP units
pub(crate) fn seed_pool(keeper: &mut Keeper, asset: &Asset, settlement: u128, balance_asset: u128, units: u128) -> Pool {
    let mut pool = Pool::new(asset.clone());
    pool.balance_settlement = settlement;
    pool.balance_asset = balance_asset;
    pool.lp_units = units;
    pool.status = PoolStatus::Available;
    keeper.set_pool(&pool).unwrap();
    pool
}

pub(crate) fn seed_lp(keeper: &mut Keeper, asset: &Asset, owner: &str, units: u128) -> LiquidityProvider {
    let mut lp = LiquidityProvider::new(asset.clone(), Address::from(owner), Address::new(format!("ext-{owner}")));
    lp.units = units;
    keeper.set_liquidity_provider(&lp).unwrap();
    lp
}

pub(crate) fn bond_lp(keeper: &mut Keeper, asset: &Asset, owner: &str, node: &str, units: u128) {
    let mut lp = keeper.get_liquidity_provider(asset, &Address::from(owner)).unwrap();
    lp.bond(&Address::from(node), units).unwrap();
    keeper.set_liquidity_provider(&lp).unwrap();
}

/// Node with an operator-first roster (and extra providers, all bonded)
pub(crate) fn seed_node(keeper: &mut Keeper, node: &str, operator: &str, providers: &[&str], status: NodeStatus) -> NodeAccount {
    let na = NodeAccount::new(
        Address::from(node),
        status,
        PubKey::new(format!("pk-{node}")),
        Address::from(operator),
        1,
    );
    keeper.set_node_account(&na).unwrap();

    let mut bp = keeper.get_bond_providers(&na.node_address).unwrap();
    bp.ensure_operator(&na.bond_address, 500);
    bp.bond_liquidity(&na.bond_address);
    for provider in providers {
        bp.add_provider(Address::from(*provider), 6).unwrap();
        bp.bond_liquidity(&Address::from(*provider));
    }
    keeper.set_bond_providers(&bp).unwrap();
    na
}

pub(crate) fn seed_yggdrasil(keeper: &mut Keeper, na: &NodeAccount, coins: &[crate::types::Coin]) -> Vault {
    let mut vault = Vault::new(na.pub_key.clone(), VaultType::Yggdrasil, vec![na.pub_key.clone()], 1);
    vault.add_funds(coins);
    keeper.set_vault(&vault).unwrap();
    vault
}
