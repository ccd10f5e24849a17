//! Bond slashing and pool subsidization.
//!
//! Slashing burns LP units a node's providers pledged to it and hands them
//! to the reserve's protocol-owned liquidity (POL) position in the same
//! pool, so per-pool unit totals are unchanged. When a vault loses funds,
//! the reserve then pays the affected pools the settlement value of what
//! went missing, provided it can afford to.
//!
//! Nothing here rolls back: once a unit is slashed it stays slashed, and a
//! subsidy that fails for one pool does not stop the others.

use tracing::{error, info, warn};

use crate::errors::Result;
use crate::ledger::bond::{calc_liquidity_in_settlement, calc_node_liquidity_bond, calc_total_bondable_liquidity};
use crate::params::ProtocolParameters;
use crate::store::{Keeper, Store};
use crate::types::amount::BASIS_POINTS;
use crate::types::math::{safe_share, uncapped_share};
use crate::types::{emit_or_log, Address, Asset, BondKind, Coin, Event, EventSink, ModuleName, NodeAccount, PubKey, TxId, Vault};

/// Settlement value of `coins` at current pool prices
///
/// Synthetic coins are priced in their layer-1 pool.
pub fn coins_value_in_settlement<S: Store>(keeper: &Keeper<S>, coins: &[Coin]) -> Result<u128> {
    let mut total = 0u128;
    for coin in coins.iter().filter(|c| !c.is_empty()) {
        if coin.asset.is_settlement() {
            total = total.saturating_add(coin.amount);
            continue;
        }
        let pool = keeper.get_pool(&coin.asset.layer1())?;
        total = total.saturating_add(pool.asset_value_in_settlement(coin.amount));
    }
    Ok(total)
}

/// Burn up to `amount` (settlement value) of the units pledged to `node`
///
/// Every backer loses the same fraction of its pledge. Burned units are
/// credited to the reserve's position in the same pool. Returns the
/// settlement value actually moved, which can fall short of `amount` through
/// unit truncation.
pub fn slash_node_lp<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    node: &Address,
    amount: u128,
) -> Result<u128> {
    if amount == 0 {
        return Ok(0);
    }
    let node_bond = calc_node_liquidity_bond(keeper, params, node)?;
    if node_bond == 0 {
        warn!(%node, amount, "node has no bond to slash");
        return Ok(0);
    }
    let amount = amount.min(node_bond);
    let reserve = Keeper::<S>::module_address(ModuleName::Reserve);

    let mut slashed = 0u128;
    for asset in params.liquidity_pools() {
        let pool = keeper.get_pool(asset)?;
        let mut burned = 0u128;
        for mut lp in keeper.liquidity_providers(asset)? {
            if lp.owner() == &reserve {
                continue;
            }
            let bonded = lp.units_bonded_to_node(node);
            if bonded == 0 {
                continue;
            }
            let bonded_value = calc_liquidity_in_settlement(&pool, bonded)?;
            let target = safe_share(bonded_value, node_bond, amount);
            let units = safe_share(target, bonded_value, bonded);
            if units == 0 {
                continue;
            }
            burned = burned.saturating_add(lp.slash_bonded(node, units));
            keeper.set_liquidity_provider(&lp)?;
        }
        if burned == 0 {
            continue;
        }

        let mut pol = keeper.get_liquidity_provider(asset, &reserve)?;
        pol.units = pol.units.saturating_add(burned);
        keeper.set_liquidity_provider(&pol)?;

        let value = calc_liquidity_in_settlement(&pool, burned)?;
        slashed = slashed.saturating_add(value);
        info!(%node, pool = %asset, units = burned, value, "slashed bonded liquidity");
        emit_or_log(
            events,
            Event::SlashLiquidity {
                node_address: node.clone(),
                pool: asset.clone(),
                units: burned,
                value,
            },
        );
    }
    Ok(slashed)
}

struct Subsidy {
    asset: Asset,
    stolen: u128,
    value: u128,
}

fn signed(amount: u128) -> i128 {
    i128::try_from(amount).unwrap_or(i128::MAX)
}

/// Make pools whole for `coins` lost from `vault_pub_key`, paid by the reserve
///
/// `total_stolen` is capped at the reserve's POL value. Pools are only
/// subsidized when the reserve balance exceeds the capped value times
/// `SubsidizeReserveMultiplier`; otherwise they absorb the loss.
///
/// Afterwards, for every bondable pool whose POL toggle is on, the reserve
/// withdraws part of its position there: half the subsidy's bps of POL for a
/// subsidized pool, the full capped stolen bps otherwise.
pub fn subsidize_pools_with_slash_bond<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    vault_pub_key: &PubKey,
    coins: &[Coin],
    total_stolen: u128,
    slashed: u128,
) -> Result<()> {
    if total_stolen == 0 || slashed == 0 {
        info!(vault = %vault_pub_key, total_stolen, slashed, "nothing stolen or slashed, no subsidy");
        return Ok(());
    }

    let reserve = Keeper::<S>::module_address(ModuleName::Reserve);
    let pol = calc_total_bondable_liquidity(keeper, params, &reserve)?;
    let mut stolen = total_stolen;
    if pol < stolen {
        error!(vault = %vault_pub_key, stolen, pol, "vault lost more than protocol-owned liquidity");
        emit_or_log(
            events,
            Event::StolenValueCapped {
                vault: vault_pub_key.clone(),
                stolen,
                capped: pol,
            },
        );
        stolen = pol;
    }

    let mut subsidies = Vec::new();
    for coin in coins.iter().filter(|c| !c.is_empty() && !c.asset.is_settlement()) {
        let pool = keeper.get_pool(&coin.asset.layer1())?;
        let value = pool.asset_value_in_settlement(coin.amount);
        if value == 0 {
            info!(pool = %pool.asset, amount = coin.amount, "stolen asset has no settlement value");
            continue;
        }
        subsidies.push(Subsidy {
            asset: pool.asset,
            stolen: coin.amount,
            value,
        });
    }

    let reserve_balance = keeper.module_balance(ModuleName::Reserve)?;
    let required = stolen.saturating_mul(params.subsidize_reserve_multiplier());
    if reserve_balance <= required {
        warn!(vault = %vault_pub_key, reserve_balance, required, "reserve too small, pools absorb the loss");
        emit_or_log(
            events,
            Event::SubsidySkipped {
                vault: vault_pub_key.clone(),
                reserve: reserve_balance,
                required,
            },
        );
    } else {
        for subsidy in &subsidies {
            let mut pool = keeper.get_pool(&subsidy.asset)?;
            if pool.is_empty() {
                continue;
            }
            if let Err(err) = keeper.send_module_to_module(ModuleName::Reserve, ModuleName::Asgard, subsidy.value) {
                error!(pool = %pool.asset, %err, "fail to move subsidy from reserve");
                continue;
            }
            pool.balance_settlement = pool.balance_settlement.saturating_add(subsidy.value);
            pool.sub_asset(subsidy.stolen);
            keeper.set_pool(&pool)?;

            emit_or_log(
                events,
                Event::Slash {
                    pool: pool.asset.clone(),
                    deltas: vec![
                        (pool.asset.clone(), -signed(subsidy.stolen)),
                        (Asset::settlement(), signed(subsidy.value)),
                    ],
                },
            );
        }
    }

    if pol == 0 {
        return Ok(());
    }
    for asset in params.liquidity_pools() {
        if !params.pol_enabled(asset) {
            continue;
        }
        let part = subsidies
            .iter()
            .find(|s| &s.asset == asset)
            .map_or(stolen, |s| s.value / 2);
        let basis_points = safe_share(part, pol, BASIS_POINTS);
        if let Err(err) = withdraw_reserve_liquidity(keeper, events, asset, basis_points) {
            error!(pool = %asset, basis_points, %err, "fail to withdraw protocol-owned liquidity");
        }
    }
    Ok(())
}

/// Draw down `basis_points` of the reserve's free units in `asset`
///
/// The position is redeemed in the settlement asset and the proceeds move
/// from the pool module to the reserve. Nothing is written if the transfer
/// fails.
fn withdraw_reserve_liquidity<S: Store>(
    keeper: &mut Keeper<S>,
    events: &mut dyn EventSink,
    asset: &Asset,
    basis_points: u128,
) -> Result<()> {
    let reserve = Keeper::<S>::module_address(ModuleName::Reserve);
    let mut lp = keeper.get_liquidity_provider(asset, &reserve)?;
    let units = safe_share(basis_points, BASIS_POINTS, lp.remaining_units());
    if units == 0 {
        return Ok(());
    }

    let mut pool = keeper.get_pool(asset)?;
    let settlement_out = pool.withdraw_to_settlement(units)?;
    keeper.send_module_to_module(ModuleName::Asgard, ModuleName::Reserve, settlement_out)?;
    lp.units -= units;
    keeper.set_liquidity_provider(&lp)?;
    keeper.set_pool(&pool)?;

    info!(pool = %asset, units, basis_points, settlement_out, "withdrew protocol-owned liquidity");
    emit_or_log(
        events,
        Event::WithdrawLiquidity {
            pool: asset.clone(),
            address: reserve,
            units,
            basis_points,
            settlement_out,
            asset_out: 0,
            tx_id: TxId::blank(),
        },
    );
    Ok(())
}

/// Slash the nodes responsible for `coins` missing from `vault`
///
/// The stolen value is split evenly across the vault's members (the owner,
/// for a Yggdrasil vault). Each member is charged `SlashPenalty` bps of its
/// share, capped at its bond. Returns the total value slashed.
pub fn slash_vault_theft<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    vault: &Vault,
    coins: &[Coin],
    tx_id: &TxId,
) -> Result<u128> {
    let stolen = coins_value_in_settlement(keeper, coins)?;
    if stolen == 0 {
        return Ok(0);
    }

    let mut members: Vec<NodeAccount> = Vec::new();
    if vault.is_yggdrasil() {
        members.extend(keeper.node_account_by_pub_key(&vault.pub_key)?);
    } else {
        for member in &vault.membership {
            members.extend(keeper.node_account_by_pub_key(member)?);
        }
    }
    if members.is_empty() {
        error!(vault = %vault.pub_key, stolen, "no node to slash for missing funds");
        return Ok(0);
    }

    let share = stolen / members.len() as u128;
    let mut total = 0u128;
    for na in &members {
        let bond = calc_node_liquidity_bond(keeper, params, &na.node_address)?;
        let target = uncapped_share(params.slash_penalty(), BASIS_POINTS, share).min(bond);
        let slashed = slash_node_lp(keeper, params, events, &na.node_address, target)?;
        if slashed < target {
            error!(node = %na.node_address, target, slashed, "slashed less than the penalty");
        }
        if slashed > 0 {
            emit_or_log(
                events,
                Event::Bond {
                    node_address: na.node_address.clone(),
                    asset: Asset::settlement(),
                    amount: slashed,
                    kind: BondKind::Cost,
                    tx_id: tx_id.clone(),
                },
            );
        }
        total = total.saturating_add(slashed);
    }

    if let Err(err) = subsidize_pools_with_slash_bond(keeper, params, events, &vault.pub_key, coins, stolen, total) {
        error!(vault = %vault.pub_key, %err, "fail to subsidize pools with slashed bond");
    }
    Ok(total)
}

// ============================================================================
// Unit Tests
// ============================================================================
