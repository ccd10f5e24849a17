//! Node bonding.
//!
//! A node's bond is not a separate balance: it is the settlement value of
//! every LP unit pledged to the node across the bondable pools. Bonding
//! earmarks units on the provider's positions; unbonding releases them (see
//! [`refund_bond`](crate::ledger::refund_bond)).
//!
//! ## Roster Rules
//!
//! - The operator (the node's `bond_address`) is always the first provider.
//! - Only the operator adds providers, up to `MaxBondProviders`.
//! - A provider's first bond pledges all of its free units in bondable pools;
//!   later top-ups go through add-liquidity with a `bond_node`.
//! - Only the operator sets the fee, and cannot raise it once another
//!   provider has bonded.

use tracing::{info, warn};

use crate::errors::{LedgerError, Result};
use crate::ledger::msg::{BondMsg, LeaveMsg, UnbondMsg};
use crate::ledger::refund::{refund_bond, RefundOutcome, RefundRequest};
use crate::outbound::OutboundQueue;
use crate::params::ProtocolParameters;
use crate::store::{Keeper, Store};
use crate::types::math::safe_share;
use crate::types::{emit_or_log, Address, Asset, BondKind, Event, EventSink, NodeAccount, NodeStatus, Pool};

// ============================================================================
// Valuation
// ============================================================================

/// Settlement value of `units` of `pool`: the settlement share plus the
/// asset share priced at the pool ratio
///
/// # Errors
///
/// Returns [`LedgerError::InsufficientLiquidity`] if `units` exceeds the
/// pool's LP units.
pub fn calc_liquidity_in_settlement(pool: &Pool, units: u128) -> Result<u128> {
    if units > pool.lp_units {
        return Err(LedgerError::InsufficientLiquidity(format!(
            "{} units exceed the {} LP units of {}",
            units, pool.lp_units, pool.asset
        )));
    }
    let total = pool.pool_units();
    let settlement = safe_share(units, total, pool.balance_settlement);
    let asset = safe_share(units, total, pool.balance_asset);
    Ok(settlement.saturating_add(pool.asset_value_in_settlement(asset)))
}

/// Value of the units every provider has pledged to `node`
pub fn calc_node_liquidity_bond<S: Store>(
    keeper: &Keeper<S>,
    params: &ProtocolParameters,
    node: &Address,
) -> Result<u128> {
    let mut bond = 0u128;
    for asset in params.liquidity_pools() {
        let units = keeper
            .liquidity_providers(asset)?
            .iter()
            .fold(0u128, |acc, lp| acc.saturating_add(lp.units_bonded_to_node(node)));
        if units == 0 {
            continue;
        }
        let pool = keeper.get_pool(asset)?;
        bond = bond.saturating_add(calc_liquidity_in_settlement(&pool, units)?);
    }
    Ok(bond)
}

/// Value of the units `provider` has pledged to `node`
pub fn calc_lp_liquidity_bond<S: Store>(
    keeper: &Keeper<S>,
    params: &ProtocolParameters,
    provider: &Address,
    node: &Address,
) -> Result<u128> {
    let mut bond = 0u128;
    for lp in keeper.liquidity_providers_by_assets(params.liquidity_pools(), provider)? {
        let units = lp.units_bonded_to_node(node);
        if units == 0 {
            continue;
        }
        let pool = keeper.get_pool(&lp.asset)?;
        bond = bond.saturating_add(calc_liquidity_in_settlement(&pool, units)?);
    }
    Ok(bond)
}

/// Value of every unit `address` holds in bondable pools, pledged or not
pub fn calc_total_bondable_liquidity<S: Store>(
    keeper: &Keeper<S>,
    params: &ProtocolParameters,
    address: &Address,
) -> Result<u128> {
    let mut total = 0u128;
    for lp in keeper.liquidity_providers_by_assets(params.liquidity_pools(), address)? {
        let pool = keeper.get_pool(&lp.asset)?;
        total = total.saturating_add(calc_liquidity_in_settlement(&pool, lp.units.min(pool.lp_units))?);
    }
    Ok(total)
}

/// Value of the free units `address` holds in available bondable pools
pub fn calc_free_bondable_liquidity<S: Store>(
    keeper: &Keeper<S>,
    params: &ProtocolParameters,
    address: &Address,
) -> Result<u128> {
    let mut total = 0u128;
    for lp in keeper.liquidity_providers_by_assets(params.liquidity_pools(), address)? {
        let pool = keeper.get_pool(&lp.asset)?;
        if !pool.is_available() {
            continue;
        }
        total = total.saturating_add(calc_liquidity_in_settlement(&pool, lp.remaining_units())?);
    }
    Ok(total)
}

/// Share of `reward` earned by `withdrawn` out of a node bond of `bond`
///
/// ```
/// use liquidity_core::ledger::reward_share;
///
/// assert_eq!(reward_share(250, 1_000, 100), 25);
/// assert_eq!(reward_share(250, 0, 100), 0);
/// ```
pub fn reward_share(withdrawn: u128, bond: u128, reward: u128) -> u128 {
    safe_share(withdrawn, bond, reward)
}

// ============================================================================
// Bond
// ============================================================================

/// Check a bond message against current state
pub fn validate_bond<S: Store>(keeper: &Keeper<S>, params: &ProtocolParameters, msg: &BondMsg) -> Result<()> {
    if msg.node_address.is_empty() || msg.bond_address.is_empty() {
        return Err(LedgerError::Validation("bond requires a node and a bond address".into()));
    }
    let na = keeper.get_node_account(&msg.node_address)?;
    if na.status == NodeStatus::Ready {
        return Err(LedgerError::Validation(format!(
            "cannot add bond while node {} is ready",
            na.node_address
        )));
    }
    if params.bond_paused() {
        return Err(LedgerError::Paused("bonding"));
    }

    let bp = keeper.get_bond_providers(&msg.node_address)?;
    if let Some(fee) = msg.operator_fee {
        if fee > crate::types::amount::BASIS_POINTS {
            return Err(LedgerError::Validation(format!("operator fee {fee} out of range")));
        }
        if !na.bond_address.is_empty() {
            if msg.bond_address != na.bond_address {
                return Err(LedgerError::Unauthorized("only the node operator can set the fee".into()));
            }
            if fee > bp.node_operator_fee && bp.has_provider_bonded(&na.bond_address) {
                return Err(LedgerError::FeeIncreaseLocked);
            }
        }
    }

    if calc_total_bondable_liquidity(keeper, params, &msg.bond_address)? == 0 {
        return Err(LedgerError::InsufficientLiquidity(format!(
            "{} has no liquidity in bondable pools",
            msg.bond_address
        )));
    }

    let first_bond = bp.get(&msg.bond_address).map_or(true, |p| !p.bonded);
    if let Some(max) = params.maximum_bond() {
        if first_bond {
            let node_bond = calc_node_liquidity_bond(keeper, params, &msg.node_address)?;
            let incoming = calc_free_bondable_liquidity(keeper, params, &msg.bond_address)?;
            if node_bond.saturating_add(incoming) > max {
                return Err(LedgerError::Validation(format!(
                    "bond would exceed the maximum of {max}"
                )));
            }
        }
    }

    if na.bond_address.is_empty() || msg.bond_address == na.bond_address {
        return Ok(());
    }
    match bp.get(&msg.bond_address) {
        None => Err(LedgerError::Unauthorized(format!(
            "{} is not a bond provider of {}",
            msg.bond_address, msg.node_address
        ))),
        Some(p) if p.bonded => Err(LedgerError::Validation(
            "provider already bonded; add liquidity to increase the bond".into(),
        )),
        Some(_) => Ok(()),
    }
}

/// Apply a validated bond message
pub fn handle_bond<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    msg: &BondMsg,
    height: u64,
) -> Result<()> {
    let mut na = keeper.get_node_account(&msg.node_address)?;
    if na.status == NodeStatus::Unknown {
        na = NodeAccount::new(
            msg.node_address.clone(),
            NodeStatus::Whitelisted,
            msg.pub_key.clone(),
            msg.bond_address.clone(),
            height,
        );
        info!(node = %na.node_address, operator = %na.bond_address, "node whitelisted");
        emit_or_log(
            events,
            Event::NewNode {
                node_address: na.node_address.clone(),
            },
        );
    }

    let mut bp = keeper.get_bond_providers(&na.node_address)?;
    bp.ensure_operator(&na.bond_address, params.node_operator_fee());

    let mut earmarked = Vec::new();
    let mut bonded_value = 0u128;
    if bp.get(&msg.bond_address).is_some_and(|p| !p.bonded) {
        for mut lp in keeper.liquidity_providers_by_assets(params.liquidity_pools(), &msg.bond_address)? {
            let free = lp.remaining_units();
            if free == 0 {
                continue;
            }
            let pool = keeper.get_pool(&lp.asset)?;
            if !pool.is_available() {
                continue;
            }
            lp.bond(&na.node_address, free)?;
            bonded_value = bonded_value.saturating_add(calc_liquidity_in_settlement(&pool, free)?);
            earmarked.push(lp);
        }
        if !earmarked.is_empty() {
            bp.bond_liquidity(&msg.bond_address);
        }
    }

    if msg.bond_address == na.bond_address {
        if let Some(provider) = &msg.bond_provider_address {
            if bp.add_provider(provider.clone(), params.max_bond_providers())? {
                info!(node = %na.node_address, %provider, "bond provider added");
            }
        }
    }
    if let Some(fee) = msg.operator_fee {
        bp.set_operator_fee(fee, &na.bond_address)?;
    }

    keeper.set_liquidity_providers(&earmarked)?;
    keeper.set_bond_providers(&bp)?;
    keeper.set_node_account(&na)?;

    if bonded_value > 0 {
        emit_or_log(
            events,
            Event::Bond {
                node_address: na.node_address.clone(),
                asset: Asset::settlement(),
                amount: bonded_value,
                kind: BondKind::Paid,
                tx_id: msg.tx_id.clone(),
            },
        );
    }
    info!(node = %na.node_address, provider = %msg.bond_address, value = bonded_value, "bond applied");
    Ok(())
}

// ============================================================================
// Unbond
// ============================================================================

/// Check an unbond message against current state
pub fn validate_unbond<S: Store>(keeper: &Keeper<S>, params: &ProtocolParameters, msg: &UnbondMsg) -> Result<()> {
    if params.unbond_paused() {
        return Err(LedgerError::Paused("unbonding"));
    }
    let na = keeper.get_node_account(&msg.node_address)?;
    match na.status {
        NodeStatus::Unknown => {
            return Err(LedgerError::Validation(format!("node {} not found", msg.node_address)));
        }
        NodeStatus::Active | NodeStatus::Ready => {
            return Err(LedgerError::Validation(format!(
                "cannot unbond while node is {}",
                na.status
            )));
        }
        _ => {}
    }

    let bp = keeper.get_bond_providers(&msg.node_address)?;
    if !bp.has(&msg.bond_address) && msg.bond_address != na.bond_address {
        return Err(LedgerError::Unauthorized(format!(
            "{} is not a bond provider of {}",
            msg.bond_address, msg.node_address
        )));
    }
    if let Some(provider) = &msg.bond_provider_address {
        if msg.bond_address != na.bond_address {
            return Err(LedgerError::Unauthorized("only the node operator can remove providers".into()));
        }
        if provider == &na.bond_address {
            return Err(LedgerError::Validation("the operator cannot remove itself".into()));
        }
        if !bp.has(provider) {
            return Err(LedgerError::Validation(format!("{provider} is not a bond provider")));
        }
    }
    match &msg.asset {
        Some(asset) if !params.is_liquidity_pool(asset) => {
            Err(LedgerError::Validation(format!("{asset} is not a bondable pool")))
        }
        None if msg.units > 0 => Err(LedgerError::Validation("units require a pool".into())),
        _ => Ok(()),
    }
}

/// Apply a validated unbond message
///
/// When the operator names a provider, that provider's bond is released and
/// the provider is dropped from the roster once nothing stays pledged.
pub fn handle_unbond<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    msg: &UnbondMsg,
    height: u64,
) -> Result<RefundOutcome> {
    let mut na = keeper.get_node_account(&msg.node_address)?;
    let provider = msg
        .bond_provider_address
        .clone()
        .unwrap_or_else(|| msg.bond_address.clone());
    let request = RefundRequest {
        tx_id: &msg.tx_id,
        provider: &provider,
        asset: msg.asset.as_ref(),
        units: msg.units,
    };
    let outcome = refund_bond(keeper, params, queue, events, &request, &mut na, height)?;

    if msg.bond_provider_address.is_some() {
        let mut bp = keeper.get_bond_providers(&msg.node_address)?;
        if bp.get(&provider).is_some_and(|p| !p.bonded) {
            bp.remove_provider(&provider)?;
            keeper.set_bond_providers(&bp)?;
            info!(node = %msg.node_address, %provider, "bond provider removed");
        } else {
            warn!(node = %msg.node_address, %provider, "provider still has bond, kept on roster");
        }
    }
    Ok(outcome)
}

// ============================================================================
// Leave
// ============================================================================

/// Flag a node to be disabled once its bond is refunded
pub fn handle_leave<S: Store>(keeper: &mut Keeper<S>, msg: &LeaveMsg) -> Result<()> {
    let mut na = keeper.get_node_account(&msg.node_address)?;
    if na.status == NodeStatus::Unknown {
        return Err(LedgerError::Validation(format!("node {} not found", msg.node_address)));
    }
    if msg.signer != na.bond_address {
        return Err(LedgerError::Unauthorized("only the node operator can request to leave".into()));
    }
    if na.status == NodeStatus::Disabled {
        return Err(LedgerError::Validation(format!("node {} already left", msg.node_address)));
    }
    na.requested_to_leave = true;
    keeper.set_node_account(&na)?;
    info!(node = %na.node_address, status = %na.status, "node requested to leave");
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
