//! Add and withdraw liquidity.
//!
//! ## Two-Sided Adds
//!
//! The two legs of a symmetric add may be observed in different blocks. With
//! `stage` set, a lone leg is parked on the position (`pending_*`) and on the
//! pool (`pending_inbound_*`); units are issued only once both legs are known.
//! Without `stage`, whatever arrived is added immediately (asymmetric add).
//!
//! ## Withdrawals
//!
//! Only free units can be withdrawn. Units pledged to a node stay in the pool
//! until they are unbonded.

use tracing::{error, info, warn};

use crate::errors::{LedgerError, Result};
use crate::ledger::bond::calc_liquidity_in_settlement;
use crate::ledger::msg::{AddLiquidityMsg, WithdrawLiquidityMsg};
use crate::outbound::OutboundQueue;
use crate::params::ProtocolParameters;
use crate::store::{Keeper, Store};
use crate::types::amount::BASIS_POINTS;
use crate::types::math::{safe_share, safe_sub};
use crate::types::{
    emit_or_log, Address, Asset, BondKind, Coin, Event, EventSink, LiquidityProvider, ModuleName, PoolStatus,
    TxOutItem,
};

/// Result of an add-liquidity message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The leg was parked until its pair arrives
    Pending,
    /// Units were issued to the position
    Added { units: u128 },
}

/// Result of a withdraw message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub units: u128,
    pub settlement_out: u128,
    pub asset_out: u128,
}

// ============================================================================
// Add Liquidity
// ============================================================================

fn validate_add<S: Store>(keeper: &Keeper<S>, params: &ProtocolParameters, msg: &AddLiquidityMsg) -> Result<()> {
    if msg.asset.is_empty() || msg.asset.is_settlement() {
        return Err(LedgerError::Validation(format!("cannot add liquidity to {}", msg.asset)));
    }
    if msg.settlement_amount == 0 && msg.asset_amount == 0 {
        return Err(LedgerError::Validation("nothing to add".into()));
    }
    if msg.asset_address.is_empty() {
        return Err(LedgerError::Validation("missing asset address".into()));
    }
    if msg.asset.is_vault_asset() {
        if msg.settlement_amount > 0 || !msg.settlement_address.is_empty() {
            return Err(LedgerError::Validation(format!(
                "vault pool {} takes the asset side only",
                msg.asset
            )));
        }
        if msg.bond_node.is_some() {
            return Err(LedgerError::Validation("vault liquidity cannot back a node".into()));
        }
        return Ok(());
    }
    if msg.settlement_address.is_empty() {
        return Err(LedgerError::Validation("missing settlement address".into()));
    }
    if let Some(node) = &msg.bond_node {
        if !params.is_liquidity_pool(&msg.asset) {
            return Err(LedgerError::Validation(format!("{} is not a bondable pool", msg.asset)));
        }
        let bp = keeper.get_bond_providers(node)?;
        if !bp.has(&msg.settlement_address) {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not a bond provider of {}",
                msg.settlement_address, node
            )));
        }
    }
    Ok(())
}

/// Apply an add-liquidity message
///
/// # Errors
///
/// Validation errors leave state untouched. A deposit that would leave the
/// pool with claims against an empty side is rejected as a validation error.
pub fn add_liquidity<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    msg: &AddLiquidityMsg,
    height: u64,
) -> Result<AddOutcome> {
    validate_add(keeper, params, msg)?;

    let mut pool = keeper.get_pool(&msg.asset)?;
    let synth_supply = keeper.total_supply(&msg.asset.synthetic())?;
    let original_units = pool.calc_units(synth_supply);

    let was_empty = original_units == 0;
    if was_empty {
        let layer1 = msg.asset.layer1();
        pool.status = if layer1 == layer1.gas_asset() {
            PoolStatus::Available
        } else {
            PoolStatus::default()
        };
        info!(pool = %msg.asset, status = %pool.status, "creating pool");
    }

    let owner = if msg.asset.is_vault_asset() {
        &msg.asset_address
    } else {
        &msg.settlement_address
    };
    let mut lp = match keeper.find_liquidity_provider(&msg.asset, owner)? {
        Some(lp) => {
            if lp.asset_address != msg.asset_address {
                return Err(LedgerError::MismatchedAddress);
            }
            lp
        }
        None if msg.asset.is_vault_asset() => {
            LiquidityProvider::new(msg.asset.clone(), Address::none(), msg.asset_address.clone())
        }
        None => LiquidityProvider::new(
            msg.asset.clone(),
            msg.settlement_address.clone(),
            msg.asset_address.clone(),
        ),
    };
    lp.last_add_height = height;

    let (settlement_tx_id, asset_tx_id) = match (msg.settlement_amount, msg.asset_amount) {
        (0, _) => (lp.pending_tx_id.clone(), msg.tx_id.clone()),
        (_, 0) => (msg.tx_id.clone(), lp.pending_tx_id.clone()),
        _ => (msg.tx_id.clone(), msg.tx_id.clone()),
    };
    let pending_settlement = lp.pending_settlement.saturating_add(msg.settlement_amount);
    let pending_asset = lp.pending_asset.saturating_add(msg.asset_amount);

    if msg.stage && !msg.asset.is_vault_asset() && (pending_asset == 0 || pending_settlement == 0) {
        pool.pending_inbound_settlement = pool.pending_inbound_settlement.saturating_add(msg.settlement_amount);
        pool.pending_inbound_asset = pool.pending_inbound_asset.saturating_add(msg.asset_amount);
        lp.pending_settlement = pending_settlement;
        lp.pending_asset = pending_asset;
        lp.pending_tx_id = msg.tx_id.clone();
        keeper.set_pool(&pool)?;
        keeper.set_liquidity_provider(&lp)?;
        emit_or_log(
            events,
            Event::PendingLiquidity {
                pool: msg.asset.clone(),
                settlement_address: lp.settlement_address.clone(),
                settlement_amount: msg.settlement_amount,
                asset_address: lp.asset_address.clone(),
                asset_amount: msg.asset_amount,
                tx_id: msg.tx_id.clone(),
            },
        );
        return Ok(AddOutcome::Pending);
    }

    if lp.pending_settlement > pool.pending_inbound_settlement || lp.pending_asset > pool.pending_inbound_asset {
        error!(
            pool = %msg.asset,
            lp = %lp.owner(),
            "pending inbound on pool is smaller than the position's pending legs"
        );
    }
    pool.pending_inbound_settlement = safe_sub(pool.pending_inbound_settlement, lp.pending_settlement);
    pool.pending_inbound_asset = safe_sub(pool.pending_inbound_asset, lp.pending_asset);
    lp.pending_settlement = 0;
    lp.pending_asset = 0;
    lp.pending_tx_id = Default::default();

    let (_, issued) = pool
        .add_liquidity(pending_settlement, pending_asset)
        .map_err(|err| match err {
            LedgerError::ZeroBacking(reason) => LedgerError::Validation(reason),
            other => other,
        })?;
    pool.calc_units(synth_supply);

    if msg.bond_node.is_some() {
        // a legacy whole-position pledge must claim only the units it covered
        lp.migrate_legacy_bond();
    }
    lp.units = lp.units.saturating_add(issued);

    if pool.is_available() {
        let total = pool.pool_units();
        if lp.settlement_deposit_value == 0 && lp.asset_deposit_value == 0 {
            // first valuation covers units issued while the pool was staged
            lp.settlement_deposit_value = safe_share(lp.units, total, pool.balance_settlement);
            lp.asset_deposit_value = safe_share(lp.units, total, pool.balance_asset);
        } else {
            lp.settlement_deposit_value = lp
                .settlement_deposit_value
                .saturating_add(safe_share(issued, total, pool.balance_settlement));
            lp.asset_deposit_value = lp
                .asset_deposit_value
                .saturating_add(safe_share(issued, total, pool.balance_asset));
        }
    }

    let mut bond_event = None;
    if let Some(node) = &msg.bond_node {
        if pool.is_available() {
            lp.bond(node, issued)?;
            let mut bp = keeper.get_bond_providers(node)?;
            bp.bond_liquidity(&lp.settlement_address);
            keeper.set_bond_providers(&bp)?;
            bond_event = Some((node.clone(), calc_liquidity_in_settlement(&pool, issued)?));
        } else {
            warn!(pool = %msg.asset, status = %pool.status, "pool not available, units left unbonded");
        }
    } else if let Some(node) = lp.node_bond_address.clone() {
        let mut bp = keeper.get_bond_providers(&node)?;
        if bp.bond_liquidity(&lp.settlement_address) {
            keeper.set_bond_providers(&bp)?;
        }
        bond_event = Some((node, calc_liquidity_in_settlement(&pool, issued)?));
    }

    keeper.set_pool(&pool)?;
    keeper.set_liquidity_provider(&lp)?;

    if was_empty && pool.pool_units() > 0 {
        emit_or_log(
            events,
            Event::Pool {
                pool: msg.asset.clone(),
                status: pool.status,
            },
        );
    }
    emit_or_log(
        events,
        Event::AddLiquidity {
            pool: msg.asset.clone(),
            units: issued,
            settlement_address: lp.settlement_address.clone(),
            settlement_amount: pending_settlement,
            asset_address: lp.asset_address.clone(),
            asset_amount: pending_asset,
            settlement_tx_id,
            asset_tx_id,
        },
    );
    if let Some((node_address, value)) = bond_event {
        emit_or_log(
            events,
            Event::Bond {
                node_address,
                asset: Asset::settlement(),
                amount: value,
                kind: BondKind::Paid,
                tx_id: msg.tx_id.clone(),
            },
        );
    }

    info!(pool = %msg.asset, lp = %lp.owner(), units = issued, "liquidity added");
    Ok(AddOutcome::Added { units: issued })
}

// ============================================================================
// Withdraw Liquidity
// ============================================================================

/// Apply a withdraw message
///
/// Withdraws `basis_points` of the position's free units and schedules one
/// outbound payment per non-zero leg.
///
/// # Errors
///
/// - [`LedgerError::Validation`] for an out-of-range basis point value
/// - [`LedgerError::InsufficientLiquidity`] if the position holds no free units
/// - [`LedgerError::Outbound`] if the block's outbound capacity is used up;
///   nothing is committed in that case
pub fn withdraw_liquidity<S: Store>(
    keeper: &mut Keeper<S>,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    msg: &WithdrawLiquidityMsg,
) -> Result<WithdrawOutcome> {
    if msg.basis_points == 0 || msg.basis_points > BASIS_POINTS {
        return Err(LedgerError::Validation(format!(
            "basis points {} out of range",
            msg.basis_points
        )));
    }
    if msg.asset.is_settlement() {
        return Err(LedgerError::Validation("cannot withdraw from the settlement asset".into()));
    }

    let mut lp = keeper
        .find_liquidity_provider(&msg.asset, &msg.address)?
        .ok_or_else(|| LedgerError::InsufficientLiquidity(format!("{} has no position in {}", msg.address, msg.asset)))?;
    let units = safe_share(msg.basis_points, BASIS_POINTS, lp.remaining_units());
    if units == 0 {
        return Err(LedgerError::InsufficientLiquidity(format!(
            "{} has no free units in {}",
            msg.address, msg.asset
        )));
    }

    let mut pool = keeper.get_pool(&msg.asset)?;
    let synth_supply = keeper.total_supply(&msg.asset.synthetic())?;
    pool.calc_units(synth_supply);
    let (settlement_out, asset_out) = pool.withdraw(units)?;
    pool.calc_units(synth_supply);

    let mut payments = Vec::with_capacity(2);
    if settlement_out > 0 {
        payments.push(TxOutItem::new(
            lp.settlement_address.clone(),
            Coin::new(Asset::settlement(), settlement_out),
            msg.tx_id.clone(),
            "",
        ));
    }
    if asset_out > 0 {
        payments.push(TxOutItem::new(
            lp.asset_address.clone(),
            Coin::new(msg.asset.clone(), asset_out),
            msg.tx_id.clone(),
            "",
        ));
    }
    if payments.iter().any(|p| p.to_address.is_empty()) {
        return Err(LedgerError::Validation("position has no address for a withdrawn leg".into()));
    }
    if !queue.has_capacity(payments.len()) {
        return Err(LedgerError::Outbound("outbound capacity for this block is used up".into()));
    }

    let old_units = lp.units;
    lp.settlement_deposit_value = safe_sub(
        lp.settlement_deposit_value,
        safe_share(units, old_units, lp.settlement_deposit_value),
    );
    lp.asset_deposit_value = safe_sub(lp.asset_deposit_value, safe_share(units, old_units, lp.asset_deposit_value));
    lp.units = safe_sub(lp.units, units);

    keeper.set_pool(&pool)?;
    if lp.units == 0 && !lp.has_pending() && lp.bonded_nodes.is_empty() {
        keeper.remove_liquidity_provider(&lp);
    } else {
        keeper.set_liquidity_provider(&lp)?;
    }

    for payment in payments {
        if !queue.try_add(payment.with_module(ModuleName::Asgard))? {
            error!(tx = %msg.tx_id, "withdraw payment not scheduled despite capacity");
        }
    }

    emit_or_log(
        events,
        Event::WithdrawLiquidity {
            pool: msg.asset.clone(),
            address: msg.address.clone(),
            units,
            basis_points: msg.basis_points,
            settlement_out,
            asset_out,
            tx_id: msg.tx_id.clone(),
        },
    );
    info!(pool = %msg.asset, lp = %msg.address, units, settlement_out, asset_out, "liquidity withdrawn");
    Ok(WithdrawOutcome {
        units,
        settlement_out,
        asset_out,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
