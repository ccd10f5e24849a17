//! Bond refunds.
//!
//! A refund releases a provider's pledged LP units back to the provider and
//! pays out the provider's share of the node's undistributed reward. Before
//! anything is released, whatever is still sitting in the node's Yggdrasil
//! vault is charged against the node's bond.
//!
//! ## Ordering
//!
//! 1. Serving (Active/Ready) nodes are skipped without touching state.
//! 2. The Yggdrasil residual is slashed, pools are subsidized and the vault
//!    is zeroed. This is committed immediately: slashing never rolls back,
//!    and a retried refund must not slash the same residual twice.
//! 3. Units are unbonded and the reward share is scheduled. A full outbound
//!    queue aborts the attempt here, before any unbond is committed.
//! 4. Positions, roster and node are written back, then the drained vault
//!    is deleted.
//!
//! Two strategies exist. Before 1.105.0 a refund always released the
//! provider's whole bond; from 1.105.0 it releases the requested units of
//! one pool (or everything, across all bondable pools).

use tracing::{error, info};

use crate::errors::{LedgerError, Result};
use crate::ledger::bond::{calc_liquidity_in_settlement, calc_lp_liquidity_bond, calc_node_liquidity_bond, reward_share};
use crate::ledger::slashing::{coins_value_in_settlement, slash_node_lp, subsidize_pools_with_slash_bond};
use crate::outbound::OutboundQueue;
use crate::params::{ProtocolParameters, ProtocolVersion, VersionTable};
use crate::store::{Keeper, Store};
use crate::types::amount::BASIS_POINTS;
use crate::types::math::{safe_share, safe_sub, uncapped_share};
use crate::types::{
    emit_or_log, Address, Asset, BondKind, BondProviders, Coin, Event, EventSink, LiquidityProvider, ModuleName,
    NodeAccount, NodeStatus, TxId, TxOutItem, Vault,
};

/// What to refund, and to whom
#[derive(Debug, Clone, Copy)]
pub struct RefundRequest<'a> {
    pub tx_id: &'a TxId,
    pub provider: &'a Address,
    /// Pool to release from; `None` means every bondable pool
    pub asset: Option<&'a Asset>,
    /// Units to release; zero means everything pledged
    pub units: u128,
}

/// Result of a refund attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// The node is serving; nothing changed
    Skipped,
    Refunded {
        /// Bond value burned for the Yggdrasil residual
        slashed: u128,
        /// Settlement value of the units released
        returned: u128,
        /// Reward paid out (operator fee included)
        reward: u128,
    },
}

/// Signature shared by the refund strategies
pub type RefundStrategy<S> = fn(
    &mut Keeper<S>,
    &ProtocolParameters,
    &mut dyn OutboundQueue,
    &mut dyn EventSink,
    &RefundRequest<'_>,
    &mut NodeAccount,
    u64,
) -> Result<RefundOutcome>;

/// Refund strategies by protocol version
pub fn refund_strategies<S: Store>() -> VersionTable<RefundStrategy<S>> {
    VersionTable::new(vec![
        (ProtocolVersion::new(1, 92, 0), refund_bond_v92::<S> as RefundStrategy<S>),
        (ProtocolVersion::new(1, 105, 0), refund_bond_v105::<S> as RefundStrategy<S>),
    ])
}

/// Refund a provider's bond with the strategy of the active version
///
/// # Errors
///
/// - [`LedgerError::BadVersion`] if no strategy covers the version
/// - [`LedgerError::NotYggdrasil`] if the node's vault key names an Asgard
///   vault
/// - [`LedgerError::Outbound`] if the reward cannot be scheduled this block
pub fn refund_bond<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    request: &RefundRequest<'_>,
    na: &mut NodeAccount,
    height: u64,
) -> Result<RefundOutcome> {
    let strategy = refund_strategies::<S>()
        .resolve(params.version())
        .copied()
        .ok_or_else(|| LedgerError::BadVersion(params.version().to_string()))?;
    strategy(keeper, params, queue, events, request, na, height)
}

// ============================================================================
// Strategies
// ============================================================================

/// Release the requested units of one pool, or everything pledged
pub fn refund_bond_v105<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    request: &RefundRequest<'_>,
    na: &mut NodeAccount,
    height: u64,
) -> Result<RefundOutcome> {
    if na.is_serving() {
        info!(node = %na.node_address, status = %na.status, "node is serving, bond refund skipped");
        return Ok(RefundOutcome::Skipped);
    }
    if request.asset.is_none() && request.units > 0 {
        return Err(LedgerError::Validation("units require a pool".into()));
    }

    let residual = settle_yggdrasil(keeper, params, events, na)?;
    let node_bond = calc_node_liquidity_bond(keeper, params, &na.node_address)?;
    let mut bp = keeper.get_bond_providers(&na.node_address)?;

    let assets: Vec<Asset> = match request.asset {
        Some(asset) => vec![asset.clone()],
        None => params.liquidity_pools().to_vec(),
    };
    let mut released = Vec::new();
    let mut returned = 0u128;
    let mut reward = 0u128;
    if bp.has(request.provider) && node_bond > 0 {
        for mut lp in keeper.liquidity_providers_by_assets(&assets, request.provider)? {
            let bonded = lp.units_bonded_to_node(&na.node_address);
            let units = match request.units {
                0 => bonded,
                requested => requested.min(bonded),
            };
            if units == 0 {
                continue;
            }
            let pool = keeper.get_pool(&lp.asset)?;
            returned = returned.saturating_add(calc_liquidity_in_settlement(&pool, units)?);
            lp.unbond(&na.node_address, units);
            released.push((lp, units));
        }

        if returned > 0 {
            reward = pay_bond_reward(queue, events, request, &bp, na, returned, node_bond)?;
        }

        let positions = keeper.liquidity_providers_by_assets(params.liquidity_pools(), request.provider)?;
        let still_bonded = positions.iter().any(|stored| {
            released
                .iter()
                .find(|(lp, _)| lp.asset == stored.asset)
                .map_or(stored, |(lp, _)| lp)
                .is_bonded_to(&na.node_address)
        });
        if !still_bonded {
            bp.unbond(request.provider);
        }
    }

    finish_refund(keeper, events, request, na, &bp, &released, residual, height)?;
    Ok(RefundOutcome::Refunded {
        slashed: residual.slashed,
        returned,
        reward,
    })
}

/// Release the provider's whole bond
pub fn refund_bond_v92<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    request: &RefundRequest<'_>,
    na: &mut NodeAccount,
    height: u64,
) -> Result<RefundOutcome> {
    if na.is_serving() {
        info!(node = %na.node_address, status = %na.status, "node is serving, bond refund skipped");
        return Ok(RefundOutcome::Skipped);
    }

    let residual = settle_yggdrasil(keeper, params, events, na)?;
    let node_bond = calc_node_liquidity_bond(keeper, params, &na.node_address)?;
    let provider_bond = calc_lp_liquidity_bond(keeper, params, request.provider, &na.node_address)?;
    let mut bp = keeper.get_bond_providers(&na.node_address)?;

    let mut released = Vec::new();
    let mut reward = 0u128;
    if bp.has(request.provider) && node_bond > 0 && provider_bond > 0 {
        for mut lp in keeper.liquidity_providers_by_assets(params.liquidity_pools(), request.provider)? {
            let units = lp.units_bonded_to_node(&na.node_address);
            if units == 0 {
                continue;
            }
            lp.unbond(&na.node_address, units);
            released.push((lp, units));
        }
        reward = pay_bond_reward(queue, events, request, &bp, na, provider_bond, node_bond)?;
        bp.unbond(request.provider);
    }

    finish_refund(keeper, events, request, na, &bp, &released, residual, height)?;
    Ok(RefundOutcome::Refunded {
        slashed: residual.slashed,
        returned: if released.is_empty() { 0 } else { provider_bond },
        reward,
    })
}

// ============================================================================
// Shared Steps
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Residual {
    /// Whether a Yggdrasil vault record existed (and is now drained)
    vault: bool,
    slashed: u128,
}

/// Slash whatever is left in the node's Yggdrasil vault and zero it
fn settle_yggdrasil<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    events: &mut dyn EventSink,
    na: &NodeAccount,
) -> Result<Residual> {
    if na.pub_key.is_empty() || !keeper.vault_exists(&na.pub_key) {
        return Ok(Residual::default());
    }
    let mut vault: Vault = keeper.get_vault(&na.pub_key)?;
    if !vault.is_yggdrasil() {
        return Err(LedgerError::NotYggdrasil(vault.pub_key.to_string()));
    }

    let residual_value = coins_value_in_settlement(keeper, &vault.coins)?;
    let mut slashed = 0u128;
    if residual_value > 0 {
        let node_bond = calc_node_liquidity_bond(keeper, params, &na.node_address)?;
        if node_bond < residual_value {
            error!(
                node = %na.node_address,
                node_bond,
                residual_value,
                "node bond is less than the value left in its yggdrasil vault"
            );
        }
        let target = uncapped_share(params.slash_penalty(), BASIS_POINTS, residual_value).min(node_bond);
        slashed = slash_node_lp(keeper, params, events, &na.node_address, target)?;
        if slashed < target {
            error!(node = %na.node_address, target, slashed, "slashed less than the penalty");
        }
        if let Err(err) =
            subsidize_pools_with_slash_bond(keeper, params, events, &vault.pub_key, &vault.coins, residual_value, slashed)
        {
            error!(node = %na.node_address, %err, "fail to subsidize pools with slashed bond");
        }
    }

    vault.drain();
    keeper.set_vault(&vault)?;
    Ok(Residual { vault: true, slashed })
}

/// Schedule the provider's reward share, minus the operator fee
///
/// Nothing is scheduled unless every payment fits in this block.
fn pay_bond_reward(
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    request: &RefundRequest<'_>,
    bp: &BondProviders,
    na: &mut NodeAccount,
    withdrawn: u128,
    node_bond: u128,
) -> Result<u128> {
    let reward = reward_share(withdrawn, node_bond, na.reward);
    if reward == 0 {
        return Ok(0);
    }

    let mut payments = Vec::with_capacity(2);
    match bp.operator() {
        Some(operator) if operator != request.provider && bp.node_operator_fee > 0 => {
            let fee = safe_share(bp.node_operator_fee, BASIS_POINTS, reward);
            payments.push((request.provider.clone(), reward - fee));
            payments.push((operator.clone(), fee));
        }
        _ => payments.push((request.provider.clone(), reward)),
    }
    let items: Vec<TxOutItem> = payments
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(to, amount)| {
            TxOutItem::new(to, Coin::new(Asset::settlement(), amount), request.tx_id.clone(), "")
                .with_module(ModuleName::Bond)
        })
        .collect();
    if !queue.has_capacity(items.len()) {
        return Err(LedgerError::Outbound("no outbound capacity for the bond reward".into()));
    }
    for item in items {
        if !queue.try_add(item)? {
            return Err(LedgerError::Outbound("bond reward not scheduled".into()));
        }
    }

    na.reward = safe_sub(na.reward, reward);
    emit_or_log(
        events,
        Event::Bond {
            node_address: na.node_address.clone(),
            asset: Asset::settlement(),
            amount: reward,
            kind: BondKind::Returned,
            tx_id: request.tx_id.clone(),
        },
    );
    Ok(reward)
}

#[allow(clippy::too_many_arguments)]
fn finish_refund<S: Store>(
    keeper: &mut Keeper<S>,
    events: &mut dyn EventSink,
    request: &RefundRequest<'_>,
    na: &mut NodeAccount,
    bp: &BondProviders,
    released: &[(LiquidityProvider, u128)],
    residual: Residual,
    height: u64,
) -> Result<()> {
    if na.requested_to_leave {
        na.update_status(NodeStatus::Disabled, height);
    }
    for (lp, _) in released {
        keeper.set_liquidity_provider(lp)?;
    }
    keeper.set_bond_providers(bp)?;
    keeper.set_node_account(na)?;
    if residual.vault {
        keeper.delete_vault(&na.pub_key)?;
        info!(node = %na.node_address, vault = %na.pub_key, "yggdrasil vault deleted");
    }

    for (lp, units) in released {
        emit_or_log(
            events,
            Event::Bond {
                node_address: na.node_address.clone(),
                asset: lp.asset.clone(),
                amount: *units,
                kind: BondKind::Returned,
                tx_id: request.tx_id.clone(),
            },
        );
    }
    if residual.slashed > 0 {
        emit_or_log(
            events,
            Event::Bond {
                node_address: na.node_address.clone(),
                asset: Asset::settlement(),
                amount: residual.slashed,
                kind: BondKind::Cost,
                tx_id: request.tx_id.clone(),
            },
        );
    }
    info!(
        node = %na.node_address,
        provider = %request.provider,
        released = released.len(),
        status = %na.status,
        "bond refunded"
    );
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
