//! Liquidity provider positions.
//!
//! One record per (asset, owner) pair. A position's units may be partly
//! pledged to validator nodes as bond collateral; pledged units stay in the
//! pool and keep earning, they only stop being freely withdrawable.
//!
//! ## Legacy Bonds
//!
//! Positions written before multi-node bonding carry a single
//! `node_bond_address` that pledged *all* units to one node. Reads honor it
//! as-is; the first bond/unbond on such a position converts it into a
//! `bonded_nodes` entry and clears the legacy field.

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::types::address::{Address, TxId};
use crate::types::asset::Asset;
use crate::types::math::safe_sub;

/// Units of a position pledged to one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpBondedNode {
    pub node_address: Address,
    pub units: u128,
}

/// A liquidity provider's position in one pool
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiquidityProvider {
    pub asset: Asset,
    pub settlement_address: Address,
    pub asset_address: Address,
    pub units: u128,
    pub pending_settlement: u128,
    pub pending_asset: u128,
    pub pending_tx_id: TxId,
    pub settlement_deposit_value: u128,
    pub asset_deposit_value: u128,
    pub last_add_height: u64,
    pub bonded_nodes: Vec<LpBondedNode>,
    /// Superseded by `bonded_nodes`
    pub node_bond_address: Option<Address>,
}

impl LiquidityProvider {
    pub fn new(asset: Asset, settlement_address: Address, asset_address: Address) -> Self {
        Self {
            asset,
            settlement_address,
            asset_address,
            ..Default::default()
        }
    }

    /// Address the record is keyed by: the settlement address, or the asset
    /// address for asset-only positions
    pub fn owner(&self) -> &Address {
        if self.settlement_address.is_empty() {
            &self.asset_address
        } else {
            &self.settlement_address
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_settlement > 0 || self.pending_asset > 0
    }

    // ========================================================================
    // Bond Earmarks
    // ========================================================================

    /// Units pledged to `node`
    pub fn units_bonded_to_node(&self, node: &Address) -> u128 {
        if self.bonded_nodes.is_empty() && self.node_bond_address.as_ref() == Some(node) {
            return self.units;
        }
        self.bonded_nodes
            .iter()
            .find(|b| &b.node_address == node)
            .map(|b| b.units)
            .unwrap_or(0)
    }

    /// Units pledged across all nodes
    pub fn total_bonded_units(&self) -> u128 {
        if self.bonded_nodes.is_empty() && self.node_bond_address.is_some() {
            return self.units;
        }
        self.bonded_nodes
            .iter()
            .fold(0u128, |acc, b| acc.saturating_add(b.units))
    }

    /// Freely withdrawable units
    pub fn remaining_units(&self) -> u128 {
        safe_sub(self.units, self.total_bonded_units())
    }

    pub fn is_bonded_to(&self, node: &Address) -> bool {
        self.units_bonded_to_node(node) > 0
    }

    /// Pledge `units` of this position to `node`
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientLiquidity`] if fewer than `units`
    /// remain unpledged.
    pub fn bond(&mut self, node: &Address, units: u128) -> Result<()> {
        self.migrate_legacy_bond();
        if units == 0 {
            return Ok(());
        }
        if units > self.remaining_units() {
            return Err(LedgerError::InsufficientLiquidity(format!(
                "{} has {} free units in {}, cannot bond {}",
                self.owner(),
                self.remaining_units(),
                self.asset,
                units
            )));
        }
        match self.bonded_nodes.iter_mut().find(|b| &b.node_address == node) {
            Some(entry) => entry.units += units,
            None => self.bonded_nodes.push(LpBondedNode {
                node_address: node.clone(),
                units,
            }),
        }
        Ok(())
    }

    /// Release up to `units` pledged to `node`
    ///
    /// Saturates at the pledged amount and drops the entry when it reaches
    /// zero. Returns the units actually released.
    pub fn unbond(&mut self, node: &Address, units: u128) -> u128 {
        self.migrate_legacy_bond();
        let Some(idx) = self.bonded_nodes.iter().position(|b| &b.node_address == node) else {
            return 0;
        };
        let entry = &mut self.bonded_nodes[idx];
        let released = units.min(entry.units);
        entry.units -= released;
        if entry.units == 0 {
            self.bonded_nodes.remove(idx);
        }
        released
    }

    /// Burn `units` that are pledged to `node` (slashing)
    ///
    /// Both the pledge and the position shrink. Returns the units burned.
    pub fn slash_bonded(&mut self, node: &Address, units: u128) -> u128 {
        let burned = self.unbond(node, units);
        self.units = safe_sub(self.units, burned);
        burned
    }

    /// Convert a legacy whole-position bond into a `bonded_nodes` entry
    pub(crate) fn migrate_legacy_bond(&mut self) {
        if let Some(node) = self.node_bond_address.take() {
            if self.bonded_nodes.is_empty() && self.units > 0 {
                self.bonded_nodes.push(LpBondedNode {
                    node_address: node,
                    units: self.units,
                });
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
