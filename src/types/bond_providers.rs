//! Per-node bond provider roster.
//!
//! The operator's bond address is always the first provider. Other addresses
//! are added by the operator and become `bonded` the first time their
//! liquidity is pledged. The flag is sticky for fee purposes: once a third
//! party has bonded, the operator fee can only go down.

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::types::address::Address;
use crate::types::amount::BASIS_POINTS;

/// One address allowed to back a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProvider {
    pub bond_address: Address,
    pub bonded: bool,
}

impl BondProvider {
    pub fn new(bond_address: Address) -> Self {
        Self {
            bond_address,
            bonded: false,
        }
    }
}

/// Roster of bond providers for one node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BondProviders {
    pub node_address: Address,
    /// Basis points of each non-operator reward paid to the operator
    pub node_operator_fee: u128,
    pub providers: Vec<BondProvider>,
}

impl BondProviders {
    pub fn new(node_address: Address) -> Self {
        Self {
            node_address,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn has(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn get(&self, address: &Address) -> Option<&BondProvider> {
        self.providers.iter().find(|p| &p.bond_address == address)
    }

    fn get_mut(&mut self, address: &Address) -> Option<&mut BondProvider> {
        self.providers.iter_mut().find(|p| &p.bond_address == address)
    }

    /// Operator's bond address (first provider)
    pub fn operator(&self) -> Option<&Address> {
        self.providers.first().map(|p| &p.bond_address)
    }

    pub fn is_operator(&self, address: &Address) -> bool {
        self.operator() == Some(address)
    }

    /// Put the operator first, creating the roster with `default_fee` if empty
    pub fn ensure_operator(&mut self, operator: &Address, default_fee: u128) {
        if self.providers.is_empty() {
            self.providers.push(BondProvider::new(operator.clone()));
            self.node_operator_fee = default_fee.min(BASIS_POINTS);
            return;
        }
        match self.providers.iter().position(|p| &p.bond_address == operator) {
            Some(0) => {}
            Some(idx) => {
                let entry = self.providers.remove(idx);
                self.providers.insert(0, entry);
            }
            None => self.providers.insert(0, BondProvider::new(operator.clone())),
        }
    }

    /// Append `address` as an unbonded provider
    ///
    /// Returns `false` if the address is already on the roster.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CapacityExceeded`] if the roster already holds
    /// `max` providers.
    pub fn add_provider(&mut self, address: Address, max: usize) -> Result<bool> {
        if self.has(&address) {
            return Ok(false);
        }
        if self.providers.len() >= max {
            return Err(LedgerError::CapacityExceeded {
                what: "bond providers",
                max,
            });
        }
        self.providers.push(BondProvider::new(address));
        Ok(true)
    }

    /// Mark `address` as bonded; idempotent
    ///
    /// Returns `false` if the address is not a provider.
    pub fn bond_liquidity(&mut self, address: &Address) -> bool {
        match self.get_mut(address) {
            Some(p) => {
                p.bonded = true;
                true
            }
            None => false,
        }
    }

    /// Mark `address` as not bonded; the roster entry stays
    pub fn unbond(&mut self, address: &Address) {
        if let Some(p) = self.get_mut(address) {
            p.bonded = false;
        }
    }

    /// Drop a non-operator provider that holds no bond
    pub fn remove_provider(&mut self, address: &Address) -> Result<()> {
        if self.is_operator(address) {
            return Err(LedgerError::Unauthorized(
                "node operator cannot be removed from its own roster".into(),
            ));
        }
        match self.get(address) {
            None => Err(LedgerError::Validation(format!("{address} is not a bond provider"))),
            Some(p) if p.bonded => Err(LedgerError::Validation(format!(
                "bond provider {address} still has bond"
            ))),
            Some(_) => {
                self.providers.retain(|p| &p.bond_address != address);
                Ok(())
            }
        }
    }

    /// Whether any provider other than `operator` has bonded
    pub fn has_provider_bonded(&self, operator: &Address) -> bool {
        self.providers
            .iter()
            .any(|p| &p.bond_address != operator && p.bonded)
    }

    /// Change the operator fee
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if `fee` exceeds 10000 bps
    /// - [`LedgerError::FeeIncreaseLocked`] if the fee goes up after a
    ///   non-operator provider bonded
    pub fn set_operator_fee(&mut self, fee: u128, operator: &Address) -> Result<()> {
        if fee > BASIS_POINTS {
            return Err(LedgerError::Validation(format!(
                "operator fee {fee} exceeds {BASIS_POINTS} basis points"
            )));
        }
        if fee > self.node_operator_fee && self.has_provider_bonded(operator) {
            return Err(LedgerError::FeeIncreaseLocked);
        }
        self.node_operator_fee = fee;
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
