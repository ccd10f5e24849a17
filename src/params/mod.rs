//! Protocol parameters resolved once per block.
//!
//! ## Resolution
//!
//! 1. The active [`ProtocolVersion`] selects a [`ConstantTable`] and the list
//!    of bondable ("liquidity") pools.
//! 2. A governance override ([`Mimir`]) with a non-negative value wins over
//!    the table; negative values mean "unset".
//!
//! Handlers receive a `&ProtocolParameters` and call named getters; none of
//! them compares versions directly.
//!
//! ## Example
//!
//! ```
//! use liquidity_core::params::{ConstantName, Mimir, ProtocolParameters, ProtocolVersion};
//!
//! let mut mimir = Mimir::default();
//! mimir.set(ConstantName::MaxBondProviders, 8);
//! mimir.set(ConstantName::SlashPenalty, -1);
//!
//! let params = ProtocolParameters::resolve(ProtocolVersion::new(1, 105, 0), &mimir).unwrap();
//! assert_eq!(params.max_bond_providers(), 8);
//! assert_eq!(params.slash_penalty(), 15_000);
//! ```

use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::{LedgerError, Result};
use crate::types::Asset;

mod constants;
mod pools;
mod version;

pub use constants::{constant_tables, constants_v010, constants_v102, ConstantName, ConstantTable};
pub use pools::{liquidity_pool_tables, liquidity_pools_v104, liquidity_pools_v105};
pub use version::{ProtocolVersion, VersionTable};

/// Governance overrides keyed by constant name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mimir {
    values: BTreeMap<String, i64>,
}

fn pol_key(asset: &Asset) -> String {
    format!("POL-{asset}").to_uppercase()
}

impl Mimir {
    pub fn set(&mut self, name: ConstantName, value: i64) {
        self.values.insert(name.as_str().to_string(), value);
    }

    pub fn remove(&mut self, name: ConstantName) {
        self.values.remove(name.as_str());
    }

    /// Override for `name`, if set to a non-negative value
    pub fn get(&self, name: ConstantName) -> Option<i64> {
        self.values.get(name.as_str()).copied().filter(|v| *v >= 0)
    }

    /// Toggle protocol-owned liquidity management for one pool.
    ///
    /// `1` is on, `0` is paused, negative is unset.
    pub fn set_pol(&mut self, asset: &Asset, value: i64) {
        self.values.insert(pol_key(asset), value);
    }

    pub fn pol(&self, asset: &Asset) -> Option<i64> {
        self.values.get(&pol_key(asset)).copied().filter(|v| *v >= 0)
    }
}

/// Parameters in force for one block
#[derive(Debug, Clone)]
pub struct ProtocolParameters {
    version: ProtocolVersion,
    constants: ConstantTable,
    mimir: Mimir,
    liquidity_pools: Vec<Asset>,
}

impl ProtocolParameters {
    /// Resolve the parameters for `version` under `mimir`
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::BadVersion`] if `version` predates every
    /// registered table.
    pub fn resolve(version: ProtocolVersion, mimir: &Mimir) -> Result<Self> {
        let constants = constant_tables()
            .resolve(version)
            .cloned()
            .ok_or_else(|| LedgerError::BadVersion(version.to_string()))?;
        let liquidity_pools = liquidity_pool_tables()
            .resolve(version)
            .cloned()
            .ok_or_else(|| LedgerError::BadVersion(version.to_string()))?;
        debug!(%version, pools = liquidity_pools.len(), "resolved protocol parameters");
        Ok(Self {
            version,
            constants,
            mimir: mimir.clone(),
            liquidity_pools,
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Override-then-fallback integer lookup
    pub fn get_int(&self, name: ConstantName) -> i64 {
        self.mimir.get(name).unwrap_or_else(|| self.constants.get(name))
    }

    fn get_u128(&self, name: ConstantName) -> u128 {
        u128::try_from(self.get_int(name)).unwrap_or(0)
    }

    fn get_u64(&self, name: ConstantName) -> u64 {
        u64::try_from(self.get_int(name)).unwrap_or(0)
    }

    pub fn slash_penalty(&self) -> u128 {
        self.get_u128(ConstantName::SlashPenalty)
    }

    pub fn subsidize_reserve_multiplier(&self) -> u128 {
        self.get_u128(ConstantName::SubsidizeReserveMultiplier)
    }

    pub fn max_bond_providers(&self) -> usize {
        usize::try_from(self.get_int(ConstantName::MaxBondProviders)).unwrap_or(0)
    }

    pub fn node_operator_fee(&self) -> u128 {
        self.get_u128(ConstantName::NodeOperatorFee)
    }

    pub fn bond_paused(&self) -> bool {
        self.get_int(ConstantName::PauseBond) > 0
    }

    pub fn unbond_paused(&self) -> bool {
        self.get_int(ConstantName::PauseUnbond) > 0
    }

    /// Per-node bond ceiling, if enabled
    pub fn maximum_bond(&self) -> Option<u128> {
        Some(self.get_u128(ConstantName::MaximumBondInCacao)).filter(|max| *max > 0)
    }

    pub fn fund_migration_interval(&self) -> u64 {
        self.get_u64(ConstantName::FundMigrationInterval)
    }

    pub fn max_ragnarok_attempts(&self) -> u64 {
        self.get_u64(ConstantName::MaxRagnarokAttempts)
    }

    pub fn max_outbound_items_per_block(&self) -> usize {
        usize::try_from(self.get_int(ConstantName::MaxOutboundItemsPerBlock)).unwrap_or(0)
    }

    /// Pools whose liquidity may back node bonds
    pub fn liquidity_pools(&self) -> &[Asset] {
        &self.liquidity_pools
    }

    pub fn is_liquidity_pool(&self, asset: &Asset) -> bool {
        self.liquidity_pools.contains(asset)
    }

    /// Whether the reserve's position in `asset` may be drawn down
    pub fn pol_enabled(&self, asset: &Asset) -> bool {
        self.mimir.pol(asset) == Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mimir: &Mimir) -> ProtocolParameters {
        ProtocolParameters::resolve(ProtocolVersion::new(1, 105, 0), mimir).unwrap()
    }

    #[test]
    fn test_override_wins_when_non_negative() {
        let mut mimir = Mimir::default();
        mimir.set(ConstantName::PauseBond, 1);
        mimir.set(ConstantName::NodeOperatorFee, 0);
        let p = params(&mimir);
        assert!(p.bond_paused());
        assert_eq!(p.node_operator_fee(), 0);
        assert!(!p.unbond_paused());
    }

    #[test]
    fn test_negative_override_falls_back() {
        let mut mimir = Mimir::default();
        mimir.set(ConstantName::FundMigrationInterval, -1);
        assert_eq!(params(&mimir).fund_migration_interval(), 360);
        mimir.remove(ConstantName::FundMigrationInterval);
        assert_eq!(mimir.get(ConstantName::FundMigrationInterval), None);
    }

    #[test]
    fn test_maximum_bond_disabled_at_zero() {
        let mut mimir = Mimir::default();
        assert_eq!(params(&mimir).maximum_bond(), None);
        mimir.set(ConstantName::MaximumBondInCacao, 1_000);
        assert_eq!(params(&mimir).maximum_bond(), Some(1_000));
    }

    #[test]
    fn test_pol_toggle_per_pool() {
        let btc: Asset = "BTC.BTC".parse().unwrap();
        let eth: Asset = "ETH.ETH".parse().unwrap();
        let mut mimir = Mimir::default();
        assert!(!params(&mimir).pol_enabled(&btc));

        mimir.set_pol(&btc, 1);
        mimir.set_pol(&eth, 0);
        let p = params(&mimir);
        assert!(p.pol_enabled(&btc));
        assert!(!p.pol_enabled(&eth));

        mimir.set_pol(&btc, -1);
        assert!(!params(&mimir).pol_enabled(&btc));
        assert_eq!(mimir.pol(&btc), None);
    }

    #[test]
    fn test_bad_version() {
        let err = ProtocolParameters::resolve(ProtocolVersion::new(0, 0, 1), &Mimir::default()).unwrap_err();
        assert!(matches!(err, LedgerError::BadVersion(_)));
    }

    #[test]
    fn test_liquidity_pools_by_version() {
        let btc: Asset = "BTC.BTC".parse().unwrap();
        let arb: Asset = "ARB.ETH".parse().unwrap();
        let old = ProtocolParameters::resolve(ProtocolVersion::new(1, 104, 0), &Mimir::default()).unwrap();
        let new = params(&Mimir::default());
        assert!(old.is_liquidity_pool(&btc));
        assert!(!old.is_liquidity_pool(&arb));
        assert!(new.is_liquidity_pool(&arb));
    }
}
