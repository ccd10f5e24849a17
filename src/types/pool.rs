//! Per-asset liquidity pool.
//!
//! ## Overview
//!
//! A pool pairs an external asset against the settlement asset. Ownership is
//! tracked in units: `lp_units` belong to liquidity providers, `synth_units`
//! are the claims backing the synthetic supply. Total claims are the sum.
//!
//! ## Unit Issuance
//!
//! For a two-sided pool with total units `P`, balances `R` (settlement) and
//! `A` (asset), a deposit of `r` and `a` issues
//!
//! ```text
//! units = P (rA + Ra) / (2RA) * (1 - |Ra - rA| / ((r + R)(a + A)))
//! ```
//!
//! The second factor is the slip adjustment: a deposit in the current price
//! ratio pays nothing, an asymmetric one is discounted. An empty pool issues
//! `isqrt(r * a)` (or the single non-zero side).
//!
//! Vault pools only hold the asset side, so units are `P * a / A` with the
//! deposit itself as seed.
//!
//! ## Example
//!
//! ```
//! use liquidity_core::types::Pool;
//!
//! let mut pool = Pool::new("BTC.BTC".parse().unwrap());
//! let (total, issued) = pool.add_liquidity(1_000, 1_000).unwrap();
//! assert_eq!((total, issued), (1_000, 1_000));
//!
//! // Symmetric deposit: 10% of the reserves buys 10% of the units
//! let (_, issued) = pool.add_liquidity(100, 100).unwrap();
//! assert_eq!(issued, 100);
//! ```

use std::fmt;

use ethnum::U256;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::{LedgerError, Result};
use crate::types::asset::Asset;
use crate::types::math::{isqrt, narrow, safe_share, safe_sub, uncapped_share};

/// Pool lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolStatus {
    /// Open for swaps and liquidity
    Available,
    /// Accepting liquidity, not yet trading
    #[default]
    Staged,
    /// Frozen by governance or an incident
    Suspended,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolStatus::Available => "Available",
            PoolStatus::Staged => "Staged",
            PoolStatus::Suspended => "Suspended",
        };
        f.write_str(s)
    }
}

/// Liquidity pool record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pool {
    pub asset: Asset,
    pub balance_settlement: u128,
    pub balance_asset: u128,
    pub lp_units: u128,
    pub synth_units: u128,
    pub pending_inbound_settlement: u128,
    pub pending_inbound_asset: u128,
    pub status: PoolStatus,
}

impl Pool {
    /// Create an empty pool for `asset`
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            ..Default::default()
        }
    }

    /// Total claims on the pool: LP units plus synthetic units
    #[inline]
    pub fn pool_units(&self) -> u128 {
        self.lp_units.saturating_add(self.synth_units)
    }

    /// A pool that has never been funded (or was fully drained)
    pub fn is_empty(&self) -> bool {
        self.balance_settlement == 0 && self.balance_asset == 0 && self.pool_units() == 0
    }

    pub fn is_available(&self) -> bool {
        self.status == PoolStatus::Available
    }

    // ========================================================================
    // Valuation
    // ========================================================================

    /// Value an asset amount in settlement units at the pool price
    pub fn asset_value_in_settlement(&self, amount: u128) -> u128 {
        if self.balance_asset == 0 {
            return 0;
        }
        uncapped_share(amount, self.balance_asset, self.balance_settlement)
    }

    /// Value a settlement amount in asset units at the pool price
    pub fn settlement_value_in_asset(&self, amount: u128) -> u128 {
        if self.balance_settlement == 0 {
            return 0;
        }
        uncapped_share(amount, self.balance_settlement, self.balance_asset)
    }

    /// Settlement-side value of `units`
    pub fn units_value_in_settlement(&self, units: u128) -> u128 {
        safe_share(units, self.pool_units(), self.balance_settlement)
    }

    /// Recompute synthetic units from the outstanding synthetic supply
    ///
    /// `synth_units = lp_units * S / (2A - S)`, zero when `2A <= S`.
    /// Returns the new total pool units.
    pub fn calc_units(&mut self, synth_supply: u128) -> u128 {
        let double_asset = U256::from(self.balance_asset) * U256::from(2u8);
        let supply = U256::from(synth_supply);
        self.synth_units = if synth_supply == 0 || double_asset <= supply {
            0
        } else {
            narrow(U256::from(self.lp_units) * supply / (double_asset - supply))
        };
        self.pool_units()
    }

    // ========================================================================
    // Liquidity
    // ========================================================================

    /// Deposit `settlement_in` and `asset_in`, issuing LP units
    ///
    /// Returns `(new_total_units, issued_units)`. On error the pool is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroBacking`] if the pool would end up with claims
    ///   against an empty required side
    /// - [`LedgerError::Overflow`] if a balance or unit counter would overflow
    pub fn add_liquidity(&mut self, settlement_in: u128, asset_in: u128) -> Result<(u128, u128)> {
        let old_units = self.pool_units();

        let (new_total, issued) = if self.asset.is_vault_asset() {
            calculate_vault_units(old_units, self.balance_asset, asset_in)
        } else {
            calculate_pool_units(
                old_units,
                self.balance_settlement,
                self.balance_asset,
                settlement_in,
                asset_in,
            )?
        };

        let settlement_in = if self.asset.is_vault_asset() { 0 } else { settlement_in };
        let balance_settlement = self
            .balance_settlement
            .checked_add(settlement_in)
            .ok_or(LedgerError::Overflow("pool settlement balance"))?;
        let balance_asset = self
            .balance_asset
            .checked_add(asset_in)
            .ok_or(LedgerError::Overflow("pool asset balance"))?;
        let lp_units = self
            .lp_units
            .checked_add(issued)
            .ok_or(LedgerError::Overflow("pool units"))?;

        let missing_side = (balance_settlement == 0 && !self.asset.is_vault_asset()) || balance_asset == 0;
        if missing_side && lp_units.saturating_add(self.synth_units) > 0 {
            return Err(LedgerError::ZeroBacking(self.asset.to_string()));
        }

        self.balance_settlement = balance_settlement;
        self.balance_asset = balance_asset;
        self.lp_units = lp_units;
        Ok((new_total, issued))
    }

    /// Redeem `units` for their share of both balances
    ///
    /// The share is taken against total pool units, so synthetic claims keep
    /// their backing. Rounding truncates in favor of the pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientLiquidity`] if `units` exceeds the
    /// pool's LP units.
    pub fn withdraw(&mut self, units: u128) -> Result<(u128, u128)> {
        if units > self.lp_units {
            return Err(LedgerError::InsufficientLiquidity(format!(
                "withdraw {} units from pool {} holding {}",
                units, self.asset, self.lp_units
            )));
        }
        let total = self.pool_units();
        let settlement_out = safe_share(units, total, self.balance_settlement);
        let asset_out = safe_share(units, total, self.balance_asset);

        self.balance_settlement = self.balance_settlement - settlement_out;
        self.balance_asset = self.balance_asset - asset_out;
        self.lp_units -= units;
        Ok((settlement_out, asset_out))
    }

    /// Redeem `units` entirely in the settlement asset
    ///
    /// The asset share stays in the pool and is bought back at the
    /// post-withdraw price. Returns the settlement amount paid out.
    ///
    /// # Errors
    ///
    /// Same as [`Pool::withdraw`].
    pub fn withdraw_to_settlement(&mut self, units: u128) -> Result<u128> {
        let (settlement_out, asset_out) = self.withdraw(units)?;
        self.balance_asset = self.balance_asset.saturating_add(asset_out);
        let swapped = self.asset_value_in_settlement(asset_out).min(self.balance_settlement);
        self.balance_settlement -= swapped;
        Ok(settlement_out.saturating_add(swapped))
    }

    /// Subtract from the settlement balance, flooring at zero
    pub fn sub_settlement(&mut self, amount: u128) {
        if amount > self.balance_settlement {
            error!(
                pool = %self.asset,
                balance = self.balance_settlement,
                amount,
                "settlement balance would go negative"
            );
        }
        self.balance_settlement = safe_sub(self.balance_settlement, amount);
    }

    /// Subtract from the asset balance, flooring at zero
    pub fn sub_asset(&mut self, amount: u128) {
        if amount > self.balance_asset {
            error!(
                pool = %self.asset,
                balance = self.balance_asset,
                amount,
                "asset balance would go negative"
            );
        }
        self.balance_asset = safe_sub(self.balance_asset, amount);
    }
}

// ============================================================================
// Unit Formulas
// ============================================================================

/// Units issued by a two-sided deposit
///
/// Returns `(new_total_units, issued_units)`.
///
/// # Errors
///
/// Returns [`LedgerError::ZeroBacking`] if either side of the post-deposit
/// pool would be zero.
pub fn calculate_pool_units(
    old_units: u128,
    balance_settlement: u128,
    balance_asset: u128,
    settlement_in: u128,
    asset_in: u128,
) -> Result<(u128, u128)> {
    if balance_settlement.checked_add(settlement_in).unwrap_or(u128::MAX) == 0 {
        return Err(LedgerError::ZeroBacking("total settlement in the pool is zero".into()));
    }
    if balance_asset.checked_add(asset_in).unwrap_or(u128::MAX) == 0 {
        return Err(LedgerError::ZeroBacking("total asset in the pool is zero".into()));
    }

    let r = U256::from(settlement_in);
    let a = U256::from(asset_in);

    if old_units == 0 || balance_settlement == 0 || balance_asset == 0 {
        let seed = match (settlement_in, asset_in) {
            (0, side) | (side, 0) => side,
            _ => narrow(isqrt(r * a)),
        };
        return Ok((old_units.saturating_add(seed), seed));
    }

    let p = U256::from(old_units);
    let big_r = U256::from(balance_settlement);
    let big_a = U256::from(balance_asset);

    let r_a = r * big_a;
    let big_r_a = big_r * a;

    // P (rA + Ra) / 2RA
    let weighted = p * (r_a + big_r_a) / (U256::from(2u8) * big_r * big_a);

    // 1 - |Ra - rA| / ((r + R)(a + A))
    let slip_num = if big_r_a > r_a { big_r_a - r_a } else { r_a - big_r_a };
    let slip_den = (r + big_r) * (a + big_a);
    let issued = narrow(weighted * (slip_den - slip_num) / slip_den);

    let new_total = old_units
        .checked_add(issued)
        .ok_or(LedgerError::Overflow("pool units"))?;
    Ok((new_total, issued))
}

/// Units issued by an asset-only deposit into a vault pool
///
/// Returns `(new_total_units, issued_units)`.
pub fn calculate_vault_units(old_units: u128, balance_asset: u128, asset_in: u128) -> (u128, u128) {
    if old_units == 0 || balance_asset == 0 {
        return (old_units.saturating_add(asset_in), asset_in);
    }
    if asset_in == 0 {
        return (old_units, 0);
    }
    let issued = uncapped_share(asset_in, balance_asset, old_units);
    (old_units.saturating_add(issued), issued)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::amount::ONE;
    use crate::types::math::approx_eq;

    fn btc_pool() -> Pool {
        Pool::new("BTC.BTC".parse().unwrap())
    }

    #[test]
    fn test_seed_units() {
        assert_eq!(calculate_pool_units(0, 0, 0, 100, 100).unwrap(), (100, 100));
        assert_eq!(calculate_pool_units(0, 0, 0, 100, 50).unwrap(), (70, 70));
        assert_eq!(calculate_pool_units(0, 0, 0, 100, 0).unwrap(), (100, 100));
    }

    #[test]
    fn test_withdraw_to_settlement_keeps_asset_side() {
        let mut pool = btc_pool();
        pool.balance_settlement = 1_000;
        pool.balance_asset = 100;
        pool.lp_units = 100;

        // 100 settlement plus 10 asset bought back at 900/100
        assert_eq!(pool.withdraw_to_settlement(10).unwrap(), 190);
        assert_eq!((pool.balance_settlement, pool.balance_asset, pool.lp_units), (810, 100, 90));
        assert!(pool.withdraw_to_settlement(91).is_err());
        assert_eq!(pool.lp_units, 90);
    }

    #[test]
    fn test_zero_backing_rejected() {
        assert!(matches!(
            calculate_pool_units(0, 0, 0, 0, 100),
            Err(LedgerError::ZeroBacking(_))
        ));
        let mut pool = btc_pool();
        assert!(matches!(pool.add_liquidity(100, 0), Err(LedgerError::ZeroBacking(_))));
        assert_eq!(pool, btc_pool());
    }

    #[test]
    fn test_symmetric_deposit_is_proportional() {
        let mut pool = btc_pool();
        pool.add_liquidity(1_000 * ONE, 10 * ONE).unwrap();
        let before = pool.pool_units();

        let (total, issued) = pool.add_liquidity(100 * ONE, ONE).unwrap();
        assert_eq!(issued, before / 10);
        assert_eq!(total, before + issued);
    }

    #[test]
    fn test_asymmetric_deposit_pays_slip() {
        let mut pool = btc_pool();
        pool.add_liquidity(1_000 * ONE, 1_000 * ONE).unwrap();
        let (_, symmetric) = calculate_pool_units(1_000 * ONE, 1_000 * ONE, 1_000 * ONE, 100 * ONE, 100 * ONE).unwrap();
        let (_, one_sided) = pool.add_liquidity(200 * ONE, 0).unwrap();
        assert!(one_sided < symmetric);
        assert!(one_sided > 0);
    }

    #[test]
    fn test_issued_share_matches_contribution() {
        let mut pool = btc_pool();
        pool.add_liquidity(5_000 * ONE, 50 * ONE).unwrap();
        let (_, issued) = pool.add_liquidity(500 * ONE, 5 * ONE).unwrap();
        let value = safe_share(issued, pool.pool_units(), pool.balance_settlement);
        assert!(approx_eq(value, 500 * ONE, 2));
    }

    #[test]
    fn test_vault_units() {
        assert_eq!(calculate_vault_units(0, 0, 500), (500, 500));
        assert_eq!(calculate_vault_units(1_000, 2_000, 0), (1_000, 0));
        assert_eq!(calculate_vault_units(1_000, 2_000, 1_000), (1_500, 500));

        let mut pool = Pool::new("BTC/BTC".parse().unwrap());
        let (_, issued) = pool.add_liquidity(999, 400).unwrap();
        assert_eq!(issued, 400);
        assert_eq!(pool.balance_settlement, 0);
    }

    #[test]
    fn test_withdraw_returns_share() {
        let mut pool = btc_pool();
        pool.add_liquidity(1_000, 1_000).unwrap();
        let (s, a) = pool.withdraw(250).unwrap();
        assert_eq!((s, a), (250, 250));
        assert_eq!(pool.lp_units, 750);
        assert_eq!(pool.balance_settlement, 750);
        assert_eq!(pool.balance_asset, 750);
    }

    #[test]
    fn test_withdraw_rounds_for_pool() {
        let mut pool = btc_pool();
        pool.add_liquidity(10, 10).unwrap();
        pool.balance_settlement = 11;
        let (s, _) = pool.withdraw(3).unwrap();
        assert_eq!(s, 3);
        assert_eq!(pool.balance_settlement, 8);
    }

    #[test]
    fn test_withdraw_too_many_units() {
        let mut pool = btc_pool();
        pool.add_liquidity(100, 100).unwrap();
        assert!(matches!(pool.withdraw(101), Err(LedgerError::InsufficientLiquidity(_))));
    }

    #[test]
    fn test_calc_units_with_synth_supply() {
        let mut pool = btc_pool();
        pool.add_liquidity(1_000, 1_000).unwrap();
        assert_eq!(pool.calc_units(0), 1_000);
        // S = 500, 2A - S = 1500 -> synth = 1000 * 500 / 1500
        assert_eq!(pool.calc_units(500), 1_333);
        assert_eq!(pool.calc_units(2_000), 1_000);
    }

    #[test]
    fn test_valuation() {
        let mut pool = btc_pool();
        pool.add_liquidity(2_000, 1_000).unwrap();
        assert_eq!(pool.asset_value_in_settlement(10), 20);
        assert_eq!(pool.settlement_value_in_asset(10), 5);
        assert_eq!(btc_pool().asset_value_in_settlement(10), 0);
    }

    #[test]
    fn test_safe_sub_balances() {
        let mut pool = btc_pool();
        pool.balance_asset = 5;
        pool.sub_asset(10);
        assert_eq!(pool.balance_asset, 0);
    }
}
