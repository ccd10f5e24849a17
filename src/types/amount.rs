//! Fixed-point amount utilities.
//!
//! ## Overview
//!
//! Every balance, unit count and bond value in the ledger is a `u128` count of
//! base units. One whole coin is 10^8 base units, matching the precision used
//! by every external chain the protocol custodies.
//!
//! Conversion to and from decimal strings goes through `rust_decimal` so that
//! parsing never touches floating point. Ledger math itself never uses
//! `Decimal`; see [`crate::types::math`] for the share helpers.
//!
//! ## Examples
//!
//! ```
//! use liquidity_core::types::amount::{ONE, to_base_units, from_base_units};
//!
//! let amount = to_base_units("1.5").unwrap();
//! assert_eq!(amount, 150_000_000);
//! assert_eq!(from_base_units(amount), "1.50000000");
//! assert_eq!(ONE, 100_000_000);
//! ```

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Base units per whole coin: 10^8
pub const ONE: u128 = 100_000_000;

/// Decimal places carried by a base-unit amount
pub const DECIMALS: u32 = 8;

/// Basis-point denominator used by fees and penalties
pub const BASIS_POINTS: u128 = 10_000;

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert a decimal string to base units
///
/// Returns `None` for negative values, unparsable input or overflow.
///
/// # Example
///
/// ```
/// use liquidity_core::types::amount::to_base_units;
///
/// assert_eq!(to_base_units("1"), Some(100_000_000));
/// assert_eq!(to_base_units("0.00000001"), Some(1));
/// assert_eq!(to_base_units("-1"), None);
/// ```
pub fn to_base_units(s: &str) -> Option<u128> {
    let decimal = Decimal::from_str(s).ok()?;
    decimal_to_base_units(decimal)
}

/// Convert a Decimal to base units, rounding to the nearest unit
pub fn decimal_to_base_units(d: Decimal) -> Option<u128> {
    if d.is_sign_negative() {
        return None;
    }

    let scaled = d.checked_mul(Decimal::from(ONE as u64))?;
    scaled.round_dp(0).to_u128()
}

/// Convert base units to a Decimal
///
/// Returns `None` when the amount exceeds the 96-bit Decimal mantissa.
pub fn base_units_to_decimal(value: u128) -> Option<Decimal> {
    let signed = i128::try_from(value).ok()?;
    Decimal::try_from_i128_with_scale(signed, DECIMALS).ok()
}

/// Render base units with 8 decimal places
///
/// Amounts too large for a Decimal fall back to the raw integer.
///
/// # Example
///
/// ```
/// use liquidity_core::types::amount::from_base_units;
///
/// assert_eq!(from_base_units(100_000_000), "1.00000000");
/// assert_eq!(from_base_units(1), "0.00000001");
/// ```
pub fn from_base_units(value: u128) -> String {
    match base_units_to_decimal(value) {
        Some(d) => format!("{:.8}", d),
        None => value.to_string(),
    }
}

/// Render base units with trailing zeros trimmed
pub fn from_base_units_trimmed(value: u128) -> String {
    match base_units_to_decimal(value) {
        Some(d) => format!("{}", d.normalize()),
        None => value.to_string(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
