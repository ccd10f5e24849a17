//! Share arithmetic used by every ledger component.
//!
//! All helpers are total functions: they never panic and never divide by
//! zero. Products are widened to 256 bits before dividing, so the only
//! rounding is the final truncating division, which always favors the pool.

use ethnum::U256;

/// Subtract `b` from `a`, flooring at zero.
///
/// Callers log when `b > a`; a floored result is a soft invariant breach,
/// not a fault.
///
/// ```
/// use liquidity_core::types::math::safe_sub;
///
/// assert_eq!(safe_sub(10, 4), 6);
/// assert_eq!(safe_sub(5, 10), 0);
/// ```
#[inline]
pub fn safe_sub(a: u128, b: u128) -> u128 {
    a.saturating_sub(b)
}

/// `value * part / total`, rounded down, with `part` capped at `total`.
///
/// Returns 0 when `total` is zero. The result never exceeds `value`.
///
/// ```
/// use liquidity_core::types::math::safe_share;
///
/// assert_eq!(safe_share(250, 1000, 100), 25);
/// assert_eq!(safe_share(1000, 1000, 77), 77);
/// assert_eq!(safe_share(1, 0, 77), 0);
/// ```
pub fn safe_share(part: u128, total: u128, value: u128) -> u128 {
    if total == 0 || part == 0 || value == 0 {
        return 0;
    }
    let part = part.min(total);
    mul_div(part, value, total)
}

/// `value * part / total`, rounded down, without capping `part`.
///
/// Used with fixed denominators such as basis points where the ratio may
/// legitimately exceed one (a 15000 bps penalty). Saturates at `u128::MAX`;
/// callers apply any hard ceiling themselves.
///
/// ```
/// use liquidity_core::types::math::uncapped_share;
///
/// assert_eq!(uncapped_share(15_000, 10_000, 100), 150);
/// assert_eq!(uncapped_share(5, 0, 100), 0);
/// ```
pub fn uncapped_share(part: u128, total: u128, value: u128) -> u128 {
    if total == 0 {
        return 0;
    }
    mul_div(part, value, total)
}

/// `a * b / c` in 256-bit precision, saturating at `u128::MAX`.
///
/// `c` must be non-zero; the public share helpers guard it.
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    let wide = U256::from(a) * U256::from(b) / U256::from(c);
    narrow(wide)
}

/// Narrow a 256-bit value to u128, saturating on overflow
pub(crate) fn narrow(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

/// Integer square root (floor) of a 256-bit value
pub(crate) fn isqrt(n: U256) -> U256 {
    if n < U256::from(2u8) {
        return n;
    }
    // Newton iteration from an upper bound converges monotonically downward
    let mut x = n;
    let mut y = (x + U256::ONE) >> 1;
    while y < x {
        x = y;
        y = (x + n / x) >> 1;
    }
    x
}

/// Compare two amounts with a tolerance (for tests and sanity checks)
pub fn approx_eq(a: u128, b: u128, tolerance: u128) -> bool {
    a.abs_diff(b) <= tolerance
}

// ============================================================================
// Unit Tests
// ============================================================================
