//! Ledger operations.
//!
//! Handlers take the state they touch as explicit arguments (a [`Keeper`],
//! the block's [`ProtocolParameters`], the outbound queue and an event
//! sink) and return a typed [`Result`]. Validation errors leave state
//! untouched; the [`BlockProcessor`] turns them into refunds.
//!
//! ## Modules
//!
//! - [`msg`]: parsed inbound messages
//! - [`liquidity`]: add and withdraw liquidity
//! - [`bond`]: bond valuation, bond/unbond/leave
//! - [`refund`]: version-selected bond refunds
//! - [`slashing`]: slash to reserve, pool subsidies, vault theft
//! - [`ragnarok`]: vault retirement and end-block refunds
//! - [`processor`]: per-block orchestration
//!
//! [`Keeper`]: crate::store::Keeper
//! [`ProtocolParameters`]: crate::params::ProtocolParameters
//! [`Result`]: crate::errors::Result

pub mod bond;
pub mod liquidity;
pub mod msg;
pub mod processor;
pub mod ragnarok;
pub mod refund;
pub mod slashing;

#[cfg(test)]
mod testutil;

pub use bond::{
    calc_free_bondable_liquidity, calc_liquidity_in_settlement, calc_lp_liquidity_bond, calc_node_liquidity_bond,
    calc_total_bondable_liquidity, handle_bond, handle_leave, handle_unbond, reward_share, validate_bond,
    validate_unbond,
};
pub use liquidity::{add_liquidity, withdraw_liquidity, AddOutcome, WithdrawOutcome};
pub use msg::{AddLiquidityMsg, BondMsg, LeaveMsg, LedgerMsg, RagnarokObservation, UnbondMsg, WithdrawLiquidityMsg};
pub use processor::BlockProcessor;
pub use ragnarok::{begin_retirement, handle_ragnarok_observation, migrate_retiring_vaults, process_ragnarok_refunds};
pub use refund::{refund_bond, refund_strategies, RefundOutcome, RefundRequest, RefundStrategy};
pub use slashing::{coins_value_in_settlement, slash_node_lp, slash_vault_theft, subsidize_pools_with_slash_bond};
