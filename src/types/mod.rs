//! Core data types for the liquidity ledger
//!
//! Records stored in the keyed store derive serde and are encoded with
//! bincode. The block receipt is an SSZ container.
//! All amounts are `u128` base units (scaled by 10^8).
//!
//! ## Types
//!
//! - [`Asset`], [`Coin`]: asset identifiers and amounts
//! - [`Pool`]: per-asset liquidity pool
//! - [`LiquidityProvider`]: per-(asset, address) position
//! - [`BondProviders`]: per-node bond provider roster
//! - [`Vault`]: custody vault
//! - [`NodeAccount`]: validator node
//! - [`TxOutItem`]: scheduled outbound payment
//! - [`Event`]: state-change record
//! - [`BlockReceipt`]: per-block summary

mod address;
mod asset;
mod bond_providers;
mod event;
mod liquidity_provider;
mod node_account;
mod pool;
mod receipt;
mod tx_out;
mod vault;
pub mod amount;
pub mod math;

pub use address::{Address, PubKey, TxId};
pub use asset::{Asset, Coin, SETTLEMENT_CHAIN, SETTLEMENT_SYMBOL};
pub use bond_providers::{BondProvider, BondProviders};
pub use event::{emit_or_log, BondKind, Event, EventLog, EventSink};
pub use liquidity_provider::{LiquidityProvider, LpBondedNode};
pub use node_account::{NodeAccount, NodeStatus};
pub use pool::{calculate_pool_units, calculate_vault_units, Pool, PoolStatus};
pub use receipt::BlockReceipt;
pub use tx_out::{ragnarok_memo, refund_memo, ModuleName, TxOutItem};
pub use vault::{Vault, VaultStatus, VaultType};
