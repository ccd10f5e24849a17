//! # Liquidity Core
//!
//! Deterministic ledger for a cross-chain liquidity protocol.
//!
//! ## Architecture
//!
//! The core consists of:
//! - **Types**: Pools, liquidity positions, bond rosters, vaults, nodes, events
//! - **Store**: Byte-keyed persistence and the typed `Keeper` on top of it
//! - **Params**: Version-pinned constants with governance overrides
//! - **Outbound**: Slab-backed queue of scheduled payments
//! - **Ledger**: Liquidity, bonding, slashing and vault retirement handlers,
//!   plus the per-block processor
//!
//! ## Design Principles
//!
//! 1. **Determinism**: Identical messages produce identical state roots
//! 2. **Integer Math**: All amounts are `u128` base units (10^8 scaling);
//!    share math widens to 256 bits and never uses floating point
//! 3. **Whole-Record Writes**: Every entity is read, modified and written
//!    back whole within one handler call
//! 4. **Single-Pass Blocks**: A failed message is refunded or logged and
//!    the block moves on

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: Pool, LiquidityProvider, BondProviders, Vault, BlockReceipt
pub mod types;

/// Keyed persistence and typed record access
pub mod store;

/// Protocol parameters: constants, governance overrides, version tables
pub mod params;

/// Outbound payment queue
pub mod outbound;

/// Ledger handlers and the block processor
pub mod ledger;

/// Crate error type
pub mod errors;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use errors::{LedgerError, Result};
pub use ledger::{BlockProcessor, LedgerMsg};
pub use outbound::{OutboundQueue, SlabOutboundQueue};
pub use params::{Mimir, ProtocolParameters, ProtocolVersion};
pub use store::{Keeper, MemoryStore, Store};
pub use types::{Asset, BlockReceipt, Coin, Event, LiquidityProvider, Pool};
