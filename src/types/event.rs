//! Structured records of ledger state changes.
//!
//! Events are fire-and-forget: handlers emit through an [`EventSink`] and a
//! failed emission is logged, never propagated. Downstream indexers consume
//! the per-block log.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::Result;
use crate::types::address::{Address, PubKey, TxId};
use crate::types::asset::{Asset, Coin};
use crate::types::pool::PoolStatus;

/// Direction of a bond movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondKind {
    /// Liquidity pledged to a node
    Paid,
    /// Liquidity or reward returned to a provider
    Returned,
    /// Bond burned by slashing
    Cost,
}

/// A ledger event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// One leg of a two-sided add arrived and is waiting for its pair
    PendingLiquidity {
        pool: Asset,
        settlement_address: Address,
        settlement_amount: u128,
        asset_address: Address,
        asset_amount: u128,
        tx_id: TxId,
    },
    AddLiquidity {
        pool: Asset,
        units: u128,
        settlement_address: Address,
        settlement_amount: u128,
        asset_address: Address,
        asset_amount: u128,
        settlement_tx_id: TxId,
        asset_tx_id: TxId,
    },
    WithdrawLiquidity {
        pool: Asset,
        address: Address,
        units: u128,
        basis_points: u128,
        settlement_out: u128,
        asset_out: u128,
        tx_id: TxId,
    },
    /// A pool changed status (or received its first liquidity)
    Pool { pool: Asset, status: PoolStatus },
    NewNode { node_address: Address },
    Bond {
        node_address: Address,
        /// Pool the units came from, or the settlement asset for value amounts
        asset: Asset,
        amount: u128,
        kind: BondKind,
        tx_id: TxId,
    },
    /// Pool balances adjusted after a theft; negative deltas are removals
    Slash { pool: Asset, deltas: Vec<(Asset, i128)> },
    /// Units moved from a node's backers to protocol-owned liquidity
    SlashLiquidity {
        node_address: Address,
        pool: Asset,
        units: u128,
        value: u128,
    },
    /// Stolen value exceeded protocol-owned liquidity and was clamped
    StolenValueCapped {
        vault: PubKey,
        stolen: u128,
        capped: u128,
    },
    /// Reserve too small to subsidize pools for a theft
    SubsidySkipped {
        vault: PubKey,
        reserve: u128,
        required: u128,
    },
    Refund {
        tx_id: TxId,
        reason: String,
        coins: Vec<Coin>,
    },
    /// A retiring vault was emptied and deleted
    VaultRetired { vault: PubKey },
}

impl Event {
    /// Short event type name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PendingLiquidity { .. } => "pending_liquidity",
            Event::AddLiquidity { .. } => "add_liquidity",
            Event::WithdrawLiquidity { .. } => "withdraw",
            Event::Pool { .. } => "pool",
            Event::NewNode { .. } => "new_node",
            Event::Bond { .. } => "bond",
            Event::Slash { .. } => "slash",
            Event::SlashLiquidity { .. } => "slash_liquidity",
            Event::StolenValueCapped { .. } => "stolen_value_capped",
            Event::SubsidySkipped { .. } => "subsidy_skipped",
            Event::Refund { .. } => "refund",
            Event::VaultRetired { .. } => "vault_retired",
        }
    }
}

/// Destination for emitted events
pub trait EventSink {
    fn emit(&mut self, event: Event) -> Result<()>;
}

/// Emit `event`, logging instead of failing
pub fn emit_or_log(sink: &mut dyn EventSink, event: Event) {
    let kind = event.kind();
    if let Err(err) = sink.emit(event) {
        error!(kind, %err, "fail to emit event");
    }
}

/// In-memory event log for one block
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand over the block's events and start a new log
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: Event) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LedgerError;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&mut self, _event: Event) -> Result<()> {
            Err(LedgerError::Invariant("sink closed".into()))
        }
    }

    #[test]
    fn test_event_log_collects() {
        let mut log = EventLog::new();
        emit_or_log(
            &mut log,
            Event::NewNode {
                node_address: Address::from("node"),
            },
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].kind(), "new_node");
        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_failed_emit_does_not_panic() {
        emit_or_log(
            &mut FailingSink,
            Event::VaultRetired {
                vault: PubKey::from("pk"),
            },
        );
    }
}
