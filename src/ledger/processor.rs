//! Per-block message processing.
//!
//! ## Block Flow
//!
//! 1. Resolve [`ProtocolParameters`] for the block and reset the outbound
//!    queue's per-block counter.
//! 2. Apply each message in order. A validation failure queues a refund of
//!    the message's inbound funds and emits a refund event; any other failure
//!    is logged. Either way processing moves on to the next message.
//! 3. Run the end-block hooks: migration batches out of retiring vaults, then
//!    bond refunds of nodes whose Yggdrasil vault has drained.
//! 4. Return a [`BlockReceipt`] carrying the state root.
//!
//! ## Example
//!
//! ```
//! use liquidity_core::ledger::BlockProcessor;
//! use liquidity_core::params::ProtocolVersion;
//! use liquidity_core::store::{Keeper, MemoryStore};
//!
//! let mut processor = BlockProcessor::new(Keeper::new(MemoryStore::new()), ProtocolVersion::new(1, 105, 0));
//! let receipt = processor.process_block(1, &[]).unwrap();
//! assert!(receipt.is_empty());
//! assert_eq!(receipt.state_root, processor.keeper().state_root());
//! ```

use tracing::{debug, error, info, warn};

use crate::errors::{LedgerError, Result};
use crate::ledger::bond::{handle_bond, handle_leave, handle_unbond, validate_bond, validate_unbond};
use crate::ledger::liquidity::{add_liquidity, withdraw_liquidity};
use crate::ledger::msg::LedgerMsg;
use crate::ledger::ragnarok::{
    begin_retirement, handle_ragnarok_observation, migrate_retiring_vaults, process_ragnarok_refunds,
};
use crate::outbound::{OutboundQueue, SlabOutboundQueue};
use crate::params::{Mimir, ProtocolParameters, ProtocolVersion};
use crate::store::{Keeper, MemoryStore, Store};
use crate::types::{emit_or_log, refund_memo, BlockReceipt, Event, EventLog, TxOutItem};

/// Applies ordered ledger messages block by block
#[derive(Debug)]
pub struct BlockProcessor<S: Store = MemoryStore> {
    keeper: Keeper<S>,
    queue: SlabOutboundQueue,
    events: EventLog,
    version: ProtocolVersion,
    mimir: Mimir,
}

impl<S: Store> BlockProcessor<S> {
    pub fn new(keeper: Keeper<S>, version: ProtocolVersion) -> Self {
        Self {
            keeper,
            queue: SlabOutboundQueue::default(),
            events: EventLog::new(),
            version,
            mimir: Mimir::default(),
        }
    }

    pub fn keeper(&self) -> &Keeper<S> {
        &self.keeper
    }

    pub fn keeper_mut(&mut self) -> &mut Keeper<S> {
        &mut self.keeper
    }

    pub fn queue(&self) -> &SlabOutboundQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SlabOutboundQueue {
        &mut self.queue
    }

    /// Governance overrides applied from the next block on
    pub fn mimir_mut(&mut self) -> &mut Mimir {
        &mut self.mimir
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Events emitted by the last processed block
    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    /// Apply `msgs` in order at `height`
    ///
    /// # Errors
    ///
    /// Only fails if no parameters exist for the configured version. Message
    /// and end-block failures are logged and counted, never returned.
    pub fn process_block(&mut self, height: u64, msgs: &[LedgerMsg]) -> Result<BlockReceipt> {
        let params = ProtocolParameters::resolve(self.version, &self.mimir)?;
        self.queue.set_per_block_limit(params.max_outbound_items_per_block());
        self.queue.begin_block(height);
        self.events.drain();

        let mut failed = 0u64;
        for msg in msgs {
            match self.apply(&params, msg, height) {
                Ok(()) => debug!(height, msg = msg.name(), tx_id = %msg.tx_id(), "message applied"),
                Err(err) if err.is_validation() => {
                    failed += 1;
                    self.refund(msg, &err);
                }
                Err(err) => {
                    failed += 1;
                    error!(height, msg = msg.name(), tx_id = %msg.tx_id(), %err, "fail to apply message");
                }
            }
        }
        self.end_block(&params, height);

        let receipt = BlockReceipt::new(
            height,
            msgs.len() as u64,
            failed,
            self.events.len() as u64,
            self.queue.added_this_block() as u64,
            self.keeper.state_root(),
        );
        info!(
            height,
            processed = receipt.messages_processed,
            failed,
            events = receipt.events_emitted,
            outbound = receipt.outbound_queued,
            state_root = %receipt.state_root_hex(),
            "block processed"
        );
        Ok(receipt)
    }

    fn apply(&mut self, params: &ProtocolParameters, msg: &LedgerMsg, height: u64) -> Result<()> {
        let Self {
            keeper, queue, events, ..
        } = self;
        match msg {
            LedgerMsg::AddLiquidity(m) => add_liquidity(keeper, params, events, m, height).map(|_| ()),
            LedgerMsg::WithdrawLiquidity(m) => withdraw_liquidity(keeper, queue, events, m).map(|_| ()),
            LedgerMsg::Bond(m) => {
                validate_bond(keeper, params, m)?;
                handle_bond(keeper, params, events, m, height)
            }
            LedgerMsg::Unbond(m) => {
                validate_unbond(keeper, params, m)?;
                handle_unbond(keeper, params, queue, events, m, height).map(|_| ())
            }
            LedgerMsg::Leave(m) => handle_leave(keeper, m),
            LedgerMsg::Ragnarok(obs) => handle_ragnarok_observation(keeper, params, queue, events, obs),
            LedgerMsg::Churn(vault) => begin_retirement(keeper, vault, height),
        }
    }

    /// Send a rejected message's inbound funds back
    ///
    /// A refund event is only emitted when at least one coin was scheduled.
    fn refund(&mut self, msg: &LedgerMsg, reason: &LedgerError) {
        let tx_id = msg.tx_id();
        let mut coins = Vec::new();
        for (to, coin) in msg.refundable() {
            let item = TxOutItem::new(to, coin.clone(), tx_id.clone(), refund_memo(&tx_id));
            match self.queue.unsafe_add(item) {
                Ok(()) => coins.push(coin),
                Err(err) => error!(%tx_id, %coin, %err, "fail to schedule refund"),
            }
        }
        if coins.is_empty() {
            warn!(msg = msg.name(), %tx_id, %reason, "message rejected, nothing to refund");
            return;
        }
        warn!(msg = msg.name(), %tx_id, %reason, refunded = coins.len(), "message rejected");
        emit_or_log(
            &mut self.events,
            Event::Refund {
                tx_id,
                reason: reason.to_string(),
                coins,
            },
        );
    }

    fn end_block(&mut self, params: &ProtocolParameters, height: u64) {
        match migrate_retiring_vaults(&mut self.keeper, params, &mut self.queue, &mut self.events, height) {
            Ok(0) => {}
            Ok(scheduled) => info!(height, scheduled, "ragnarok migrations scheduled"),
            Err(err) => error!(height, %err, "fail to migrate retiring vaults"),
        }
        match process_ragnarok_refunds(&mut self.keeper, params, &mut self.queue, &mut self.events, height) {
            Ok(0) => {}
            Ok(nodes) => info!(height, nodes, "ragnarok bond refunds complete"),
            Err(err) => error!(height, %err, "fail to process ragnarok refunds"),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
