//! Outbound transaction queue.
//!
//! ## Architecture
//!
//! - **Slab**: pre-allocated storage for queued items, O(1) insert/remove
//! - **BTreeMap**: insertion sequence to slab key, so pending items are
//!   always listed in the order they were scheduled
//!
//! `try_add` respects a per-block throughput limit and reports "not now" as
//! `Ok(false)`; `unsafe_add` bypasses the limit for protocol-internal moves
//! such as vault migration. Items stay queued until an observed on-chain
//! transaction completes them.
//!
//! ## Example
//!
//! ```
//! use liquidity_core::outbound::{OutboundQueue, SlabOutboundQueue};
//! use liquidity_core::types::{Address, Asset, Coin, TxId, TxOutItem};
//!
//! let mut queue = SlabOutboundQueue::with_capacity(16, 1);
//! queue.begin_block(10);
//!
//! let item = |n| TxOutItem::new(Address::from("to"), Coin::new(Asset::settlement(), n), TxId::blank(), "");
//! assert!(queue.try_add(item(5)).unwrap());
//! assert!(!queue.try_add(item(6)).unwrap()); // limit reached
//! queue.unsafe_add(item(7)).unwrap();
//! assert_eq!(queue.len(), 2);
//! ```

use std::collections::BTreeMap;

use slab::Slab;
use tracing::{debug, warn};

use crate::errors::{LedgerError, Result};
use crate::types::{TxId, TxOutItem};

/// Handle to a queued item
pub type OutboundKey = usize;

/// Outbound scheduling collaborator
pub trait OutboundQueue {
    /// Schedule `item` if the block's throughput allows
    ///
    /// `Ok(false)` means "could not schedule now"; errors mean the item is
    /// malformed.
    fn try_add(&mut self, item: TxOutItem) -> Result<bool>;

    /// Whether `count` more items fit in this block's throughput limit
    fn has_capacity(&self, count: usize) -> bool;

    /// Schedule `item` regardless of throughput limits
    fn unsafe_add(&mut self, item: TxOutItem) -> Result<()>;

    /// First pending item (in scheduling order) matching `pred`
    fn find_pending(&self, pred: &dyn Fn(u64, &TxOutItem) -> bool) -> Option<OutboundKey>;

    /// Mark an item as sent and remove it from the queue
    fn complete(&mut self, key: OutboundKey, out_hash: TxId) -> Option<TxOutItem>;
}

#[derive(Debug, Clone)]
struct QueuedItem {
    height: u64,
    seq: u64,
    item: TxOutItem,
}

/// Slab-backed outbound queue with a per-block limit
#[derive(Debug)]
pub struct SlabOutboundQueue {
    items: Slab<QueuedItem>,
    order: BTreeMap<u64, OutboundKey>,
    per_block_limit: usize,
    height: u64,
    added_this_block: usize,
    next_seq: u64,
}

impl Default for SlabOutboundQueue {
    fn default() -> Self {
        Self::with_capacity(1_024, 100)
    }
}

impl SlabOutboundQueue {
    /// Create a queue with `capacity` pre-allocated slots
    pub fn with_capacity(capacity: usize, per_block_limit: usize) -> Self {
        Self {
            items: Slab::with_capacity(capacity),
            order: BTreeMap::new(),
            per_block_limit,
            height: 0,
            added_this_block: 0,
            next_seq: 0,
        }
    }

    /// Start a new block: items added from now on are stamped with `height`
    pub fn begin_block(&mut self, height: u64) {
        self.height = height;
        self.added_this_block = 0;
    }

    pub fn set_per_block_limit(&mut self, limit: usize) {
        self.per_block_limit = limit;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items scheduled since the last `begin_block`
    pub fn added_this_block(&self) -> usize {
        self.added_this_block
    }

    pub fn get(&self, key: OutboundKey) -> Option<&TxOutItem> {
        self.items.get(key).map(|q| &q.item)
    }

    /// Pending items in scheduling order, with the height they were queued at
    pub fn pending(&self) -> Vec<(u64, &TxOutItem)> {
        self.order
            .values()
            .filter_map(|key| self.items.get(*key))
            .map(|q| (q.height, &q.item))
            .collect()
    }

    fn validate(item: &TxOutItem) -> Result<()> {
        if item.to_address.is_empty() {
            return Err(LedgerError::Outbound("missing destination address".into()));
        }
        if item.coin.asset.is_empty() {
            return Err(LedgerError::Outbound("missing asset".into()));
        }
        Ok(())
    }

    fn insert(&mut self, item: TxOutItem) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(to = %item.to_address, coin = %item.coin, memo = %item.memo, "queued outbound");
        let key = self.items.insert(QueuedItem {
            height: self.height,
            seq,
            item,
        });
        self.order.insert(seq, key);
        self.added_this_block += 1;
    }
}

impl OutboundQueue for SlabOutboundQueue {
    fn has_capacity(&self, count: usize) -> bool {
        self.added_this_block.saturating_add(count) <= self.per_block_limit
    }

    fn try_add(&mut self, item: TxOutItem) -> Result<bool> {
        Self::validate(&item)?;
        if item.coin.amount == 0 {
            return Ok(false);
        }
        if self.added_this_block >= self.per_block_limit {
            warn!(
                limit = self.per_block_limit,
                to = %item.to_address,
                "outbound limit reached for this block"
            );
            return Ok(false);
        }
        self.insert(item);
        Ok(true)
    }

    fn unsafe_add(&mut self, item: TxOutItem) -> Result<()> {
        Self::validate(&item)?;
        if item.coin.amount > 0 {
            self.insert(item);
        }
        Ok(())
    }

    fn find_pending(&self, pred: &dyn Fn(u64, &TxOutItem) -> bool) -> Option<OutboundKey> {
        self.order
            .values()
            .copied()
            .find(|key| self.items.get(*key).is_some_and(|q| pred(q.height, &q.item)))
    }

    fn complete(&mut self, key: OutboundKey, out_hash: TxId) -> Option<TxOutItem> {
        let queued = self.items.try_remove(key)?;
        self.order.remove(&queued.seq);
        let mut item = queued.item;
        item.out_hash = Some(out_hash);
        Some(item)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
