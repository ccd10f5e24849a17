//! Block receipt for ledger processing results.
//!
//! The BlockReceipt summarizes one processed block, including the state root
//! of the keyed store after the block's mutations.

use ssz_rs::prelude::*;
use sha2::{Sha256, Digest};

/// Receipt summarizing one processed block.
///
/// ## State Root
///
/// The 32-byte state root is a SHA-256 hash over every key/value pair in the
/// store, in key order. Two replicas that applied the same messages produce
/// the same root.
///
/// ## Example
///
/// ```
/// use liquidity_core::types::BlockReceipt;
///
/// let receipt = BlockReceipt::new(
///     100,        // height
///     12,         // messages_processed
///     1,          // messages_failed
///     30,         // events_emitted
///     4,          // outbound_queued
///     [0u8; 32],  // state_root (would be computed)
/// );
/// assert_eq!(receipt.messages_succeeded(), 11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct BlockReceipt {
    /// Block height
    pub height: u64,

    /// Number of ledger messages applied in this block
    pub messages_processed: u64,

    /// Number of messages rejected (refunded or failed internally)
    pub messages_failed: u64,

    /// Number of events emitted
    pub events_emitted: u64,

    /// Number of outbound items scheduled
    pub outbound_queued: u64,

    /// State root after the block (SHA-256, 32 bytes)
    pub state_root: [u8; 32],
}

impl BlockReceipt {
    pub fn new(
        height: u64,
        messages_processed: u64,
        messages_failed: u64,
        events_emitted: u64,
        outbound_queued: u64,
        state_root: [u8; 32],
    ) -> Self {
        Self {
            height,
            messages_processed,
            messages_failed,
            events_emitted,
            outbound_queued,
            state_root,
        }
    }

    /// Compute SHA-256 hash of the given data
    pub fn compute_hash(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    /// Get the state root as a hex string
    pub fn state_root_hex(&self) -> String {
        hex::encode(self.state_root)
    }

    /// Check if the block carried no ledger messages
    pub fn is_empty(&self) -> bool {
        self.messages_processed == 0
    }

    pub fn messages_succeeded(&self) -> u64 {
        self.messages_processed.saturating_sub(self.messages_failed)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
