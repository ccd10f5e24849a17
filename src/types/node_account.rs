//! Validator node accounts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::address::{Address, PubKey};

/// Validator lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    /// No record exists yet
    #[default]
    Unknown,
    Whitelisted,
    Standby,
    Ready,
    Active,
    Disabled,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A validator node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeAccount {
    pub node_address: Address,
    pub status: NodeStatus,
    /// Key of the node's Yggdrasil vault
    pub pub_key: PubKey,
    /// Operator's bond address
    pub bond_address: Address,
    /// Undistributed earnings (settlement units)
    pub reward: u128,
    pub requested_to_leave: bool,
    pub status_since: u64,
}

impl NodeAccount {
    pub fn new(node_address: Address, status: NodeStatus, pub_key: PubKey, bond_address: Address, height: u64) -> Self {
        Self {
            node_address,
            status,
            pub_key,
            bond_address,
            status_since: height,
            ..Default::default()
        }
    }

    pub fn update_status(&mut self, status: NodeStatus, height: u64) {
        if self.status != status {
            self.status = status;
            self.status_since = height;
        }
    }

    /// Active and Ready nodes must keep their backing
    pub fn is_serving(&self) -> bool {
        matches!(self.status, NodeStatus::Active | NodeStatus::Ready)
    }
}
