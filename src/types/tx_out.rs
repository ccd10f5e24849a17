//! Outbound transaction items.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::address::{Address, PubKey, TxId};
use crate::types::asset::Coin;

/// Module account that funds an outbound item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModuleName {
    /// Pool-backing module (external-chain vault funds)
    #[default]
    Asgard,
    /// Bond module (node rewards)
    Bond,
    /// Protocol reserve
    Reserve,
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleName::Asgard => "asgard",
            ModuleName::Bond => "bond",
            ModuleName::Reserve => "reserve",
        };
        f.write_str(s)
    }
}

/// A payment the protocol has scheduled
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxOutItem {
    pub chain: String,
    pub to_address: Address,
    /// Vault that signs the payment (empty for settlement-chain payments)
    pub vault_pub_key: PubKey,
    pub coin: Coin,
    pub memo: String,
    /// Inbound transaction that caused this payment
    pub in_hash: TxId,
    pub module_name: ModuleName,
    /// Set once the payment is observed on chain
    pub out_hash: Option<TxId>,
}

impl TxOutItem {
    pub fn new(to_address: Address, coin: Coin, in_hash: TxId, memo: impl Into<String>) -> Self {
        Self {
            chain: coin.asset.custody_chain().to_string(),
            to_address,
            coin,
            memo: memo.into(),
            in_hash,
            ..Default::default()
        }
    }

    pub fn with_module(mut self, module_name: ModuleName) -> Self {
        self.module_name = module_name;
        self
    }

    pub fn with_vault(mut self, vault_pub_key: PubKey) -> Self {
        self.vault_pub_key = vault_pub_key;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.out_hash.is_some()
    }
}

/// Memo carried by migration payments out of a retiring vault
pub fn ragnarok_memo(height: u64) -> String {
    format!("RAGNAROK:{height}")
}

/// Memo carried by refunds of rejected inbound transactions
pub fn refund_memo(in_hash: &TxId) -> String {
    format!("REFUND:{in_hash}")
}
