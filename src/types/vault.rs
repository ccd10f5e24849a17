//! Custody vaults.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::types::address::{Address, PubKey};
use crate::types::asset::{Asset, Coin};
use crate::types::math::safe_sub;

/// Custody model of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VaultType {
    /// Shared custody across the active validator set
    #[default]
    Asgard,
    /// Single-node custody
    Yggdrasil,
}

/// Vault lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VaultStatus {
    #[default]
    Active,
    Retiring,
    Inactive,
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VaultStatus::Active => "Active",
            VaultStatus::Retiring => "Retiring",
            VaultStatus::Inactive => "Inactive",
        };
        f.write_str(s)
    }
}

/// A threshold-key custody vault and the coins it holds
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vault {
    pub pub_key: PubKey,
    pub vault_type: VaultType,
    pub status: VaultStatus,
    pub coins: Vec<Coin>,
    /// Signer set (node public keys)
    pub membership: Vec<PubKey>,
    pub block_height: u64,
}

impl Vault {
    pub fn new(pub_key: PubKey, vault_type: VaultType, membership: Vec<PubKey>, block_height: u64) -> Self {
        Self {
            pub_key,
            vault_type,
            membership,
            block_height,
            ..Default::default()
        }
    }

    pub fn is_asgard(&self) -> bool {
        self.vault_type == VaultType::Asgard
    }

    pub fn is_yggdrasil(&self) -> bool {
        self.vault_type == VaultType::Yggdrasil
    }

    pub fn has_funds(&self) -> bool {
        self.coins.iter().any(|c| c.amount > 0)
    }

    pub fn get_coin(&self, asset: &Asset) -> u128 {
        self.coins
            .iter()
            .find(|c| &c.asset == asset)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    /// Address of this vault on `chain`
    pub fn address(&self, chain: &str) -> Address {
        Address::new(format!("{}:{}", chain.to_lowercase(), self.pub_key))
    }

    pub fn contains(&self, member: &PubKey) -> bool {
        self.membership.contains(member)
    }

    pub fn add_funds(&mut self, coins: &[Coin]) {
        for coin in coins.iter().filter(|c| c.amount > 0) {
            match self.coins.iter_mut().find(|c| c.asset == coin.asset) {
                Some(held) => held.amount = held.amount.saturating_add(coin.amount),
                None => self.coins.push(coin.clone()),
            }
        }
    }

    /// Deduct `coins`, flooring each balance at zero
    pub fn sub_funds(&mut self, coins: &[Coin]) {
        for coin in coins {
            if let Some(held) = self.coins.iter_mut().find(|c| c.asset == coin.asset) {
                if coin.amount > held.amount {
                    error!(
                        vault = %self.pub_key,
                        asset = %coin.asset,
                        held = held.amount,
                        amount = coin.amount,
                        "vault balance would go negative"
                    );
                }
                held.amount = safe_sub(held.amount, coin.amount);
            }
        }
        self.coins.retain(|c| c.amount > 0);
    }

    /// Zero every balance
    pub fn drain(&mut self) {
        self.coins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> Asset {
        "BTC.BTC".parse().unwrap()
    }

    #[test]
    fn test_funds() {
        let mut vault = Vault::new(PubKey::from("pk"), VaultType::Yggdrasil, vec![], 1);
        assert!(!vault.has_funds());
        vault.add_funds(&[Coin::new(btc(), 100), Coin::new(btc(), 50)]);
        assert_eq!(vault.get_coin(&btc()), 150);
        vault.sub_funds(&[Coin::new(btc(), 200)]);
        assert_eq!(vault.get_coin(&btc()), 0);
        assert!(!vault.has_funds());
    }

    #[test]
    fn test_address_is_per_chain() {
        let vault = Vault::new(PubKey::from("pk"), VaultType::Asgard, vec![], 1);
        assert_ne!(vault.address("BTC"), vault.address("ETH"));
        assert!(vault.is_asgard());
    }
}
