//! Typed record access over a [`Store`].
//!
//! ## Key Layout
//!
//! | Prefix                    | Record               |
//! |---------------------------|----------------------|
//! | `pool/<asset>`            | [`Pool`]             |
//! | `lp/<asset>/<address>`    | [`LiquidityProvider`]|
//! | `bp/<node>`               | [`BondProviders`]    |
//! | `vault/<pubkey>`          | [`Vault`]            |
//! | `node/<address>`          | [`NodeAccount`]      |
//! | `module/<name>`           | settlement balance   |
//! | `supply/<asset>`          | synthetic supply     |
//! | `ragnarok/...`            | retry counters       |
//!
//! Every record is read and written whole. Getters for pools, positions,
//! rosters and nodes return an empty record when the key is absent, so
//! handlers can treat "not yet created" and "empty" alike. Vaults are the
//! exception: a missing vault is an error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{LedgerError, Result};
use crate::store::{MemoryStore, Store};
use crate::types::{
    Address, Asset, BondProviders, LiquidityProvider, ModuleName, NodeAccount, NodeStatus, Pool,
    PubKey, Vault, VaultStatus, VaultType,
};

const POOL_PREFIX: &str = "pool/";
const LP_PREFIX: &str = "lp/";
const BOND_PROVIDERS_PREFIX: &str = "bp/";
const VAULT_PREFIX: &str = "vault/";
const NODE_PREFIX: &str = "node/";
const MODULE_PREFIX: &str = "module/";
const SUPPLY_PREFIX: &str = "supply/";
const RAGNAROK_VAULT_PREFIX: &str = "ragnarok/vault/";
const RAGNAROK_NODE_PREFIX: &str = "ragnarok/node/";

/// Typed ledger state on top of a byte store
#[derive(Debug, Clone, Default)]
pub struct Keeper<S: Store = MemoryStore> {
    store: S,
}

impl<S: Store> Keeper<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key.as_bytes()) {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_record<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        let bytes = bincode::serialize(record)?;
        self.store.set(key.as_bytes(), bytes);
        Ok(())
    }

    fn scan_records<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.store
            .prefix_scan(prefix.as_bytes())
            .into_iter()
            .map(|(_, bytes)| bincode::deserialize(&bytes).map_err(LedgerError::from))
            .collect()
    }

    // ========================================================================
    // Pools
    // ========================================================================

    pub fn pool_exists(&self, asset: &Asset) -> bool {
        self.store.get(format!("{POOL_PREFIX}{asset}").as_bytes()).is_some()
    }

    /// Pool for `asset`, or an empty pool if none exists
    pub fn get_pool(&self, asset: &Asset) -> Result<Pool> {
        Ok(self
            .get_record(&format!("{POOL_PREFIX}{asset}"))?
            .unwrap_or_else(|| Pool::new(asset.clone())))
    }

    pub fn set_pool(&mut self, pool: &Pool) -> Result<()> {
        self.set_record(&format!("{POOL_PREFIX}{}", pool.asset), pool)
    }

    pub fn pools(&self) -> Result<Vec<Pool>> {
        self.scan_records(POOL_PREFIX)
    }

    // ========================================================================
    // Liquidity Providers
    // ========================================================================

    fn lp_key(asset: &Asset, address: &Address) -> String {
        format!("{LP_PREFIX}{asset}/{address}")
    }

    pub fn find_liquidity_provider(&self, asset: &Asset, address: &Address) -> Result<Option<LiquidityProvider>> {
        self.get_record(&Self::lp_key(asset, address))
    }

    /// Position of `address` in `asset`, or an empty one keyed by `address`
    pub fn get_liquidity_provider(&self, asset: &Asset, address: &Address) -> Result<LiquidityProvider> {
        Ok(self.find_liquidity_provider(asset, address)?.unwrap_or_else(|| {
            LiquidityProvider::new(asset.clone(), address.clone(), Address::none())
        }))
    }

    pub fn set_liquidity_provider(&mut self, lp: &LiquidityProvider) -> Result<()> {
        self.set_record(&Self::lp_key(&lp.asset, lp.owner()), lp)
    }

    pub fn set_liquidity_providers(&mut self, lps: &[LiquidityProvider]) -> Result<()> {
        for lp in lps {
            self.set_liquidity_provider(lp)?;
        }
        Ok(())
    }

    pub fn remove_liquidity_provider(&mut self, lp: &LiquidityProvider) {
        self.store.delete(Self::lp_key(&lp.asset, lp.owner()).as_bytes());
    }

    /// Every position in `asset`, ordered by owner address
    pub fn liquidity_providers(&self, asset: &Asset) -> Result<Vec<LiquidityProvider>> {
        self.scan_records(&format!("{LP_PREFIX}{asset}/"))
    }

    /// Existing positions of `address` across `assets`
    pub fn liquidity_providers_by_assets(
        &self,
        assets: &[Asset],
        address: &Address,
    ) -> Result<Vec<LiquidityProvider>> {
        let mut lps = Vec::new();
        for asset in assets {
            if let Some(lp) = self.find_liquidity_provider(asset, address)? {
                lps.push(lp);
            }
        }
        Ok(lps)
    }

    // ========================================================================
    // Bond Providers
    // ========================================================================

    pub fn get_bond_providers(&self, node: &Address) -> Result<BondProviders> {
        Ok(self
            .get_record(&format!("{BOND_PROVIDERS_PREFIX}{node}"))?
            .unwrap_or_else(|| BondProviders::new(node.clone())))
    }

    pub fn set_bond_providers(&mut self, bp: &BondProviders) -> Result<()> {
        self.set_record(&format!("{BOND_PROVIDERS_PREFIX}{}", bp.node_address), bp)
    }

    // ========================================================================
    // Vaults
    // ========================================================================

    pub fn vault_exists(&self, pub_key: &PubKey) -> bool {
        self.store.get(format!("{VAULT_PREFIX}{pub_key}").as_bytes()).is_some()
    }

    pub fn get_vault(&self, pub_key: &PubKey) -> Result<Vault> {
        self.get_record(&format!("{VAULT_PREFIX}{pub_key}"))?
            .ok_or_else(|| LedgerError::missing("vault", pub_key))
    }

    pub fn set_vault(&mut self, vault: &Vault) -> Result<()> {
        self.set_record(&format!("{VAULT_PREFIX}{}", vault.pub_key), vault)
    }

    pub fn vaults(&self) -> Result<Vec<Vault>> {
        self.scan_records(VAULT_PREFIX)
    }

    pub fn vaults_by(&self, vault_type: VaultType, status: VaultStatus) -> Result<Vec<Vault>> {
        Ok(self
            .vaults()?
            .into_iter()
            .filter(|v| v.vault_type == vault_type && v.status == status)
            .collect())
    }

    /// Most recently created active Asgard vault
    pub fn active_asgard(&self) -> Result<Option<Vault>> {
        Ok(self
            .vaults_by(VaultType::Asgard, VaultStatus::Active)?
            .into_iter()
            .max_by_key(|v| v.block_height))
    }

    /// Delete a vault record
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MissingRecord`] if no such vault exists
    /// - [`LedgerError::VaultNotEmpty`] if the vault still holds coins
    pub fn delete_vault(&mut self, pub_key: &PubKey) -> Result<()> {
        let vault = self.get_vault(pub_key)?;
        if vault.has_funds() {
            return Err(LedgerError::VaultNotEmpty(pub_key.to_string()));
        }
        self.store.delete(format!("{VAULT_PREFIX}{pub_key}").as_bytes());
        Ok(())
    }

    // ========================================================================
    // Node Accounts
    // ========================================================================

    /// Node at `address`, or an `Unknown` placeholder
    pub fn get_node_account(&self, address: &Address) -> Result<NodeAccount> {
        Ok(self
            .get_record(&format!("{NODE_PREFIX}{address}"))?
            .unwrap_or_else(|| NodeAccount {
                node_address: address.clone(),
                ..Default::default()
            }))
    }

    pub fn set_node_account(&mut self, na: &NodeAccount) -> Result<()> {
        self.set_record(&format!("{NODE_PREFIX}{}", na.node_address), na)
    }

    pub fn node_accounts(&self) -> Result<Vec<NodeAccount>> {
        self.scan_records(NODE_PREFIX)
    }

    pub fn node_account_by_pub_key(&self, pub_key: &PubKey) -> Result<Option<NodeAccount>> {
        Ok(self.node_accounts()?.into_iter().find(|na| &na.pub_key == pub_key))
    }

    pub fn active_node_accounts(&self) -> Result<Vec<NodeAccount>> {
        Ok(self
            .node_accounts()?
            .into_iter()
            .filter(|na| na.status == NodeStatus::Active)
            .collect())
    }

    // ========================================================================
    // Module Accounts
    // ========================================================================

    /// Deterministic address of a module account
    pub fn module_address(module: ModuleName) -> Address {
        Address::new(format!("maya1module{module}"))
    }

    pub fn module_balance(&self, module: ModuleName) -> Result<u128> {
        Ok(self.get_record(&format!("{MODULE_PREFIX}{module}"))?.unwrap_or(0))
    }

    pub fn set_module_balance(&mut self, module: ModuleName, amount: u128) -> Result<()> {
        self.set_record(&format!("{MODULE_PREFIX}{module}"), &amount)
    }

    /// Move settlement units between module accounts
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invariant`] if `from` holds less than `amount`.
    pub fn send_module_to_module(&mut self, from: ModuleName, to: ModuleName, amount: u128) -> Result<()> {
        let from_balance = self.module_balance(from)?;
        if from_balance < amount {
            return Err(LedgerError::Invariant(format!(
                "module {from} holds {from_balance}, cannot send {amount}"
            )));
        }
        let to_balance = self.module_balance(to)?;
        self.set_module_balance(from, from_balance - amount)?;
        self.set_module_balance(to, to_balance.saturating_add(amount))
    }

    // ========================================================================
    // Synthetic Supply
    // ========================================================================

    pub fn total_supply(&self, asset: &Asset) -> Result<u128> {
        Ok(self.get_record(&format!("{SUPPLY_PREFIX}{asset}"))?.unwrap_or(0))
    }

    pub fn set_total_supply(&mut self, asset: &Asset, amount: u128) -> Result<()> {
        self.set_record(&format!("{SUPPLY_PREFIX}{asset}"), &amount)
    }

    // ========================================================================
    // Ragnarok Counters
    // ========================================================================

    pub fn vault_migration_attempts(&self, pub_key: &PubKey) -> Result<u64> {
        Ok(self.get_record(&format!("{RAGNAROK_VAULT_PREFIX}{pub_key}"))?.unwrap_or(0))
    }

    pub fn set_vault_migration_attempts(&mut self, pub_key: &PubKey, attempts: u64) -> Result<()> {
        self.set_record(&format!("{RAGNAROK_VAULT_PREFIX}{pub_key}"), &attempts)
    }

    pub fn clear_vault_migration_attempts(&mut self, pub_key: &PubKey) {
        self.store.delete(format!("{RAGNAROK_VAULT_PREFIX}{pub_key}").as_bytes());
    }

    pub fn refund_attempts(&self, node: &Address) -> Result<u64> {
        Ok(self.get_record(&format!("{RAGNAROK_NODE_PREFIX}{node}"))?.unwrap_or(0))
    }

    pub fn set_refund_attempts(&mut self, node: &Address, attempts: u64) -> Result<()> {
        self.set_record(&format!("{RAGNAROK_NODE_PREFIX}{node}"), &attempts)
    }

    pub fn clear_refund_attempts(&mut self, node: &Address) {
        self.store.delete(format!("{RAGNAROK_NODE_PREFIX}{node}").as_bytes());
    }

    // ========================================================================
    // State Root
    // ========================================================================

    /// SHA-256 over every key/value pair in key order
    ///
    /// Each pair is length-prefixed so distinct layouts cannot collide.
    pub fn state_root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (key, value) in self.store.prefix_scan(&[]) {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(&key);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(&value);
        }
        let mut root = [0u8; 32];
        root.copy_from_slice(&hasher.finalize());
        root
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coin;

    fn keeper() -> Keeper {
        Keeper::new(MemoryStore::new())
    }

    fn btc() -> Asset {
        "BTC.BTC".parse().unwrap()
    }

    #[test]
    fn test_missing_records_default() {
        let k = keeper();
        assert!(k.get_pool(&btc()).unwrap().is_empty());
        assert_eq!(k.get_node_account(&Address::from("n")).unwrap().status, NodeStatus::Unknown);
        assert!(k.get_bond_providers(&Address::from("n")).unwrap().is_empty());
        assert!(matches!(
            k.get_vault(&PubKey::from("pk")),
            Err(LedgerError::MissingRecord { entity: "vault", .. })
        ));
    }

    #[test]
    fn test_liquidity_providers_by_asset() {
        let mut k = keeper();
        let eth: Asset = "ETH.ETH".parse().unwrap();
        for (asset, addr) in [(btc(), "b"), (btc(), "a"), (eth.clone(), "a")] {
            let mut lp = LiquidityProvider::new(asset, Address::from(addr), Address::none());
            lp.units = 1;
            k.set_liquidity_provider(&lp).unwrap();
        }
        let lps = k.liquidity_providers(&btc()).unwrap();
        assert_eq!(lps.len(), 2);
        assert_eq!(lps[0].settlement_address, Address::from("a"));

        let mine = k
            .liquidity_providers_by_assets(&[btc(), eth, "BNB.BNB".parse().unwrap()], &Address::from("a"))
            .unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[test]
    fn test_synth_positions_do_not_leak_into_layer1_scan() {
        let mut k = keeper();
        let synth: Asset = "BTC/BTC".parse().unwrap();
        let lp = LiquidityProvider::new(synth.clone(), Address::none(), Address::from("s"));
        k.set_liquidity_provider(&lp).unwrap();
        assert!(k.liquidity_providers(&btc()).unwrap().is_empty());
        assert_eq!(k.liquidity_providers(&synth).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_vault_requires_empty() {
        let mut k = keeper();
        let mut vault = Vault::new(PubKey::from("pk"), VaultType::Asgard, vec![], 1);
        vault.add_funds(&[Coin::new(btc(), 10)]);
        k.set_vault(&vault).unwrap();

        assert_eq!(
            k.delete_vault(&vault.pub_key),
            Err(LedgerError::VaultNotEmpty("pk".into()))
        );
        assert!(k.vault_exists(&vault.pub_key));

        vault.drain();
        k.set_vault(&vault).unwrap();
        k.delete_vault(&vault.pub_key).unwrap();
        assert!(!k.vault_exists(&vault.pub_key));
    }

    #[test]
    fn test_module_transfer() {
        let mut k = keeper();
        k.set_module_balance(ModuleName::Reserve, 100).unwrap();
        k.send_module_to_module(ModuleName::Reserve, ModuleName::Asgard, 40).unwrap();
        assert_eq!(k.module_balance(ModuleName::Reserve).unwrap(), 60);
        assert_eq!(k.module_balance(ModuleName::Asgard).unwrap(), 40);
        assert!(k.send_module_to_module(ModuleName::Reserve, ModuleName::Asgard, 61).is_err());
    }

    #[test]
    fn test_state_root_tracks_content() {
        let mut a = keeper();
        let mut b = keeper();
        assert_eq!(a.state_root(), b.state_root());

        a.set_pool(&Pool::new(btc())).unwrap();
        assert_ne!(a.state_root(), b.state_root());

        b.set_pool(&Pool::new(btc())).unwrap();
        assert_eq!(a.state_root(), b.state_root());
    }

    #[test]
    fn test_active_asgard_is_newest() {
        let mut k = keeper();
        k.set_vault(&Vault::new(PubKey::from("old"), VaultType::Asgard, vec![], 1)).unwrap();
        k.set_vault(&Vault::new(PubKey::from("new"), VaultType::Asgard, vec![], 5)).unwrap();
        k.set_vault(&Vault::new(PubKey::from("ygg"), VaultType::Yggdrasil, vec![], 9)).unwrap();
        assert_eq!(k.active_asgard().unwrap().unwrap().pub_key, PubKey::from("new"));
    }
}
