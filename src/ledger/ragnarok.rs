//! Vault retirement ("Ragnarok").
//!
//! ## Lifecycle
//!
//! ```text
//! Active --churn--> Retiring --migrations observed--> drained --> deleted
//! ```
//!
//! 1. A churn installs a new Asgard vault. Every other active Asgard vault,
//!    and the Yggdrasil vault of every node that is not active, becomes
//!    `Retiring`.
//! 2. Every `FundMigrationInterval` blocks each retiring vault with funds
//!    gets one batch of migration payments to the active Asgard vault,
//!    memo `RAGNAROK:<height>`. Batches are counted against
//!    `MaxRagnarokAttempts`.
//! 3. Observed migration payments complete their queued items and move the
//!    funds. Coins that left the vault without a matching item are slashed
//!    as theft. Drained retiring Asgard vaults are deleted.
//! 4. At the end of each block, nodes whose retiring Yggdrasil vault is
//!    drained have every provider's bond refunded (which also deletes the
//!    vault). A failed refund is retried on later blocks up to the same
//!    attempt limit.

use tracing::{debug, error, info, warn};

use crate::errors::{LedgerError, Result};
use crate::ledger::msg::RagnarokObservation;
use crate::ledger::refund::{refund_bond, RefundRequest};
use crate::ledger::slashing::slash_vault_theft;
use crate::outbound::OutboundQueue;
use crate::params::ProtocolParameters;
use crate::store::{Keeper, Store};
use crate::types::{
    emit_or_log, ragnarok_memo, Address, Coin, Event, EventSink, NodeStatus, TxId, TxOutItem, Vault, VaultStatus,
    VaultType,
};

/// Install `vault` as the active Asgard vault and retire the previous set
pub fn begin_retirement<S: Store>(keeper: &mut Keeper<S>, vault: &Vault, height: u64) -> Result<()> {
    if !vault.is_asgard() {
        return Err(LedgerError::Validation(format!("churn vault {} is not an Asgard vault", vault.pub_key)));
    }

    for mut old in keeper.vaults_by(VaultType::Asgard, VaultStatus::Active)? {
        if old.pub_key == vault.pub_key {
            continue;
        }
        old.status = VaultStatus::Retiring;
        keeper.set_vault(&old)?;
        info!(vault = %old.pub_key, height, "asgard vault retiring");
    }

    for mut ygg in keeper.vaults_by(VaultType::Yggdrasil, VaultStatus::Active)? {
        let active = keeper
            .node_account_by_pub_key(&ygg.pub_key)?
            .is_some_and(|na| na.status == NodeStatus::Active);
        if active {
            continue;
        }
        ygg.status = VaultStatus::Retiring;
        keeper.set_vault(&ygg)?;
        info!(vault = %ygg.pub_key, height, "yggdrasil vault retiring");
    }

    let mut active = vault.clone();
    active.status = VaultStatus::Active;
    keeper.set_vault(&active)
}

fn is_migration(item: &TxOutItem) -> bool {
    item.memo.starts_with("RAGNAROK:")
}

/// Schedule one migration batch per funded retiring vault
///
/// Runs only on `FundMigrationInterval` heights. Coins that still have a
/// migration item pending are not scheduled again, and a run that schedules
/// nothing for a vault does not count as an attempt. Drained retiring Asgard
/// vaults are deleted. Returns the number of items scheduled.
pub fn migrate_retiring_vaults<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    height: u64,
) -> Result<usize> {
    let interval = params.fund_migration_interval();
    if interval == 0 || height % interval != 0 {
        return Ok(0);
    }
    let Some(target) = keeper.active_asgard()? else {
        warn!(height, "no active asgard vault to migrate funds to");
        return Ok(0);
    };

    let memo = ragnarok_memo(height);
    let max_attempts = params.max_ragnarok_attempts();
    let mut scheduled = 0usize;
    for vault in keeper.vaults()? {
        if vault.status != VaultStatus::Retiring {
            continue;
        }
        if !vault.has_funds() {
            if vault.is_asgard() {
                retire_vault(keeper, events, &vault)?;
            }
            continue;
        }

        let attempts = keeper.vault_migration_attempts(&vault.pub_key)?;
        if attempts >= max_attempts {
            warn!(vault = %vault.pub_key, attempts, "vault migration attempts exhausted");
            continue;
        }

        let mut batch = 0usize;
        for coin in vault.coins.iter().filter(|c| !c.is_empty()) {
            let pending = queue
                .find_pending(&|_, item| {
                    is_migration(item) && item.vault_pub_key == vault.pub_key && item.coin.asset == coin.asset
                })
                .is_some();
            if pending {
                debug!(vault = %vault.pub_key, asset = %coin.asset, "migration already pending");
                continue;
            }
            let item = TxOutItem::new(
                target.address(coin.asset.custody_chain()),
                coin.clone(),
                TxId::blank(),
                memo.clone(),
            )
            .with_vault(vault.pub_key.clone());
            match queue.unsafe_add(item) {
                Ok(()) => batch += 1,
                Err(err) => error!(vault = %vault.pub_key, asset = %coin.asset, %err, "fail to schedule migration"),
            }
        }
        if batch == 0 {
            continue;
        }
        scheduled += batch;
        keeper.set_vault_migration_attempts(&vault.pub_key, attempts + 1)?;
        info!(vault = %vault.pub_key, attempt = attempts + 1, items = batch, height, "migration batch scheduled");
    }
    Ok(scheduled)
}

fn retire_vault<S: Store>(keeper: &mut Keeper<S>, events: &mut dyn EventSink, vault: &Vault) -> Result<()> {
    keeper.delete_vault(&vault.pub_key)?;
    keeper.clear_vault_migration_attempts(&vault.pub_key);
    info!(vault = %vault.pub_key, "retired vault deleted");
    emit_or_log(
        events,
        Event::VaultRetired {
            vault: vault.pub_key.clone(),
        },
    );
    Ok(())
}

/// Apply an observed migration payment out of a retiring vault
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] if the vault is unknown or no
/// migration batch was scheduled for it at the memo height.
pub fn handle_ragnarok_observation<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    obs: &RagnarokObservation,
) -> Result<()> {
    if !keeper.vault_exists(&obs.vault_pub_key) {
        return Err(LedgerError::Validation(format!("unknown vault {}", obs.vault_pub_key)));
    }
    let memo = ragnarok_memo(obs.memo_height);
    let batch = queue.find_pending(&|_, item| item.memo == memo && item.vault_pub_key == obs.vault_pub_key);
    if batch.is_none() {
        return Err(LedgerError::Validation(format!(
            "no ragnarok batch for {} at height {}",
            obs.vault_pub_key, obs.memo_height
        )));
    }

    let mut moved = Vec::new();
    let mut stolen = Vec::new();
    for coin in obs.coins.iter().filter(|c| !c.is_empty()) {
        let key = queue.find_pending(&|_, item| {
            item.memo == memo
                && item.vault_pub_key == obs.vault_pub_key
                && item.to_address == obs.to_address
                && item.coin.asset == coin.asset
        });
        let Some(item) = key.and_then(|key| queue.complete(key, obs.tx_id.clone())) else {
            stolen.push(coin.clone());
            continue;
        };
        let expected = item.coin.amount;
        if coin.amount > expected {
            stolen.push(Coin::new(coin.asset.clone(), coin.amount - expected));
            moved.push(Coin::new(coin.asset.clone(), expected));
        } else {
            moved.push(coin.clone());
        }
    }

    let mut vault = keeper.get_vault(&obs.vault_pub_key)?;
    vault.sub_funds(&obs.coins);
    keeper.set_vault(&vault)?;

    if !moved.is_empty() {
        let target = keeper
            .vaults_by(VaultType::Asgard, VaultStatus::Active)?
            .into_iter()
            .find(|v| v.address(&obs.chain) == obs.to_address);
        match target {
            Some(mut target) => {
                target.add_funds(&moved);
                keeper.set_vault(&target)?;
            }
            None => error!(to = %obs.to_address, "migration destination is not an active asgard vault"),
        }
    }

    if !stolen.is_empty() {
        warn!(vault = %vault.pub_key, coins = stolen.len(), "unscheduled funds left a retiring vault");
        slash_vault_theft(keeper, params, events, &vault, &stolen, &obs.tx_id)?;
    }

    if vault.status == VaultStatus::Retiring && vault.is_asgard() && !vault.has_funds() {
        retire_vault(keeper, events, &vault)?;
    }
    Ok(())
}

/// Refund the bonds of nodes whose retiring Yggdrasil vault has drained
///
/// Serving nodes are left alone. A node whose refund fails keeps a retry
/// counter and is tried again on the next block until the counter reaches
/// `MaxRagnarokAttempts`. Returns the number of nodes fully refunded.
pub fn process_ragnarok_refunds<S: Store>(
    keeper: &mut Keeper<S>,
    params: &ProtocolParameters,
    queue: &mut dyn OutboundQueue,
    events: &mut dyn EventSink,
    height: u64,
) -> Result<usize> {
    let max_attempts = params.max_ragnarok_attempts();
    let mut refunded = 0usize;
    for na in keeper.node_accounts()? {
        if na.status == NodeStatus::Unknown || na.is_serving() {
            continue;
        }
        let attempts = keeper.refund_attempts(&na.node_address)?;
        if attempts >= max_attempts {
            continue;
        }
        let drained = !na.pub_key.is_empty()
            && keeper.vault_exists(&na.pub_key)
            && {
                let ygg = keeper.get_vault(&na.pub_key)?;
                ygg.is_yggdrasil() && ygg.status == VaultStatus::Retiring && !ygg.has_funds()
            };
        if !drained && attempts == 0 {
            continue;
        }

        let bp = keeper.get_bond_providers(&na.node_address)?;
        let mut providers: Vec<Address> = bp.providers.iter().map(|p| p.bond_address.clone()).collect();
        if providers.is_empty() {
            providers.push(na.bond_address.clone());
        }

        let mut failure = None;
        for provider in &providers {
            let tx_id = TxId::derive(format!("ragnarok/{height}/{}/{provider}", na.node_address).as_bytes());
            let request = RefundRequest {
                tx_id: &tx_id,
                provider,
                asset: None,
                units: 0,
            };
            let mut current = keeper.get_node_account(&na.node_address)?;
            if let Err(err) = refund_bond(keeper, params, queue, events, &request, &mut current, height) {
                failure = Some(err);
                break;
            }
        }

        match failure {
            None => {
                keeper.clear_refund_attempts(&na.node_address);
                refunded += 1;
                info!(node = %na.node_address, providers = providers.len(), "ragnarok bond refund complete");
            }
            Some(err) => {
                let attempts = attempts + 1;
                keeper.set_refund_attempts(&na.node_address, attempts)?;
                if attempts >= max_attempts {
                    error!(node = %na.node_address, attempts, %err, "ragnarok bond refund abandoned");
                } else {
                    warn!(node = %na.node_address, attempts, %err, "ragnarok bond refund failed, will retry");
                }
            }
        }
    }
    Ok(refunded)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::*;
    use crate::outbound::SlabOutboundQueue;
    use crate::params::{ConstantName, Mimir, ProtocolVersion};
    use crate::store::MemoryStore;
    use crate::types::{EventLog, PubKey};

    fn asgard(pk: &str, height: u64, coins: &[Coin]) -> Vault {
        let mut vault = Vault::new(PubKey::from(pk), VaultType::Asgard, vec![], height);
        vault.add_funds(coins);
        vault
    }

    /// Old asgard holding 10 BTC and 50 ETH, retired by a churn to "new"
    fn retiring() -> (Keeper, Vault) {
        let mut keeper = Keeper::new(MemoryStore::new());
        seed_pool(&mut keeper, &btc(), 1_000, 100, 100);
        let old = asgard("old", 1, &[Coin::new(btc(), 10), Coin::new(eth(), 50)]);
        keeper.set_vault(&old).unwrap();
        let new = asgard("new", 2, &[]);
        begin_retirement(&mut keeper, &new, 2).unwrap();
        (keeper, new)
    }

    fn params_with_interval(interval: i64) -> ProtocolParameters {
        let mut mimir = Mimir::default();
        mimir.set(ConstantName::FundMigrationInterval, interval);
        ProtocolParameters::resolve(ProtocolVersion::new(1, 105, 0), &mimir).unwrap()
    }

    #[test]
    fn test_churn_retires_previous_set() {
        let mut keeper = Keeper::new(MemoryStore::new());
        keeper.set_vault(&asgard("old", 1, &[])).unwrap();
        let active = seed_node(&mut keeper, "busy", "op1", &[], NodeStatus::Active);
        let idle = seed_node(&mut keeper, "idle", "op2", &[], NodeStatus::Standby);
        seed_yggdrasil(&mut keeper, &active, &[]);
        seed_yggdrasil(&mut keeper, &idle, &[]);

        begin_retirement(&mut keeper, &asgard("new", 2, &[]), 2).unwrap();
        assert_eq!(keeper.get_vault(&PubKey::from("old")).unwrap().status, VaultStatus::Retiring);
        assert_eq!(keeper.get_vault(&PubKey::from("new")).unwrap().status, VaultStatus::Active);
        assert_eq!(keeper.get_vault(&active.pub_key).unwrap().status, VaultStatus::Active);
        assert_eq!(keeper.get_vault(&idle.pub_key).unwrap().status, VaultStatus::Retiring);

        let ygg = Vault::new(PubKey::from("x"), VaultType::Yggdrasil, vec![], 3);
        assert!(begin_retirement(&mut keeper, &ygg, 3).unwrap_err().is_validation());
    }

    #[test]
    fn test_migration_runs_on_interval() {
        let (mut keeper, new) = retiring();
        let p = params_with_interval(10);
        let mut queue = SlabOutboundQueue::with_capacity(16, 0);
        let mut events = EventLog::new();

        assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 15).unwrap(), 0);
        // per-block limit of zero does not apply to migrations
        assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 20).unwrap(), 2);
        let pending = queue.pending();
        assert!(pending.iter().all(|(_, item)| item.memo == "RAGNAROK:20"));
        assert_eq!(pending[0].1.to_address, new.address("BTC"));
        assert_eq!(keeper.vault_migration_attempts(&PubKey::from("old")).unwrap(), 1);

        // pending coins are not scheduled twice, nor counted as an attempt
        assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 30).unwrap(), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(keeper.vault_migration_attempts(&PubKey::from("old")).unwrap(), 1);
    }

    #[test]
    fn test_pending_batch_does_not_exhaust_attempts() {
        let (mut keeper, _) = retiring();
        let p = params_with_interval(10);
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();

        migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 10).unwrap();
        let runs = p.max_ragnarok_attempts() + 2;
        for i in 2..=runs {
            assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, i * 10).unwrap(), 0);
        }
        assert_eq!(keeper.vault_migration_attempts(&PubKey::from("old")).unwrap(), 1);

        // once the batch leaves the queue the vault can be retried
        while let Some(key) = queue.find_pending(&|_, _| true) {
            queue.complete(key, TxId::from("OUT"));
        }
        assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, (runs + 1) * 10).unwrap(), 2);
        assert_eq!(keeper.vault_migration_attempts(&PubKey::from("old")).unwrap(), 2);
    }

    #[test]
    fn test_migration_attempts_are_capped() {
        let (mut keeper, _) = retiring();
        let p = params_with_interval(1);
        keeper
            .set_vault_migration_attempts(&PubKey::from("old"), p.max_ragnarok_attempts())
            .unwrap();
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        assert_eq!(migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 5).unwrap(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_observation_drains_and_retires_vault() {
        let (mut keeper, new) = retiring();
        let p = params_with_interval(10);
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 10).unwrap();

        let observe = |chain: &str, coin: Coin| RagnarokObservation {
            tx_id: TxId::from("OUT"),
            chain: chain.to_string(),
            vault_pub_key: PubKey::from("old"),
            to_address: new.address(chain),
            coins: vec![coin],
            memo_height: 10,
        };
        handle_ragnarok_observation(&mut keeper, &p, &mut queue, &mut events, &observe("BTC", Coin::new(btc(), 10)))
            .unwrap();
        assert_eq!(keeper.get_vault(&PubKey::from("old")).unwrap().get_coin(&btc()), 0);
        assert_eq!(keeper.get_vault(&new.pub_key).unwrap().get_coin(&btc()), 10);
        assert_eq!(queue.len(), 1);

        handle_ragnarok_observation(&mut keeper, &p, &mut queue, &mut events, &observe("ETH", Coin::new(eth(), 50)))
            .unwrap();
        assert!(!keeper.vault_exists(&PubKey::from("old")));
        assert!(queue.is_empty());
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::VaultRetired { vault } if vault == &PubKey::from("old"))));
    }

    #[test]
    fn test_observation_without_batch_rejected() {
        let (mut keeper, new) = retiring();
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        let obs = RagnarokObservation {
            tx_id: TxId::from("OUT"),
            chain: "BTC".into(),
            vault_pub_key: PubKey::from("old"),
            to_address: new.address("BTC"),
            coins: vec![Coin::new(btc(), 10)],
            memo_height: 10,
        };
        let err = handle_ragnarok_observation(&mut keeper, &params(), &mut queue, &mut events, &obs).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(keeper.get_vault(&PubKey::from("old")).unwrap().get_coin(&btc()), 10);
    }

    #[test]
    fn test_overpaid_migration_is_slashed() {
        let mut keeper = Keeper::new(MemoryStore::new());
        seed_pool(&mut keeper, &btc(), 1_000, 100, 100);
        seed_lp(&mut keeper, &btc(), "op", 100);
        bond_lp(&mut keeper, &btc(), "op", "node", 100);
        let na = seed_node(&mut keeper, "node", "op", &[], NodeStatus::Active);
        let mut old = asgard("old", 1, &[Coin::new(btc(), 5)]);
        old.membership = vec![na.pub_key.clone()];
        keeper.set_vault(&old).unwrap();
        let new = asgard("new", 2, &[]);
        begin_retirement(&mut keeper, &new, 2).unwrap();

        let p = params_with_interval(10);
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        migrate_retiring_vaults(&mut keeper, &p, &mut queue, &mut events, 10).unwrap();

        let obs = RagnarokObservation {
            tx_id: TxId::from("OUT"),
            chain: "BTC".into(),
            vault_pub_key: old.pub_key.clone(),
            to_address: new.address("BTC"),
            coins: vec![Coin::new(btc(), 8)],
            memo_height: 10,
        };
        handle_ragnarok_observation(&mut keeper, &p, &mut queue, &mut events, &obs).unwrap();
        assert_eq!(keeper.get_vault(&new.pub_key).unwrap().get_coin(&btc()), 5);
        // 3 BTC over is worth 30 and the penalty 45, truncated to 2 whole units
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::Bond { amount: 40, .. })));
    }

    #[test]
    fn test_refunds_after_yggdrasil_drains() {
        let mut keeper = Keeper::new(MemoryStore::new());
        seed_pool(&mut keeper, &btc(), 1_000, 100, 100);
        seed_lp(&mut keeper, &btc(), "op", 60);
        seed_lp(&mut keeper, &btc(), "alice", 40);
        bond_lp(&mut keeper, &btc(), "op", "node", 60);
        bond_lp(&mut keeper, &btc(), "alice", "node", 40);
        let na = seed_node(&mut keeper, "node", "op", &["alice"], NodeStatus::Standby);
        seed_yggdrasil(&mut keeper, &na, &[]);
        begin_retirement(&mut keeper, &asgard("new", 2, &[]), 2).unwrap();

        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        let refunded = process_ragnarok_refunds(&mut keeper, &params(), &mut queue, &mut events, 3).unwrap();
        assert_eq!(refunded, 1);
        assert!(!keeper.vault_exists(&na.pub_key));
        for owner in ["op", "alice"] {
            let lp = keeper.get_liquidity_provider(&btc(), &Address::from(owner)).unwrap();
            assert_eq!(lp.total_bonded_units(), 0);
        }
        let bp = keeper.get_bond_providers(&na.node_address).unwrap();
        assert!(bp.providers.iter().all(|p| !p.bonded));

        // nothing left to do on the next block
        assert_eq!(process_ragnarok_refunds(&mut keeper, &params(), &mut queue, &mut events, 4).unwrap(), 0);
    }

    #[test]
    fn test_active_node_is_not_refunded() {
        let mut keeper = Keeper::new(MemoryStore::new());
        seed_pool(&mut keeper, &btc(), 1_000, 100, 100);
        seed_lp(&mut keeper, &btc(), "op", 100);
        bond_lp(&mut keeper, &btc(), "op", "node", 100);
        let mut na = seed_node(&mut keeper, "node", "op", &[], NodeStatus::Standby);
        let mut ygg = seed_yggdrasil(&mut keeper, &na, &[]);
        ygg.status = VaultStatus::Retiring;
        keeper.set_vault(&ygg).unwrap();
        na.update_status(NodeStatus::Active, 2);
        keeper.set_node_account(&na).unwrap();

        let root = keeper.state_root();
        let mut queue = SlabOutboundQueue::default();
        let mut events = EventLog::new();
        assert_eq!(process_ragnarok_refunds(&mut keeper, &params(), &mut queue, &mut events, 3).unwrap(), 0);
        assert_eq!(keeper.state_root(), root);
        assert!(events.is_empty());
    }

    #[test]
    fn test_failed_refund_is_retried() {
        let mut keeper = Keeper::new(MemoryStore::new());
        seed_pool(&mut keeper, &btc(), 1_000, 100, 100);
        seed_lp(&mut keeper, &btc(), "op", 100);
        bond_lp(&mut keeper, &btc(), "op", "node", 100);
        let mut na = seed_node(&mut keeper, "node", "op", &[], NodeStatus::Standby);
        na.reward = 50;
        keeper.set_node_account(&na).unwrap();
        let mut ygg = seed_yggdrasil(&mut keeper, &na, &[]);
        ygg.status = VaultStatus::Retiring;
        keeper.set_vault(&ygg).unwrap();

        let mut events = EventLog::new();
        let mut full = SlabOutboundQueue::with_capacity(4, 0);
        assert_eq!(process_ragnarok_refunds(&mut keeper, &params(), &mut full, &mut events, 3).unwrap(), 0);
        assert_eq!(keeper.refund_attempts(&na.node_address).unwrap(), 1);

        let mut queue = SlabOutboundQueue::default();
        assert_eq!(process_ragnarok_refunds(&mut keeper, &params(), &mut queue, &mut events, 4).unwrap(), 1);
        assert_eq!(keeper.refund_attempts(&na.node_address).unwrap(), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(keeper.get_node_account(&na.node_address).unwrap().reward, 0);
    }
}
