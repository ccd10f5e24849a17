//! Already-parsed ledger messages.
//!
//! The memo parser upstream turns raw inbound transactions into these
//! structs; the ledger only checks them against state.

use crate::types::{Address, Asset, Coin, PubKey, TxId, Vault};

/// Deposit one or both legs of a liquidity position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLiquidityMsg {
    pub tx_id: TxId,
    pub asset: Asset,
    pub settlement_amount: u128,
    pub asset_amount: u128,
    pub settlement_address: Address,
    pub asset_address: Address,
    /// Hold a lone leg as pending until its pair arrives
    pub stage: bool,
    /// Pledge the newly issued units to this node
    pub bond_node: Option<Address>,
}

/// Withdraw part of a position's free units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawLiquidityMsg {
    pub tx_id: TxId,
    pub asset: Asset,
    /// Owner of the position (settlement address, or asset address for
    /// asset-only positions)
    pub address: Address,
    pub basis_points: u128,
    /// Settlement units attached to the request
    pub amount: u128,
}

/// Bond liquidity to a node, add a provider, or change the operator fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondMsg {
    pub tx_id: TxId,
    pub node_address: Address,
    /// Signer
    pub bond_address: Address,
    /// Provider the operator adds to the roster
    pub bond_provider_address: Option<Address>,
    pub operator_fee: Option<u128>,
    /// Yggdrasil key for a newly whitelisted node
    pub pub_key: PubKey,
    pub amount: u128,
}

/// Release bonded liquidity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondMsg {
    pub tx_id: TxId,
    pub node_address: Address,
    /// Signer
    pub bond_address: Address,
    /// Provider the operator unbonds and removes
    pub bond_provider_address: Option<Address>,
    /// Pool to release from; `None` releases from every bondable pool
    pub asset: Option<Asset>,
    /// Units to release; zero releases everything bonded in the pool
    pub units: u128,
    pub amount: u128,
}

/// Operator request for the node to leave the validator set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveMsg {
    pub tx_id: TxId,
    pub node_address: Address,
    pub signer: Address,
}

/// An observed migration payment out of a retiring vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagnarokObservation {
    pub tx_id: TxId,
    pub chain: String,
    pub vault_pub_key: PubKey,
    pub to_address: Address,
    pub coins: Vec<Coin>,
    /// Height carried in the `RAGNAROK:<height>` memo
    pub memo_height: u64,
}

/// A message applied by the block processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerMsg {
    AddLiquidity(AddLiquidityMsg),
    WithdrawLiquidity(WithdrawLiquidityMsg),
    Bond(BondMsg),
    Unbond(UnbondMsg),
    Leave(LeaveMsg),
    Ragnarok(RagnarokObservation),
    /// A new Asgard vault replaces the current set
    Churn(Vault),
}

impl LedgerMsg {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerMsg::AddLiquidity(_) => "add_liquidity",
            LedgerMsg::WithdrawLiquidity(_) => "withdraw",
            LedgerMsg::Bond(_) => "bond",
            LedgerMsg::Unbond(_) => "unbond",
            LedgerMsg::Leave(_) => "leave",
            LedgerMsg::Ragnarok(_) => "ragnarok",
            LedgerMsg::Churn(_) => "churn",
        }
    }

    pub fn tx_id(&self) -> TxId {
        match self {
            LedgerMsg::AddLiquidity(m) => m.tx_id.clone(),
            LedgerMsg::WithdrawLiquidity(m) => m.tx_id.clone(),
            LedgerMsg::Bond(m) => m.tx_id.clone(),
            LedgerMsg::Unbond(m) => m.tx_id.clone(),
            LedgerMsg::Leave(m) => m.tx_id.clone(),
            LedgerMsg::Ragnarok(m) => m.tx_id.clone(),
            LedgerMsg::Churn(_) => TxId::blank(),
        }
    }

    /// Funds that came in with the message and where to send them back
    pub fn refundable(&self) -> Vec<(Address, Coin)> {
        let settlement = |to: &Address, amount: u128| (to.clone(), Coin::new(Asset::settlement(), amount));
        let refunds = match self {
            LedgerMsg::AddLiquidity(m) => {
                let asset_to = if m.asset_address.is_empty() {
                    &m.settlement_address
                } else {
                    &m.asset_address
                };
                vec![
                    settlement(&m.settlement_address, m.settlement_amount),
                    (asset_to.clone(), Coin::new(m.asset.clone(), m.asset_amount)),
                ]
            }
            LedgerMsg::WithdrawLiquidity(m) => vec![settlement(&m.address, m.amount)],
            LedgerMsg::Bond(m) => vec![settlement(&m.bond_address, m.amount)],
            LedgerMsg::Unbond(m) => vec![settlement(&m.bond_address, m.amount)],
            LedgerMsg::Leave(_) | LedgerMsg::Ragnarok(_) | LedgerMsg::Churn(_) => Vec::new(),
        };
        refunds
            .into_iter()
            .filter(|(to, coin)| !to.is_empty() && !coin.is_empty())
            .collect()
    }
}
