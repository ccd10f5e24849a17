//! Asset identifiers and coin amounts.
//!
//! ## Notation
//!
//! - `CHAIN.SYMBOL` is a layer-1 asset, e.g. `BTC.BTC`, `ETH.USDT-0XDAC17F`
//! - `CHAIN/SYMBOL` is the synthetic (vault) twin of that asset
//! - a bare `SYMBOL` lives on the settlement chain
//!
//! The ticker is the symbol up to the first `-`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;
use crate::types::amount::from_base_units_trimmed;

/// Chain the settlement asset lives on
pub const SETTLEMENT_CHAIN: &str = "MAYA";

/// Symbol of the settlement asset
pub const SETTLEMENT_SYMBOL: &str = "CACAO";

/// Asset identifier: chain + symbol + ticker + synthetic flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Asset {
    pub chain: String,
    pub symbol: String,
    pub ticker: String,
    pub synth: bool,
}

impl Asset {
    /// The native settlement asset every pool is paired against
    pub fn settlement() -> Self {
        Self {
            chain: SETTLEMENT_CHAIN.to_string(),
            symbol: SETTLEMENT_SYMBOL.to_string(),
            ticker: SETTLEMENT_SYMBOL.to_string(),
            synth: false,
        }
    }

    /// Whether this is the settlement asset
    pub fn is_settlement(&self) -> bool {
        *self == Self::settlement()
    }

    /// Vault (synthetic) pools track only the asset side
    pub fn is_vault_asset(&self) -> bool {
        self.synth
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty() || self.symbol.is_empty()
    }

    /// Chain the asset is custodied on; synthetics live on the settlement chain
    pub fn custody_chain(&self) -> &str {
        if self.synth {
            SETTLEMENT_CHAIN
        } else {
            &self.chain
        }
    }

    /// Layer-1 twin of a synthetic asset (identity for layer-1 assets)
    pub fn layer1(&self) -> Self {
        Self {
            synth: false,
            ..self.clone()
        }
    }

    /// Synthetic twin of a layer-1 asset (identity for synthetics)
    pub fn synthetic(&self) -> Self {
        Self {
            synth: true,
            ..self.clone()
        }
    }

    /// Gas asset of this asset's chain (`CHAIN.CHAIN`)
    pub fn gas_asset(&self) -> Self {
        let chain = self.custody_chain().to_string();
        Self {
            symbol: chain.clone(),
            ticker: chain.clone(),
            chain,
            synth: false,
        }
    }
}

impl FromStr for Asset {
    type Err = LedgerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim().to_uppercase();
        let (chain, symbol, synth) = if let Some((chain, symbol)) = input.split_once('/') {
            (chain.to_string(), symbol.to_string(), true)
        } else if let Some((chain, symbol)) = input.split_once('.') {
            (chain.to_string(), symbol.to_string(), false)
        } else {
            (SETTLEMENT_CHAIN.to_string(), input.clone(), false)
        };

        let valid_chain = !chain.is_empty() && chain.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid_chain || symbol.is_empty() {
            return Err(LedgerError::Validation(format!("invalid asset: {input}")));
        }
        let ticker = symbol.split('-').next().unwrap_or_default().to_string();
        if ticker.is_empty() {
            return Err(LedgerError::Validation(format!("invalid ticker in asset: {input}")));
        }

        Ok(Self {
            chain,
            symbol,
            ticker,
            synth,
        })
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.synth { '/' } else { '.' };
        write!(f, "{}{}{}", self.chain, sep, self.symbol)
    }
}

/// An amount of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coin {
    pub asset: Asset,
    pub amount: u128,
}

impl Coin {
    pub fn new(asset: Asset, amount: u128) -> Self {
        Self { asset, amount }
    }

    pub fn is_empty(&self) -> bool {
        self.asset.is_empty() || self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", from_base_units_trimmed(self.amount), self.asset)
    }
}
