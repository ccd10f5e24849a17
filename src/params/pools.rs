//! Bondable ("liquidity") pools by protocol version.

use crate::params::version::{ProtocolVersion, VersionTable};
use crate::types::Asset;

const POOLS_V104: [(&str, &str); 5] = [
    ("BTC", "BTC"),
    ("ETH", "ETH"),
    ("DASH", "DASH"),
    ("KUJI", "KUJI"),
    ("THOR", "RUNE"),
];

const POOLS_V105_ADDED: [(&str, &str); 2] = [
    ("ARB", "ETH"),
    ("ETH", "USDT-0XDAC17F958D2EE523A2206206994597C13D831EC7"),
];

fn layer1(chain: &str, symbol: &str) -> Asset {
    Asset {
        chain: chain.to_string(),
        symbol: symbol.to_string(),
        ticker: symbol.split('-').next().unwrap_or(symbol).to_string(),
        synth: false,
    }
}

pub fn liquidity_pools_v104() -> Vec<Asset> {
    POOLS_V104.iter().map(|(c, s)| layer1(c, s)).collect()
}

pub fn liquidity_pools_v105() -> Vec<Asset> {
    let mut pools = liquidity_pools_v104();
    pools.extend(POOLS_V105_ADDED.iter().map(|(c, s)| layer1(c, s)));
    pools
}

/// Bondable pool lists by protocol version
pub fn liquidity_pool_tables() -> VersionTable<Vec<Asset>> {
    VersionTable::new(vec![
        (ProtocolVersion::new(0, 1, 0), liquidity_pools_v104()),
        (ProtocolVersion::new(1, 105, 0), liquidity_pools_v105()),
    ])
}
