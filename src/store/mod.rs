//! Keyed persistence.
//!
//! ## Architecture
//!
//! - [`Store`]: byte-keyed get/set/delete plus ordered prefix scans. This is
//!   the only contract the ledger needs from the host chain's database.
//! - [`MemoryStore`]: `BTreeMap` implementation. Iteration is in key order,
//!   so state roots are deterministic.
//! - [`Keeper`]: typed access to ledger records on top of any `Store`.
//!
//! ## Example
//!
//! ```
//! use liquidity_core::store::{Keeper, MemoryStore};
//! use liquidity_core::types::Pool;
//!
//! let mut keeper = Keeper::new(MemoryStore::new());
//! let pool = Pool::new("BTC.BTC".parse().unwrap());
//! keeper.set_pool(&pool).unwrap();
//! assert_eq!(keeper.get_pool(&pool.asset).unwrap(), pool);
//! ```

use std::collections::BTreeMap;

pub mod keeper;

pub use keeper::Keeper;

/// Byte-keyed storage backend
pub trait Store {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// All pairs whose key starts with `prefix`, in key order
    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// In-memory store backed by a `BTreeMap`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.data.insert(key.to_vec(), value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
