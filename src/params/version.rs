//! Protocol versions and version-switched lookup.
//!
//! Behavior that changed across protocol upgrades is registered once in a
//! [`VersionTable`] of `(min_version, value)` pairs. Resolution picks the
//! entry with the highest `min_version` not above the active version.
//!
//! ```
//! use liquidity_core::params::{ProtocolVersion, VersionTable};
//!
//! let table = VersionTable::new(vec![
//!     (ProtocolVersion::new(1, 92, 0), "legacy"),
//!     (ProtocolVersion::new(1, 105, 0), "per-asset"),
//! ]);
//! assert_eq!(table.resolve(ProtocolVersion::new(1, 104, 3)), Some(&"legacy"));
//! assert_eq!(table.resolve(ProtocolVersion::new(1, 110, 0)), Some(&"per-asset"));
//! assert_eq!(table.resolve(ProtocolVersion::new(1, 91, 0)), None);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

/// `major.minor.patch` protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl FromStr for ProtocolVersion {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LedgerError::BadVersion(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, LedgerError> {
            parts.next().ok_or_else(bad)?.parse::<u32>().map_err(|_| bad())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(version)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Ordered `(min_version, value)` table
#[derive(Debug, Clone)]
pub struct VersionTable<T> {
    entries: Vec<(ProtocolVersion, T)>,
}

impl<T> VersionTable<T> {
    /// Build a table; entries are sorted by `min_version`
    pub fn new(mut entries: Vec<(ProtocolVersion, T)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    /// Value registered for the newest `min_version <= version`
    pub fn resolve(&self, version: ProtocolVersion) -> Option<&T> {
        self.entries
            .iter()
            .rev()
            .find(|(min, _)| *min <= version)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
