//! Version-pinned protocol constants.

use std::collections::BTreeMap;
use std::fmt;

use crate::params::version::{ProtocolVersion, VersionTable};

/// Names of the integer constants the ledger reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstantName {
    /// Basis points of a vault shortfall charged to the node's bond
    SlashPenalty,
    /// Reserve must exceed stolen value times this to subsidize pools
    SubsidizeReserveMultiplier,
    MaxBondProviders,
    /// Default operator fee (basis points) for a new roster
    NodeOperatorFee,
    /// Non-zero pauses bonding
    PauseBond,
    /// Non-zero pauses unbonding
    PauseUnbond,
    /// Per-node bond ceiling in settlement units; zero disables it
    MaximumBondInCacao,
    /// Blocks between migration batches out of a retiring vault
    FundMigrationInterval,
    MaxRagnarokAttempts,
    MaxOutboundItemsPerBlock,
}

impl ConstantName {
    pub const ALL: [ConstantName; 10] = [
        ConstantName::SlashPenalty,
        ConstantName::SubsidizeReserveMultiplier,
        ConstantName::MaxBondProviders,
        ConstantName::NodeOperatorFee,
        ConstantName::PauseBond,
        ConstantName::PauseUnbond,
        ConstantName::MaximumBondInCacao,
        ConstantName::FundMigrationInterval,
        ConstantName::MaxRagnarokAttempts,
        ConstantName::MaxOutboundItemsPerBlock,
    ];

    /// Governance key for this constant
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstantName::SlashPenalty => "SlashPenalty",
            ConstantName::SubsidizeReserveMultiplier => "SubsidizeReserveMultiplier",
            ConstantName::MaxBondProviders => "MaxBondProviders",
            ConstantName::NodeOperatorFee => "NodeOperatorFee",
            ConstantName::PauseBond => "PauseBond",
            ConstantName::PauseUnbond => "PauseUnbond",
            ConstantName::MaximumBondInCacao => "MaximumBondInCacao",
            ConstantName::FundMigrationInterval => "FundMigrationInterval",
            ConstantName::MaxRagnarokAttempts => "MaxRagnarokAttempts",
            ConstantName::MaxOutboundItemsPerBlock => "MaxOutboundItemsPerBlock",
        }
    }
}

impl fmt::Display for ConstantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constant values for one protocol version band
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstantTable {
    values: BTreeMap<ConstantName, i64>,
}

impl ConstantTable {
    pub fn with(mut self, name: ConstantName, value: i64) -> Self {
        self.values.insert(name, value);
        self
    }

    /// Value of `name`; unset constants read as zero
    pub fn get(&self, name: ConstantName) -> i64 {
        self.values.get(&name).copied().unwrap_or(0)
    }
}

/// Constants from the first protocol release
pub fn constants_v010() -> ConstantTable {
    ConstantTable::default()
        .with(ConstantName::SlashPenalty, 15_000)
        .with(ConstantName::SubsidizeReserveMultiplier, 5)
        .with(ConstantName::MaxBondProviders, 6)
        .with(ConstantName::NodeOperatorFee, 500)
        .with(ConstantName::PauseBond, 0)
        .with(ConstantName::PauseUnbond, 0)
        .with(ConstantName::MaximumBondInCacao, 0)
        .with(ConstantName::FundMigrationInterval, 360)
        .with(ConstantName::MaxRagnarokAttempts, 5)
        .with(ConstantName::MaxOutboundItemsPerBlock, 100)
}

/// Constants from 1.102.0: more ragnarok retries
pub fn constants_v102() -> ConstantTable {
    constants_v010().with(ConstantName::MaxRagnarokAttempts, 10)
}

/// Constant tables by protocol version
pub fn constant_tables() -> VersionTable<ConstantTable> {
    VersionTable::new(vec![
        (ProtocolVersion::new(0, 1, 0), constants_v010()),
        (ProtocolVersion::new(1, 102, 0), constants_v102()),
    ])
}
