//! Identifiers for STRATA entities.
//!
//! Partitions and nodes are small integers handed out by the cluster
//! topology. Record keys are 64-bit and carry the id of the partition that
//! generated them in their upper bits.

use serde::{Deserialize, Serialize};

/// Partition identifier - one independently replicated log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(i32);

impl PartitionId {
    /// First partition id of every cluster
    pub const FIRST: Self = Self(1);

    /// Create from raw value
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get raw value
    #[must_use]
    pub const fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node identifier - a cluster member addressable by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i32);

impl NodeId {
    /// Create from raw value
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get raw value
    #[must_use]
    pub const fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Record key
///
/// Keys generated by a partition are `partition << 51 | counter`, so the
/// owning partition can be recovered from any key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(i64);

impl Key {
    /// Number of low bits reserved for the per-partition counter
    pub const KEY_BITS: u32 = 51;

    /// Largest counter value that fits below the partition bits
    pub const MAX_COUNTER: i64 = (1_i64 << Self::KEY_BITS) - 1;

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Encode a partition-local counter into a key owned by `partition`
    #[must_use]
    pub const fn encode(partition: PartitionId, counter: i64) -> Self {
        Self(((partition.get() as i64) << Self::KEY_BITS) | (counter & Self::MAX_COUNTER))
    }

    /// Partition that generated this key
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        PartitionId::new((self.0 >> Self::KEY_BITS) as i32)
    }

    /// Partition-local part of the key
    #[must_use]
    pub const fn counter(&self) -> i64 {
        self.0 & Self::MAX_COUNTER
    }

    /// Get raw value
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
