//! Partition leader and checkpoint bookkeeping.
//!
//! Both structures are plain single-owner values: the partition actor owns
//! them and applies topology and checkpoint notifications one at a time.
//! Updates are last-write-wins and no history is kept.

use indexmap::IndexMap;
use strata_core::{NodeId, PartitionId};
use strata_log::{CheckpointId, CheckpointType};

/// Current leader of every known partition
#[derive(Debug, Clone, Default)]
pub struct PartitionLeaderDirectory {
    leaders: IndexMap<PartitionId, NodeId>,
}

impl PartitionLeaderDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` as leader of `partition`, or forget the leader on `None`
    pub fn set_current_leader(&mut self, partition: PartitionId, node: Option<NodeId>) {
        match node {
            Some(node) => {
                self.leaders.insert(partition, node);
            }
            None => {
                self.leaders.shift_remove(&partition);
            }
        }
    }

    /// Current leader of `partition`
    #[must_use]
    pub fn leader(&self, partition: PartitionId) -> Option<NodeId> {
        self.leaders.get(&partition).copied()
    }

    /// Number of partitions with a known leader
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaders.len()
    }

    /// Whether no leader is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty()
    }

    /// Known leaders in the order they were first recorded
    pub fn iter(&self) -> impl Iterator<Item = (PartitionId, NodeId)> + '_ {
        self.leaders.iter().map(|(p, n)| (*p, *n))
    }
}

/// Latest checkpoint of the local partition
///
/// Outgoing messages are stamped with it so the receiver can write the
/// checkpoint before the command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointTracker {
    checkpoint_id: CheckpointId,
    checkpoint_type: CheckpointType,
}

impl CheckpointTracker {
    /// Tracker with no checkpoint yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly created checkpoint
    pub fn set_checkpoint_info(&mut self, checkpoint_id: CheckpointId, checkpoint_type: CheckpointType) {
        self.checkpoint_id = checkpoint_id;
        self.checkpoint_type = checkpoint_type;
    }

    /// Latest checkpoint id
    #[must_use]
    pub const fn checkpoint_id(&self) -> CheckpointId {
        self.checkpoint_id
    }

    /// Type of the latest checkpoint
    #[must_use]
    pub const fn checkpoint_type(&self) -> CheckpointType {
        self.checkpoint_type
    }
}
