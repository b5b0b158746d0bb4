//! Sending commands to other partitions.

use crate::codec::{InterPartitionMessage, RECORD_KEY_NULL};
use crate::directory::{CheckpointTracker, PartitionLeaderDirectory};
use crate::transport::ClusterCommunicationTransport;
use bytes::Bytes;
use std::sync::Arc;
use strata_core::{Key, NodeId, PartitionId};
use strata_log::{CheckpointId, CheckpointType, CommandValue, Intent, ValueType};

/// Topic the receiver of `partition` subscribes to
#[must_use]
pub fn topic_for(partition: PartitionId) -> String {
    format!("inter-partition-{}", partition.get())
}

/// Best-effort delivery of commands to the leaders of other partitions
///
/// Nothing is acknowledged or retried. Callers that need the command to
/// arrive must be able to derive it again from their own durable state.
pub struct InterPartitionCommandSender {
    transport: Arc<dyn ClusterCommunicationTransport>,
    leaders: PartitionLeaderDirectory,
    checkpoint: CheckpointTracker,
}

impl InterPartitionCommandSender {
    /// Create a sender with no known leaders and no checkpoint
    #[must_use]
    pub fn new(transport: Arc<dyn ClusterCommunicationTransport>) -> Self {
        Self {
            transport,
            leaders: PartitionLeaderDirectory::new(),
            checkpoint: CheckpointTracker::new(),
        }
    }

    /// Send a command to the current leader of `receiver`
    ///
    /// Dropped with a trace log when `receiver` has no known leader, and with
    /// a warning when `intent` does not belong to `value_type` or the key
    /// cannot be told apart from an absent key on the wire.
    pub fn send_command(
        &self,
        receiver: PartitionId,
        value_type: ValueType,
        intent: Intent,
        record_key: Option<Key>,
        command: Bytes,
        auth_info: Option<Bytes>,
    ) {
        let Some(leader) = self.leaders.leader(receiver) else {
            tracing::trace!(
                receiver = %receiver,
                intent = %intent,
                "No known leader for partition, dropping command"
            );
            return;
        };

        if intent.value_type() != value_type {
            tracing::warn!(
                receiver = %receiver,
                value_type = %value_type,
                intent = %intent,
                "Intent does not belong to value type, dropping command"
            );
            return;
        }

        if record_key.is_some_and(|key| key.get() == RECORD_KEY_NULL) {
            tracing::warn!(
                receiver = %receiver,
                intent = %intent,
                "Record key collides with the null key on the wire, dropping command"
            );
            return;
        }

        let message = InterPartitionMessage {
            checkpoint_id: self.checkpoint.checkpoint_id(),
            checkpoint_type: self.checkpoint.checkpoint_type(),
            receiver_partition_id: receiver,
            intent,
            record_key,
            command: CommandValue::view(value_type, command),
            auth_info: auth_info.filter(|auth| !auth.is_empty()),
        };

        tracing::trace!(
            receiver = %receiver,
            leader = %leader,
            checkpoint_id = %message.checkpoint_id,
            intent = %intent,
            "Sending inter-partition command"
        );
        self.transport
            .unicast(&topic_for(receiver), message.encode(), leader, true);
    }

    /// Record the current leader of `partition`
    pub fn set_current_leader(&mut self, partition: PartitionId, node: Option<NodeId>) {
        self.leaders.set_current_leader(partition, node);
    }

    /// Record the latest local checkpoint
    pub fn set_checkpoint_info(&mut self, checkpoint_id: CheckpointId, checkpoint_type: CheckpointType) {
        self.checkpoint.set_checkpoint_info(checkpoint_id, checkpoint_type);
    }

    /// Known partition leaders
    #[must_use]
    pub const fn leaders(&self) -> &PartitionLeaderDirectory {
        &self.leaders
    }

    /// Checkpoint outgoing messages are stamped with
    #[must_use]
    pub const fn checkpoint(&self) -> &CheckpointTracker {
        &self.checkpoint
    }
}

impl std::fmt::Debug for InterPartitionCommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterPartitionCommandSender")
            .field("local_member", &self.transport.local_member())
            .field("leaders", &self.leaders)
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}
