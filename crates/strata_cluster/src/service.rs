//! Wiring of the inter-partition sender and receiver to cluster events.

use crate::receiver::{InterPartitionCommandReceiver, ReceiveError, ReceiveOutcome};
use crate::sender::{InterPartitionCommandSender, topic_for};
use crate::transport::{ClusterCommunicationTransport, MessageHandler};
use bytes::Bytes;
use std::sync::Arc;
use strata_core::{Key, NodeId, PartitionId};
use strata_log::{CheckpointId, CheckpointType, Intent, LogStreamWriter, ValueType};
use strata_runtime::{DiskSpaceEvent, DiskSpaceUsageListener};

/// Inter-partition messaging of one partition
///
/// Applies topology, checkpoint and disk space notifications to the sender
/// and receiver it owns, and keeps the receiver subscribed while the
/// partition leads.
pub struct InterPartitionCommandService<W> {
    partition_id: PartitionId,
    transport: Arc<dyn ClusterCommunicationTransport>,
    sender: InterPartitionCommandSender,
    receiver: InterPartitionCommandReceiver<W>,
    subscribed: bool,
}

impl<W: LogStreamWriter> InterPartitionCommandService<W> {
    /// Create the service of `partition_id`, writing received commands
    /// through `writer`
    #[must_use]
    pub fn new(
        partition_id: PartitionId,
        transport: Arc<dyn ClusterCommunicationTransport>,
        writer: W,
    ) -> Self {
        Self {
            partition_id,
            sender: InterPartitionCommandSender::new(Arc::clone(&transport)),
            receiver: InterPartitionCommandReceiver::new(partition_id, writer),
            transport,
            subscribed: false,
        }
    }

    /// Topology changed: `leader` now leads `partition`
    pub fn on_partition_leader_updated(&mut self, partition: PartitionId, leader: Option<NodeId>) {
        tracing::debug!(
            partition = %self.partition_id,
            updated_partition = %partition,
            leader = ?leader,
            "Partition leader updated"
        );
        self.sender.set_current_leader(partition, leader);
    }

    /// The local partition created a checkpoint
    pub fn on_new_checkpoint_created(
        &mut self,
        checkpoint_id: CheckpointId,
        checkpoint_type: CheckpointType,
    ) {
        self.sender.set_checkpoint_info(checkpoint_id, checkpoint_type);
        self.receiver.set_checkpoint_id(checkpoint_id);
    }

    /// Disk space crossed the threshold
    pub fn on_disk_space_event(&mut self, event: DiskSpaceEvent) {
        self.receiver.on_disk_space_event(event);
    }

    /// Start receiving: subscribe `handler` to this partition's topic
    pub fn on_became_leader(&mut self, handler: MessageHandler) {
        self.transport.subscribe(&topic_for(self.partition_id), handler);
        self.subscribed = true;
        tracing::debug!(partition = %self.partition_id, "Subscribed to inter-partition commands");
    }

    /// Stop receiving
    pub fn on_became_follower(&mut self) {
        if !self.subscribed {
            return;
        }
        self.transport.unsubscribe(&topic_for(self.partition_id));
        self.subscribed = false;
        tracing::debug!(partition = %self.partition_id, "Unsubscribed from inter-partition commands");
    }

    /// Send a command to another partition
    pub fn send_command(
        &self,
        receiver: PartitionId,
        value_type: ValueType,
        intent: Intent,
        record_key: Option<Key>,
        command: Bytes,
        auth_info: Option<Bytes>,
    ) {
        self.sender
            .send_command(receiver, value_type, intent, record_key, command, auth_info);
    }

    /// Handle a message received on this partition's topic
    ///
    /// # Errors
    ///
    /// Returns error if the message violates the protocol
    pub fn handle_message(
        &mut self,
        sender: NodeId,
        message: &Bytes,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        self.receiver.handle_message(sender, message)
    }

    /// Whether the receiver is subscribed
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Outgoing side
    #[must_use]
    pub const fn sender(&self) -> &InterPartitionCommandSender {
        &self.sender
    }

    /// Incoming side
    #[must_use]
    pub const fn receiver(&self) -> &InterPartitionCommandReceiver<W> {
        &self.receiver
    }
}

impl<W> std::fmt::Debug for InterPartitionCommandService<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterPartitionCommandService")
            .field("partition_id", &self.partition_id)
            .field("subscribed", &self.subscribed)
            .finish_non_exhaustive()
    }
}
