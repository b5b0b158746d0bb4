//! Applying commands received from other partitions.
//!
//! A received command may depend on a checkpoint the local log has not seen
//! yet. In that case a `CHECKPOINT CREATE` record is written first and the
//! command only follows if that write succeeded, so the log never holds a
//! command ahead of the checkpoint it was sent under.

use crate::codec::{DecodeError, InterPartitionMessage};
use bytes::Bytes;
use strata_core::{NodeId, PartitionId};
use strata_log::{
    CheckpointId, CheckpointIntent, CheckpointRecord, Intent, LogAppendEntry, LogStreamWriter,
    Position, RecordMetadata, WriteContext,
};
use strata_runtime::DiskSpaceUsageListener;

/// Unrecoverable receive errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// Sender speaks a protocol this node cannot read
    #[error("Protocol violation in message from {sender}: {source}")]
    Protocol {
        /// Member that sent the message
        sender: NodeId,
        /// What could not be read
        #[source]
        source: DecodeError,
    },
}

/// What became of a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Command written; `checkpoint` tells whether a checkpoint preceded it
    Written {
        /// Position of the command
        position: Position,
        /// Whether a checkpoint record was written first
        checkpoint: bool,
    },
    /// Disk space is low; nothing was decoded or written
    RejectedNoDiskSpace,
    /// Message was corrupt and dropped
    DroppedCorrupt,
    /// Checkpoint write failed; the command was not written
    CheckpointFailed,
    /// Command write failed; a checkpoint written before it stays
    CommandFailed {
        /// Whether a checkpoint record was written first
        checkpoint: bool,
    },
}

/// Writes commands from other partitions into the local log
pub struct InterPartitionCommandReceiver<W> {
    partition_id: PartitionId,
    writer: W,
    checkpoint_id: CheckpointId,
    disk_space_available: bool,
}

impl<W: LogStreamWriter> InterPartitionCommandReceiver<W> {
    /// Create a receiver for `partition_id` with no checkpoint and disk space
    /// available
    #[must_use]
    pub fn new(partition_id: PartitionId, writer: W) -> Self {
        Self {
            partition_id,
            writer,
            checkpoint_id: CheckpointId::NONE,
            disk_space_available: true,
        }
    }

    /// Handle a message from `sender`
    ///
    /// Failures are logged and the message is dropped; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiveError::Protocol`] if the message uses a value type,
    /// intent or checkpoint type this node does not know
    pub fn handle_message(
        &mut self,
        sender: NodeId,
        message: &Bytes,
    ) -> Result<ReceiveOutcome, ReceiveError> {
        if !self.disk_space_available {
            tracing::debug!(
                partition = %self.partition_id,
                sender = %sender,
                "Ignoring inter-partition command, disk space not available"
            );
            return Ok(ReceiveOutcome::RejectedNoDiskSpace);
        }

        let message = match InterPartitionMessage::decode(message) {
            Ok(message) => message,
            Err(e) if e.is_protocol_violation() => {
                tracing::error!(
                    partition = %self.partition_id,
                    sender = %sender,
                    error = %e,
                    "Received inter-partition command this node cannot read"
                );
                return Err(ReceiveError::Protocol { sender, source: e });
            }
            Err(e) => {
                tracing::warn!(
                    partition = %self.partition_id,
                    sender = %sender,
                    error = %e,
                    "Dropping corrupt inter-partition command"
                );
                return Ok(ReceiveOutcome::DroppedCorrupt);
            }
        };

        let checkpoint = message.checkpoint_id > self.checkpoint_id;
        if checkpoint && !self.write_checkpoint(&message) {
            return Ok(ReceiveOutcome::CheckpointFailed);
        }

        let metadata = message.metadata();
        let entry = LogAppendEntry {
            key: message.record_key,
            metadata,
            value: message.command.into_bytes(),
        };
        match self.writer.try_write(WriteContext::InterPartition, entry) {
            Ok(position) => {
                tracing::trace!(
                    partition = %self.partition_id,
                    sender = %sender,
                    intent = %metadata.intent,
                    position = %position,
                    "Wrote inter-partition command"
                );
                Ok(ReceiveOutcome::Written {
                    position,
                    checkpoint,
                })
            }
            Err(e) => {
                tracing::warn!(
                    partition = %self.partition_id,
                    sender = %sender,
                    intent = %metadata.intent,
                    error = %e,
                    "Failed to write inter-partition command"
                );
                Ok(ReceiveOutcome::CommandFailed { checkpoint })
            }
        }
    }

    fn write_checkpoint(&mut self, message: &InterPartitionMessage) -> bool {
        let record = CheckpointRecord::new(message.checkpoint_id, message.checkpoint_type);
        let entry = LogAppendEntry::without_key(
            RecordMetadata::command(Intent::Checkpoint(CheckpointIntent::Create)),
            record.to_bytes(),
        );
        match self.writer.try_write(WriteContext::InterPartition, entry) {
            Ok(_) => {
                tracing::debug!(
                    partition = %self.partition_id,
                    checkpoint_id = %message.checkpoint_id,
                    previous_checkpoint_id = %self.checkpoint_id,
                    "Wrote checkpoint ahead of inter-partition command"
                );
                self.checkpoint_id = message.checkpoint_id;
                true
            }
            Err(e) => {
                tracing::warn!(
                    partition = %self.partition_id,
                    checkpoint_id = %message.checkpoint_id,
                    current_checkpoint_id = %self.checkpoint_id,
                    error = %e,
                    "Failed to write checkpoint, dropping inter-partition command"
                );
                false
            }
        }
    }

    /// Record a checkpoint created by the local partition
    ///
    /// The local id never moves backwards; a notification older than a
    /// checkpoint this receiver already wrote is ignored.
    pub fn set_checkpoint_id(&mut self, checkpoint_id: CheckpointId) {
        self.checkpoint_id = self.checkpoint_id.max(checkpoint_id);
    }

    /// Latest checkpoint known to be in the local log
    #[must_use]
    pub const fn checkpoint_id(&self) -> CheckpointId {
        self.checkpoint_id
    }

    /// Set whether commands are accepted
    pub fn set_disk_space_available(&mut self, available: bool) {
        self.disk_space_available = available;
    }

    /// Whether commands are accepted
    #[must_use]
    pub const fn is_disk_space_available(&self) -> bool {
        self.disk_space_available
    }

    /// Partition this receiver writes to
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }
}

impl<W: LogStreamWriter> DiskSpaceUsageListener for InterPartitionCommandReceiver<W> {
    fn on_disk_space_not_available(&mut self) {
        self.set_disk_space_available(false);
    }

    fn on_disk_space_available(&mut self) {
        self.set_disk_space_available(true);
    }
}

impl<W> std::fmt::Debug for InterPartitionCommandReceiver<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterPartitionCommandReceiver")
            .field("partition_id", &self.partition_id)
            .field("checkpoint_id", &self.checkpoint_id)
            .field("disk_space_available", &self.disk_space_available)
            .finish_non_exhaustive()
    }
}
