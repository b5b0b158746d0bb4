//! Partition actor.
//!
//! Every partition runs one tokio task that owns its stream processor and
//! inter-partition service. Everything else talks to it through a
//! [`PartitionHandle`]; messages are applied one at a time, so the leader
//! directory, checkpoint state and due-date checkers are never shared.

use crate::receiver::ReceiveError;
use crate::service::InterPartitionCommandService;
use crate::transport::{ClusterCommunicationTransport, MessageHandler};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Key, NodeId, PartitionId, SharedClock};
use strata_log::{CheckpointId, CheckpointType, Intent, LogStreamWriter, ValueType};
use strata_runtime::{
    DiskSpaceConfig, DiskSpaceMonitor, DueDateKind, DueEntryIndex, DueIndexes, ProcessorConfig,
    ProcessorPhase, StreamProcessor,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Partition actor errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// Actor has stopped
    #[error("Partition {0} is closed")]
    Closed(PartitionId),

    /// A peer sent a message this node cannot read
    #[error(transparent)]
    Protocol(#[from] ReceiveError),
}

/// Replication role of the local replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    /// Leads the partition: processes, schedules and receives commands
    Leader,
    /// Follows the leader; processing is paused
    Follower,
    /// Not participating
    Inactive,
}

/// Snapshot of a partition actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatus {
    /// Partition the actor runs
    pub partition_id: PartitionId,
    /// Current role
    pub role: PartitionRole,
    /// Lifecycle phase of the stream processor
    pub phase: ProcessorPhase,
    /// Latest checkpoint known to be in the local log
    pub checkpoint_id: CheckpointId,
    /// Partitions with a known leader
    pub known_leaders: usize,
    /// Whether inter-partition commands are accepted
    pub disk_space_available: bool,
    /// Whether the receiver listens on its topic
    pub subscribed: bool,
    /// Earliest pending due-date run, in epoch millis
    pub next_wakeup: Option<i64>,
}

/// Command for another partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCommand {
    /// Target partition
    pub receiver: PartitionId,
    /// Value type of the command
    pub value_type: ValueType,
    /// Command intent
    pub intent: Intent,
    /// Key to preserve on the receiving side
    pub record_key: Option<Key>,
    /// Encoded command value
    pub command: Bytes,
    /// Authorization to forward
    pub auth_info: Option<Bytes>,
}

impl OutgoingCommand {
    /// Command of `intent` for `receiver`, without key or auth info
    #[must_use]
    pub const fn new(receiver: PartitionId, intent: Intent, command: Bytes) -> Self {
        Self {
            receiver,
            value_type: intent.value_type(),
            intent,
            record_key: None,
            command,
            auth_info: None,
        }
    }

    /// Set record key
    #[must_use]
    pub const fn with_record_key(mut self, key: Key) -> Self {
        self.record_key = Some(key);
        self
    }

    /// Set auth info
    #[must_use]
    pub fn with_auth_info(mut self, auth_info: Bytes) -> Self {
        self.auth_info = Some(auth_info);
        self
    }
}

#[derive(Debug)]
enum PartitionMessage {
    SendCommand(OutgoingCommand),
    Inbound {
        sender: NodeId,
        payload: Bytes,
    },
    LeaderUpdated {
        partition: PartitionId,
        leader: Option<NodeId>,
    },
    CheckpointCreated {
        checkpoint_id: CheckpointId,
        checkpoint_type: CheckpointType,
    },
    DiskSpace {
        free_bytes: u64,
    },
    RoleChanged(PartitionRole),
    ScheduleDueDate {
        kind: DueDateKind,
        due_date: i64,
    },
    Status(oneshot::Sender<PartitionStatus>),
    Shutdown,
}

/// Handle to a running partition actor
#[derive(Debug, Clone)]
pub struct PartitionHandle {
    partition_id: PartitionId,
    tx: mpsc::UnboundedSender<PartitionMessage>,
}

impl PartitionHandle {
    fn submit(&self, message: PartitionMessage) -> Result<(), PartitionError> {
        self.tx
            .send(message)
            .map_err(|_| PartitionError::Closed(self.partition_id))
    }

    /// Partition this handle addresses
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Send a command to another partition, best effort
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn send_command(&self, command: OutgoingCommand) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::SendCommand(command))
    }

    /// Topology changed: `leader` now leads `partition`
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn partition_leader_updated(
        &self,
        partition: PartitionId,
        leader: Option<NodeId>,
    ) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::LeaderUpdated { partition, leader })
    }

    /// The partition created a checkpoint
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn checkpoint_created(
        &self,
        checkpoint_id: CheckpointId,
        checkpoint_type: CheckpointType,
    ) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::CheckpointCreated {
            checkpoint_id,
            checkpoint_type,
        })
    }

    /// Report the free bytes of the data disk
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn disk_space_changed(&self, free_bytes: u64) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::DiskSpace { free_bytes })
    }

    /// The local replica changed role
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn role_changed(&self, role: PartitionRole) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::RoleChanged(role))
    }

    /// An entry of `kind` becomes due at `due_date`
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub fn schedule_due_date(&self, kind: DueDateKind, due_date: i64) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::ScheduleDueDate { kind, due_date })
    }

    /// Current status of the actor
    ///
    /// # Errors
    ///
    /// Returns error if the actor has stopped
    pub async fn status(&self) -> Result<PartitionStatus, PartitionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(PartitionMessage::Status(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| PartitionError::Closed(self.partition_id))
    }

    /// Ask the actor to stop after the messages already queued
    ///
    /// # Errors
    ///
    /// Returns error if the actor has already stopped
    pub fn shutdown(&self) -> Result<(), PartitionError> {
        self.submit(PartitionMessage::Shutdown)
    }
}

/// Single-owner executor of one partition
pub struct PartitionActor<W, I> {
    partition_id: PartitionId,
    clock: SharedClock,
    role: PartitionRole,
    processor: StreamProcessor<W, I>,
    service: InterPartitionCommandService<W>,
    disk: DiskSpaceMonitor,
    inbox: mpsc::UnboundedReceiver<PartitionMessage>,
    /// Weak so that transport subscriptions do not keep the actor alive
    inbound: mpsc::WeakUnboundedSender<PartitionMessage>,
}

impl<W, I> PartitionActor<W, I>
where
    W: LogStreamWriter + Clone + 'static,
    I: DueEntryIndex + 'static,
{
    /// Create the actor of `partition_id` and a handle to it
    ///
    /// The actor starts inactive; it leads once told so with
    /// [`PartitionHandle::role_changed`].
    #[must_use]
    pub fn new(
        partition_id: PartitionId,
        transport: Arc<dyn ClusterCommunicationTransport>,
        writer: W,
        indexes: DueIndexes<I>,
        clock: SharedClock,
        processor: ProcessorConfig,
        disk: DiskSpaceConfig,
    ) -> (Self, PartitionHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let actor = Self {
            partition_id,
            role: PartitionRole::Inactive,
            processor: StreamProcessor::new(
                partition_id,
                writer.clone(),
                Arc::clone(&clock),
                indexes,
                processor,
            ),
            service: InterPartitionCommandService::new(partition_id, transport, writer),
            disk: DiskSpaceMonitor::new(disk),
            clock,
            inbox,
            inbound: tx.downgrade(),
        };
        let handle = PartitionHandle { partition_id, tx };
        (actor, handle)
    }

    /// Run the actor on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<Result<(), PartitionError>>
    where
        W: Send,
        I: Send,
    {
        tokio::spawn(self.run())
    }

    /// Process messages and due timers until shut down
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::Protocol`] if a peer sent a message this
    /// node cannot read; the processor is failed first
    pub async fn run(mut self) -> Result<(), PartitionError> {
        tracing::info!(partition = %self.partition_id, "Partition actor started");
        let result = loop {
            let wakeup = self.processor.next_wakeup();
            let delay = wakeup.map_or(Duration::ZERO, |due| {
                let millis = due.saturating_sub(self.clock.millis()).max(0);
                Duration::from_millis(u64::try_from(millis).unwrap_or(0))
            });

            tokio::select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        break Ok(());
                    };
                    match self.handle(message) {
                        Ok(true) => {}
                        Ok(false) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
                () = tokio::time::sleep(delay), if wakeup.is_some() => {
                    self.processor.run_due_tasks();
                }
            }
        };

        match &result {
            Ok(()) => {
                self.processor.on_close();
                tracing::info!(partition = %self.partition_id, "Partition actor stopped");
            }
            Err(e) => {
                self.processor.on_failed();
                tracing::error!(partition = %self.partition_id, error = %e, "Partition actor failed");
            }
        }
        self.service.on_became_follower();
        result
    }

    /// Apply one message; `Ok(false)` stops the actor
    fn handle(&mut self, message: PartitionMessage) -> Result<bool, PartitionError> {
        match message {
            PartitionMessage::SendCommand(command) => {
                self.service.send_command(
                    command.receiver,
                    command.value_type,
                    command.intent,
                    command.record_key,
                    command.command,
                    command.auth_info,
                );
            }
            PartitionMessage::Inbound { sender, payload } => {
                self.service.handle_message(sender, &payload)?;
            }
            PartitionMessage::LeaderUpdated { partition, leader } => {
                self.service.on_partition_leader_updated(partition, leader);
            }
            PartitionMessage::CheckpointCreated {
                checkpoint_id,
                checkpoint_type,
            } => {
                self.service
                    .on_new_checkpoint_created(checkpoint_id, checkpoint_type);
            }
            PartitionMessage::DiskSpace { free_bytes } => {
                if let Some(event) = self.disk.observe(free_bytes) {
                    self.service.on_disk_space_event(event);
                }
            }
            PartitionMessage::RoleChanged(role) => self.change_role(role),
            PartitionMessage::ScheduleDueDate { kind, due_date } => {
                self.processor.schedule_due_date(kind, due_date);
            }
            PartitionMessage::Status(reply) => {
                // The requester may have given up waiting
                let _ = reply.send(self.status());
            }
            PartitionMessage::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    fn change_role(&mut self, role: PartitionRole) {
        if role == self.role {
            return;
        }
        tracing::info!(
            partition = %self.partition_id,
            from = ?self.role,
            to = ?role,
            "Partition role changed"
        );
        self.role = role;

        match role {
            PartitionRole::Leader => {
                match self.processor.phase() {
                    ProcessorPhase::Paused => self.processor.on_resumed(),
                    _ => self.processor.on_recovered(),
                }
                self.service.on_became_leader(self.inbound_handler());
            }
            PartitionRole::Follower | PartitionRole::Inactive => {
                self.service.on_became_follower();
                self.processor.on_paused();
            }
        }
    }

    fn inbound_handler(&self) -> MessageHandler {
        let inbound = self.inbound.clone();
        let partition_id = self.partition_id;
        Arc::new(move |sender: NodeId, payload: Bytes| {
            let delivered = inbound
                .upgrade()
                .is_some_and(|tx| tx.send(PartitionMessage::Inbound { sender, payload }).is_ok());
            if !delivered {
                tracing::trace!(
                    partition = %partition_id,
                    sender = %sender,
                    "Partition actor stopped, dropping inter-partition command"
                );
            }
        })
    }

    fn status(&mut self) -> PartitionStatus {
        PartitionStatus {
            partition_id: self.partition_id,
            role: self.role,
            phase: self.processor.phase(),
            checkpoint_id: self.service.receiver().checkpoint_id(),
            known_leaders: self.service.sender().leaders().len(),
            disk_space_available: self.service.receiver().is_disk_space_available(),
            subscribed: self.service.is_subscribed(),
            next_wakeup: self.processor.next_wakeup(),
        }
    }
}

impl<W, I> std::fmt::Debug for PartitionActor<W, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionActor")
            .field("partition_id", &self.partition_id)
            .field("role", &self.role)
            .field("processor", &self.processor)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
