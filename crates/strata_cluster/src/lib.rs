//! STRATA Cluster
//!
//! Best-effort command delivery between partitions, checkpoint propagation
//! on the receiving side, and the actor that runs one partition.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod directory;
pub mod partition;
pub mod receiver;
pub mod sender;
pub mod service;
pub mod transport;

pub use codec::{DecodeError, InterPartitionMessage};
pub use directory::{CheckpointTracker, PartitionLeaderDirectory};
pub use partition::{
    OutgoingCommand, PartitionActor, PartitionError, PartitionHandle, PartitionRole,
    PartitionStatus,
};
pub use receiver::{InterPartitionCommandReceiver, ReceiveError, ReceiveOutcome};
pub use sender::{InterPartitionCommandSender, topic_for};
pub use service::InterPartitionCommandService;
pub use transport::{ClusterCommunicationTransport, LocalCluster, LocalClusterTransport, MessageHandler};
