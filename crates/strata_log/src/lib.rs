//! STRATA Partition Log
//!
//! Record model for the commands and events of one partition, and the
//! writer interface through which records are appended to its replicated log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod intent;
pub mod memory;
pub mod record;
pub mod writer;

pub use checkpoint::{CheckpointId, CheckpointRecord, CheckpointRecordError, CheckpointType};
pub use intent::{
    CheckpointIntent, CommandDistributionIntent, DeploymentIntent, Intent, JobIntent,
    MessageIntent, MessageStartEventSubscriptionIntent, MessageSubscriptionIntent,
    ProcessInstanceIntent, ProcessMessageSubscriptionIntent, SignalIntent, TimerIntent,
};
pub use memory::{InMemoryLogStream, LoggedRecord};
pub use record::{CommandValue, RecordMetadata, RecordType, ValueType};
pub use writer::{LogAppendEntry, LogStreamWriter, Position, WriteContext, WriteFailure};
