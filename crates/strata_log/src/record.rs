//! Record types for the partition log.
//!
//! Every entry in a partition log is either a command (a request to change
//! state) or an event (a fact). The value type selects the schema of the
//! record value; the intent says what the record asks for or reports.

use crate::intent::Intent;
use bytes::Bytes;

/// Record type
///
/// Only commands are written by the components of this workspace; events
/// are produced by processing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Request to change state
    Command,
}

/// Value type of a record
///
/// The numeric codes are part of the inter-partition wire format and must
/// never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ValueType {
    /// Jobs
    Job = 0,
    /// Timers
    Timer = 1,
    /// Process instances
    ProcessInstance = 2,
    /// Published messages
    Message = 3,
    /// Message subscriptions
    MessageSubscription = 4,
    /// Process message subscriptions
    ProcessMessageSubscription = 5,
    /// Message start event subscriptions
    MessageStartEventSubscription = 6,
    /// Deployments
    Deployment = 7,
    /// Command distribution
    CommandDistribution = 8,
    /// Broadcast signals
    Signal = 9,
    /// Checkpoints
    Checkpoint = 10,
}

impl ValueType {
    /// Every known value type
    pub const ALL: [ValueType; 11] = [
        Self::Job,
        Self::Timer,
        Self::ProcessInstance,
        Self::Message,
        Self::MessageSubscription,
        Self::ProcessMessageSubscription,
        Self::MessageStartEventSubscription,
        Self::Deployment,
        Self::CommandDistribution,
        Self::Signal,
        Self::Checkpoint,
    ];

    /// Wire code
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look up a value type by its wire code
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Job),
            1 => Some(Self::Timer),
            2 => Some(Self::ProcessInstance),
            3 => Some(Self::Message),
            4 => Some(Self::MessageSubscription),
            5 => Some(Self::ProcessMessageSubscription),
            6 => Some(Self::MessageStartEventSubscription),
            7 => Some(Self::Deployment),
            8 => Some(Self::CommandDistribution),
            9 => Some(Self::Signal),
            10 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Job => "JOB",
            Self::Timer => "TIMER",
            Self::ProcessInstance => "PROCESS_INSTANCE",
            Self::Message => "MESSAGE",
            Self::MessageSubscription => "MESSAGE_SUBSCRIPTION",
            Self::ProcessMessageSubscription => "PROCESS_MESSAGE_SUBSCRIPTION",
            Self::MessageStartEventSubscription => "MESSAGE_START_EVENT_SUBSCRIPTION",
            Self::Deployment => "DEPLOYMENT",
            Self::CommandDistribution => "COMMAND_DISTRIBUTION",
            Self::Signal => "SIGNAL",
            Self::Checkpoint => "CHECKPOINT",
        };
        f.write_str(name)
    }
}

/// Metadata stored alongside every record value
///
/// The value type is implied by the intent, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordMetadata {
    /// Kind of record
    pub record_type: RecordType,
    /// Intent of the record
    pub intent: Intent,
}

impl RecordMetadata {
    /// Metadata of a command with the given intent
    #[must_use]
    pub const fn command(intent: Intent) -> Self {
        Self {
            record_type: RecordType::Command,
            intent,
        }
    }

    /// Value type selected by the intent
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.intent.value_type()
    }
}

/// Undecoded record value, tagged with its value type
///
/// The bytes are a view into the buffer the value arrived in; nothing is
/// copied or materialized until a processor of that value type reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandValue {
    /// Raw Job command value
    Job(Bytes),
    /// Raw Timer command value
    Timer(Bytes),
    /// Raw ProcessInstance command value
    ProcessInstance(Bytes),
    /// Raw Message command value
    Message(Bytes),
    /// Raw MessageSubscription command value
    MessageSubscription(Bytes),
    /// Raw ProcessMessageSubscription command value
    ProcessMessageSubscription(Bytes),
    /// Raw MessageStartEventSubscription command value
    MessageStartEventSubscription(Bytes),
    /// Raw Deployment command value
    Deployment(Bytes),
    /// Raw CommandDistribution command value
    CommandDistribution(Bytes),
    /// Raw Signal command value
    Signal(Bytes),
    /// Raw Checkpoint command value
    Checkpoint(Bytes),
}

impl CommandValue {
    /// Wrap `bytes` as a value of `value_type`
    #[must_use]
    pub fn view(value_type: ValueType, bytes: Bytes) -> Self {
        match value_type {
            ValueType::Job => Self::Job(bytes),
            ValueType::Timer => Self::Timer(bytes),
            ValueType::ProcessInstance => Self::ProcessInstance(bytes),
            ValueType::Message => Self::Message(bytes),
            ValueType::MessageSubscription => Self::MessageSubscription(bytes),
            ValueType::ProcessMessageSubscription => Self::ProcessMessageSubscription(bytes),
            ValueType::MessageStartEventSubscription => {
                Self::MessageStartEventSubscription(bytes)
            }
            ValueType::Deployment => Self::Deployment(bytes),
            ValueType::CommandDistribution => Self::CommandDistribution(bytes),
            ValueType::Signal => Self::Signal(bytes),
            ValueType::Checkpoint => Self::Checkpoint(bytes),
        }
    }

    /// Value type of this value
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Job(_) => ValueType::Job,
            Self::Timer(_) => ValueType::Timer,
            Self::ProcessInstance(_) => ValueType::ProcessInstance,
            Self::Message(_) => ValueType::Message,
            Self::MessageSubscription(_) => ValueType::MessageSubscription,
            Self::ProcessMessageSubscription(_) => ValueType::ProcessMessageSubscription,
            Self::MessageStartEventSubscription(_) => ValueType::MessageStartEventSubscription,
            Self::Deployment(_) => ValueType::Deployment,
            Self::CommandDistribution(_) => ValueType::CommandDistribution,
            Self::Signal(_) => ValueType::Signal,
            Self::Checkpoint(_) => ValueType::Checkpoint,
        }
    }

    /// Raw value bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &Bytes {
        match self {
            Self::Job(b)
            | Self::Timer(b)
            | Self::ProcessInstance(b)
            | Self::Message(b)
            | Self::MessageSubscription(b)
            | Self::ProcessMessageSubscription(b)
            | Self::MessageStartEventSubscription(b)
            | Self::Deployment(b)
            | Self::CommandDistribution(b)
            | Self::Signal(b)
            | Self::Checkpoint(b) => b,
        }
    }

    /// Consume into the raw value bytes
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Job(b)
            | Self::Timer(b)
            | Self::ProcessInstance(b)
            | Self::Message(b)
            | Self::MessageSubscription(b)
            | Self::ProcessMessageSubscription(b)
            | Self::MessageStartEventSubscription(b)
            | Self::Deployment(b)
            | Self::CommandDistribution(b)
            | Self::Signal(b)
            | Self::Checkpoint(b) => b,
        }
    }
}
