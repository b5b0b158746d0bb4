//! Intents, scoped by value type.
//!
//! An intent code is only meaningful together with its value type: code 3
//! is `JOB TIME_OUT` but `TIMER CANCEL`. [`Intent`] carries both.

use crate::record::ValueType;

macro_rules! intent_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum $name {
            $(
                #[doc = $label]
                $variant = $code,
            )+
        }

        impl $name {
            /// Wire code, unique within the value type
            #[must_use]
            pub const fn code(self) -> u16 {
                self as u16
            }

            /// Look up an intent by its wire code
            #[must_use]
            pub const fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Upper-case name used in logs
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

intent_enum! {
    /// Job intents
    JobIntent {
        Created = 0 => "CREATED",
        Complete = 1 => "COMPLETE",
        Completed = 2 => "COMPLETED",
        TimeOut = 3 => "TIME_OUT",
        TimedOut = 4 => "TIMED_OUT",
        Fail = 5 => "FAIL",
        Failed = 6 => "FAILED",
        RecurAfterBackoff = 7 => "RECUR_AFTER_BACKOFF",
        RecurredAfterBackoff = 8 => "RECURRED_AFTER_BACKOFF",
        Cancel = 9 => "CANCEL",
        Canceled = 10 => "CANCELED",
    }
}

intent_enum! {
    /// Timer intents
    TimerIntent {
        Created = 0 => "CREATED",
        Trigger = 1 => "TRIGGER",
        Triggered = 2 => "TRIGGERED",
        Cancel = 3 => "CANCEL",
        Canceled = 4 => "CANCELED",
    }
}

intent_enum! {
    /// Process instance intents
    ProcessInstanceIntent {
        Cancel = 0 => "CANCEL",
        ActivateElement = 1 => "ACTIVATE_ELEMENT",
        CompleteElement = 2 => "COMPLETE_ELEMENT",
        TerminateElement = 3 => "TERMINATE_ELEMENT",
    }
}

intent_enum! {
    /// Message intents
    MessageIntent {
        Publish = 0 => "PUBLISH",
        Published = 1 => "PUBLISHED",
        Expire = 2 => "EXPIRE",
        Expired = 3 => "EXPIRED",
    }
}

intent_enum! {
    /// Message subscription intents
    MessageSubscriptionIntent {
        Create = 0 => "CREATE",
        Created = 1 => "CREATED",
        Correlate = 2 => "CORRELATE",
        Correlated = 3 => "CORRELATED",
        Reject = 4 => "REJECT",
        Rejected = 5 => "REJECTED",
        Delete = 6 => "DELETE",
        Deleted = 7 => "DELETED",
    }
}

intent_enum! {
    /// Process message subscription intents
    ProcessMessageSubscriptionIntent {
        Create = 0 => "CREATE",
        Created = 1 => "CREATED",
        Correlate = 2 => "CORRELATE",
        Correlated = 3 => "CORRELATED",
        Delete = 4 => "DELETE",
        Deleted = 5 => "DELETED",
    }
}

intent_enum! {
    /// Message start event subscription intents
    MessageStartEventSubscriptionIntent {
        Created = 0 => "CREATED",
        Correlated = 1 => "CORRELATED",
        Deleted = 2 => "DELETED",
    }
}

intent_enum! {
    /// Deployment intents
    DeploymentIntent {
        Create = 0 => "CREATE",
        Created = 1 => "CREATED",
        Distribute = 2 => "DISTRIBUTE",
        Distributed = 3 => "DISTRIBUTED",
    }
}

intent_enum! {
    /// Command distribution intents
    CommandDistributionIntent {
        Started = 0 => "STARTED",
        Distributing = 1 => "DISTRIBUTING",
        Acknowledge = 2 => "ACKNOWLEDGE",
        Acknowledged = 3 => "ACKNOWLEDGED",
        Finished = 4 => "FINISHED",
    }
}

intent_enum! {
    /// Signal intents
    SignalIntent {
        Broadcast = 0 => "BROADCAST",
        Broadcasted = 1 => "BROADCASTED",
    }
}

intent_enum! {
    /// Checkpoint intents
    CheckpointIntent {
        Create = 0 => "CREATE",
        Created = 1 => "CREATED",
        Ignored = 2 => "IGNORED",
    }
}

/// Intent of a record, tagged with the value type it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Intent of a Job record
    Job(JobIntent),
    /// Intent of a Timer record
    Timer(TimerIntent),
    /// Intent of a ProcessInstance record
    ProcessInstance(ProcessInstanceIntent),
    /// Intent of a Message record
    Message(MessageIntent),
    /// Intent of a MessageSubscription record
    MessageSubscription(MessageSubscriptionIntent),
    /// Intent of a ProcessMessageSubscription record
    ProcessMessageSubscription(ProcessMessageSubscriptionIntent),
    /// Intent of a MessageStartEventSubscription record
    MessageStartEventSubscription(MessageStartEventSubscriptionIntent),
    /// Intent of a Deployment record
    Deployment(DeploymentIntent),
    /// Intent of a CommandDistribution record
    CommandDistribution(CommandDistributionIntent),
    /// Intent of a Signal record
    Signal(SignalIntent),
    /// Intent of a Checkpoint record
    Checkpoint(CheckpointIntent),
}

impl Intent {
    /// Value type this intent belongs to
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

    /// Wire code, scoped by [`Intent::value_type`]
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Job(i) => i.code(),
            Self::Timer(i) => i.code(),
            Self::ProcessInstance(i) => i.code(),
            Self::Message(i) => i.code(),
            Self::MessageSubscription(i) => i.code(),
            Self::ProcessMessageSubscription(i) => i.code(),
            Self::MessageStartEventSubscription(i) => i.code(),
            Self::Deployment(i) => i.code(),
            Self::CommandDistribution(i) => i.code(),
            Self::Signal(i) => i.code(),
            Self::Checkpoint(i) => i.code(),
        }
    }

    /// Upper-case intent name, without the value type
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Job(i) => i.name(),
            Self::Timer(i) => i.name(),
            Self::ProcessInstance(i) => i.name(),
            Self::Message(i) => i.name(),
            Self::MessageSubscription(i) => i.name(),
            Self::ProcessMessageSubscription(i) => i.name(),
            Self::MessageStartEventSubscription(i) => i.name(),
            Self::Deployment(i) => i.name(),
            Self::CommandDistribution(i) => i.name(),
            Self::Signal(i) => i.name(),
            Self::Checkpoint(i) => i.name(),
        }
    }

    /// Resolve an intent code within `value_type`
    #[must_use]
    pub fn from_code(value_type: ValueType, code: u16) -> Option<Self> {
        match value_type {
            ValueType::Job => JobIntent::from_code(code).map(Self::Job),
            ValueType::Timer => TimerIntent::from_code(code).map(Self::Timer),
            ValueType::ProcessInstance => {
                ProcessInstanceIntent::from_code(code).map(Self::ProcessInstance)
            }
            ValueType::Message => MessageIntent::from_code(code).map(Self::Message),
            ValueType::MessageSubscription => {
                MessageSubscriptionIntent::from_code(code).map(Self::MessageSubscription)
            }
            ValueType::ProcessMessageSubscription => {
                ProcessMessageSubscriptionIntent::from_code(code)
                    .map(Self::ProcessMessageSubscription)
            }
            ValueType::MessageStartEventSubscription => {
                MessageStartEventSubscriptionIntent::from_code(code)
                    .map(Self::MessageStartEventSubscription)
            }
            ValueType::Deployment => DeploymentIntent::from_code(code).map(Self::Deployment),
            ValueType::CommandDistribution => {
                CommandDistributionIntent::from_code(code).map(Self::CommandDistribution)
            }
            ValueType::Signal => SignalIntent::from_code(code).map(Self::Signal),
            ValueType::Checkpoint => CheckpointIntent::from_code(code).map(Self::Checkpoint),
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value_type(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_code_is_scoped_by_value_type() {
        let time_out = Intent::Job(JobIntent::TimeOut);
        let cancel = Intent::Timer(TimerIntent::Cancel);
        assert_eq!(time_out.code(), cancel.code());

        assert_eq!(Intent::from_code(ValueType::Job, 3), Some(time_out));
        assert_eq!(Intent::from_code(ValueType::Timer, 3), Some(cancel));
    }

    #[test]
    fn test_unknown_intent_code() {
        assert_eq!(Intent::from_code(ValueType::Signal, 2), None);
        assert_eq!(Intent::from_code(ValueType::Checkpoint, u16::MAX), None);
    }

    #[test]
    fn test_intent_display() {
        let intent = Intent::Checkpoint(CheckpointIntent::Create);
        assert_eq!(intent.to_string(), "CHECKPOINT CREATE");
        assert_eq!(Intent::Job(JobIntent::RecurAfterBackoff).name(), "RECUR_AFTER_BACKOFF");
    }

    #[test]
    fn test_intent_roundtrip_per_value_type() {
        let samples = [
            Intent::Job(JobIntent::Complete),
            Intent::Timer(TimerIntent::Trigger),
            Intent::ProcessInstance(ProcessInstanceIntent::Cancel),
            Intent::Message(MessageIntent::Expire),
            Intent::MessageSubscription(MessageSubscriptionIntent::Correlate),
            Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Create),
            Intent::MessageStartEventSubscription(MessageStartEventSubscriptionIntent::Deleted),
            Intent::Deployment(DeploymentIntent::Distribute),
            Intent::CommandDistribution(CommandDistributionIntent::Acknowledge),
            Intent::Signal(SignalIntent::Broadcast),
            Intent::Checkpoint(CheckpointIntent::Create),
        ];
        for intent in samples {
            assert_eq!(Intent::from_code(intent.value_type(), intent.code()), Some(intent));
        }
    }
}
