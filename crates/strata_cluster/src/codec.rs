//! Wire format of inter-partition messages.
//!
//! Layout, little-endian:
//!
//! | field | type |
//! |---|---|
//! | checkpoint id | `u64` |
//! | checkpoint type | `u32` |
//! | receiver partition id | `i32` |
//! | value type | `u32` |
//! | intent | `u16` |
//! | record key | `i64`, `i64::MIN` when absent |
//! | command length + command | `u32` + bytes |
//! | auth length + auth | `u32` + bytes, length 0 when absent |
//!
//! Decoding slices the command and auth payloads out of the received buffer
//! without copying them.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_core::{Key, PartitionId};
use strata_log::{
    CheckpointId, CheckpointType, CommandValue, Intent, RecordMetadata, ValueType,
};

/// Wire value of an absent record key
pub const RECORD_KEY_NULL: i64 = i64::MIN;

/// Size of the fixed header
pub const HEADER_LEN: usize = 8 + 4 + 4 + 4 + 2 + 8;

/// Message decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Buffer ended inside a field
    #[error("Message truncated reading {field}: need {needed} bytes, {remaining} left")]
    Truncated {
        /// Field being read
        field: &'static str,
        /// Bytes the field needs
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Value type code this node does not know
    #[error("No value type mapped to code {0}")]
    UnknownValueType(u32),

    /// Intent code not defined for the value type
    #[error("No {value_type} intent mapped to code {code}")]
    UnknownIntent {
        /// Value type the intent was read for
        value_type: ValueType,
        /// Unmapped intent code
        code: u16,
    },

    /// Checkpoint type code this node does not know
    #[error("No checkpoint type mapped to code {0}")]
    UnknownCheckpointType(u32),
}

impl DecodeError {
    /// Whether the sender speaks a protocol version this node cannot read
    ///
    /// Protocol violations are fatal for the receiving partition; any other
    /// decode error is a corrupt message that is dropped.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownValueType(_)
                | Self::UnknownIntent { .. }
                | Self::UnknownCheckpointType(_)
        )
    }
}

/// A command addressed to the leader of another partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterPartitionMessage {
    /// Latest checkpoint of the sending partition
    pub checkpoint_id: CheckpointId,
    /// Kind of that checkpoint
    pub checkpoint_type: CheckpointType,
    /// Partition the command is addressed to
    pub receiver_partition_id: PartitionId,
    /// Intent of the command; selects the value type
    pub intent: Intent,
    /// Key the command is written with; `None` lets the receiving log assign one
    pub record_key: Option<Key>,
    /// Undecoded command value
    pub command: CommandValue,
    /// Authorization of the original request
    pub auth_info: Option<Bytes>,
}

impl InterPartitionMessage {
    /// Value type of the carried command
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.intent.value_type()
    }

    /// Metadata the command is written with
    #[must_use]
    pub const fn metadata(&self) -> RecordMetadata {
        RecordMetadata::command(self.intent)
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + 4
            + self.command.as_bytes().len()
            + 4
            + self.auth_info.as_ref().map_or(0, Bytes::len)
    }

    /// Encode to wire bytes
    ///
    /// An empty auth payload is encoded as absent.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64_le(self.checkpoint_id.get());
        buf.put_u32_le(self.checkpoint_type.code());
        buf.put_i32_le(self.receiver_partition_id.get());
        buf.put_u32_le(self.value_type().code());
        buf.put_u16_le(self.intent.code());
        buf.put_i64_le(self.record_key.map_or(RECORD_KEY_NULL, |key| key.get()));
        put_payload(&mut buf, Some(self.command.as_bytes()));
        put_payload(&mut buf, self.auth_info.as_ref());
        buf.freeze()
    }

    /// Decode from wire bytes
    ///
    /// # Errors
    ///
    /// Returns error if the message is truncated, has trailing bytes or uses
    /// a value type, intent or checkpoint type this node does not know
    pub fn decode(message: &Bytes) -> Result<Self, DecodeError> {
        let mut buf = message.clone();
        ensure(&buf, "header", HEADER_LEN)?;

        let checkpoint_id = CheckpointId::new(buf.get_u64_le());
        let type_code = buf.get_u32_le();
        let receiver_partition_id = PartitionId::new(buf.get_i32_le());
        let value_type_code = buf.get_u32_le();
        let intent_code = buf.get_u16_le();
        let raw_key = buf.get_i64_le();

        let checkpoint_type = CheckpointType::from_code(type_code)
            .ok_or(DecodeError::UnknownCheckpointType(type_code))?;
        let value_type = ValueType::from_code(value_type_code)
            .ok_or(DecodeError::UnknownValueType(value_type_code))?;
        let intent = Intent::from_code(value_type, intent_code).ok_or(
            DecodeError::UnknownIntent {
                value_type,
                code: intent_code,
            },
        )?;
        let record_key = (raw_key != RECORD_KEY_NULL).then(|| Key::from_raw(raw_key));

        let command = take_payload(&mut buf, "command")?;
        let auth = take_payload(&mut buf, "auth info")?;
        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }

        Ok(Self {
            checkpoint_id,
            checkpoint_type,
            receiver_partition_id,
            intent,
            record_key,
            command: CommandValue::view(value_type, command),
            auth_info: (!auth.is_empty()).then_some(auth),
        })
    }
}

fn put_payload(buf: &mut BytesMut, payload: Option<&Bytes>) {
    match payload {
        Some(bytes) => {
            // Payloads are bounded by the transport frame size, far below 4 GiB
            buf.put_u32_le(u32::try_from(bytes.len()).unwrap_or(u32::MAX));
            buf.put_slice(bytes);
        }
        None => buf.put_u32_le(0),
    }
}

fn ensure(buf: &Bytes, field: &'static str, needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn take_payload(buf: &mut Bytes, field: &'static str) -> Result<Bytes, DecodeError> {
    ensure(buf, field, 4)?;
    let len = buf.get_u32_le() as usize;
    ensure(buf, field, len)?;
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_log::{JobIntent, ProcessMessageSubscriptionIntent};

    fn message() -> InterPartitionMessage {
        InterPartitionMessage {
            checkpoint_id: CheckpointId::new(7),
            checkpoint_type: CheckpointType::ManualBackup,
            receiver_partition_id: PartitionId::new(3),
            intent: Intent::Job(JobIntent::Complete),
            record_key: Some(Key::from_raw(42)),
            command: CommandValue::view(ValueType::Job, Bytes::from_static(b"{\"job\":1}")),
            auth_info: None,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = message().encode();
        assert_eq!(&bytes[..8], &7_u64.to_le_bytes());
        assert_eq!(&bytes[12..16], &3_i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &ValueType::Job.code().to_le_bytes());
        assert_eq!(&bytes[20..22], &1_u16.to_le_bytes());
        assert_eq!(&bytes[22..30], &42_i64.to_le_bytes());
        assert_eq!(bytes.len(), message().encoded_len());
    }

    #[test]
    fn test_absent_key_uses_null_value() {
        let mut msg = message();
        msg.record_key = None;
        let bytes = msg.encode();
        assert_eq!(&bytes[22..30], &RECORD_KEY_NULL.to_le_bytes());
        assert_eq!(InterPartitionMessage::decode(&bytes), Ok(msg));
    }

    #[test]
    fn test_decode_is_zero_copy() {
        let bytes = message().encode();
        let decoded = InterPartitionMessage::decode(&bytes).unwrap();
        let command = decoded.command.as_bytes();
        assert_eq!(command.as_ptr(), bytes[HEADER_LEN + 4..].as_ptr());
    }

    #[test]
    fn test_decode_with_auth_info() {
        let mut msg = message();
        msg.intent = Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Correlate);
        msg.command = CommandValue::view(ValueType::ProcessMessageSubscription, Bytes::new());
        msg.auth_info = Some(Bytes::from_static(b"tenant=a"));

        let decoded = InterPartitionMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.metadata().value_type(), ValueType::ProcessMessageSubscription);
    }

    #[test]
    fn test_truncated_is_not_protocol_violation() {
        let bytes = message().encode();
        let err = InterPartitionMessage::decode(&bytes.slice(..HEADER_LEN + 4 + 3)).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field: "command", .. }));
        assert!(!err.is_protocol_violation());

        let err = InterPartitionMessage::decode(&bytes.slice(..10)).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { field: "header", .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = BytesMut::from(&message().encode()[..]);
        raw.put_u8(0);
        assert_eq!(
            InterPartitionMessage::decode(&raw.freeze()),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_unknown_value_type_is_protocol_violation() {
        let mut raw = BytesMut::from(&message().encode()[..]);
        raw[16..20].copy_from_slice(&99_u32.to_le_bytes());
        let err = InterPartitionMessage::decode(&raw.freeze()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownValueType(99));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_unknown_intent_is_protocol_violation() {
        let mut raw = BytesMut::from(&message().encode()[..]);
        raw[20..22].copy_from_slice(&500_u16.to_le_bytes());
        let err = InterPartitionMessage::decode(&raw.freeze()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownIntent {
                value_type: ValueType::Job,
                code: 500
            }
        );
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("JOB"));
    }

    #[test]
    fn test_unknown_checkpoint_type_is_protocol_violation() {
        let mut raw = BytesMut::from(&message().encode()[..]);
        raw[8..12].copy_from_slice(&7_u32.to_le_bytes());
        let err = InterPartitionMessage::decode(&raw.freeze()).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    fn arb_intent() -> impl Strategy<Value = Intent> {
        (proptest::sample::select(ValueType::ALL.to_vec()), 0_u16..12).prop_filter_map(
            "intent defined for value type",
            |(value_type, code)| Intent::from_code(value_type, code),
        )
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            checkpoint_id: u64,
            type_code in 0_u32..3,
            partition: i32,
            intent in arb_intent(),
            key in proptest::option::of(0_i64..i64::MAX),
            command in proptest::collection::vec(any::<u8>(), 0..64),
            auth in proptest::option::of(proptest::collection::vec(any::<u8>(), 1..32)),
        ) {
            let msg = InterPartitionMessage {
                checkpoint_id: CheckpointId::new(checkpoint_id),
                checkpoint_type: CheckpointType::from_code(type_code).unwrap(),
                receiver_partition_id: PartitionId::new(partition),
                intent,
                record_key: key.map(Key::from_raw),
                command: CommandValue::view(intent.value_type(), Bytes::from(command)),
                auth_info: auth.map(Bytes::from),
            };
            prop_assert_eq!(InterPartitionMessage::decode(&msg.encode()), Ok(msg));
        }
    }
}
