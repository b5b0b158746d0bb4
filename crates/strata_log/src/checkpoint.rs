//! Checkpoint records.
//!
//! A `CHECKPOINT CREATE` record marks a backup boundary in the log. Commands
//! stamped with a checkpoint id may only be appended after a checkpoint with
//! that id (or a higher one) is in the same log.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Checkpoint identifier, monotonically non-decreasing per partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CheckpointId(u64);

impl CheckpointId {
    /// No checkpoint has been taken yet; real checkpoint ids start at 1
    pub const NONE: Self = Self(0);

    /// Create from raw value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a checkpoint was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CheckpointType {
    /// Backup requested by an operator
    #[default]
    ManualBackup = 0,
    /// Backup taken by the backup schedule
    ScheduledBackup = 1,
    /// Marker without an attached backup
    Marker = 2,
}

impl CheckpointType {
    /// Wire code
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look up a checkpoint type by its wire code
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::ManualBackup),
            1 => Some(Self::ScheduledBackup),
            2 => Some(Self::Marker),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManualBackup => f.write_str("MANUAL_BACKUP"),
            Self::ScheduledBackup => f.write_str("SCHEDULED_BACKUP"),
            Self::Marker => f.write_str("MARKER"),
        }
    }
}

/// Checkpoint record decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointRecordError {
    /// Value shorter than the fixed layout
    #[error("Checkpoint record truncated: {actual} of {expected} bytes")]
    Truncated { expected: usize, actual: usize },

    /// Unknown checkpoint type code
    #[error("Unknown checkpoint type {0}")]
    UnknownType(u32),
}

/// Value of a `CHECKPOINT` record
///
/// Layout (little-endian): `checkpoint_id: u64`, `checkpoint_type: u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Checkpoint being recorded
    pub checkpoint_id: CheckpointId,
    /// Kind of checkpoint
    pub checkpoint_type: CheckpointType,
}

impl CheckpointRecord {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = 12;

    /// Create a new checkpoint record
    #[must_use]
    pub const fn new(checkpoint_id: CheckpointId, checkpoint_type: CheckpointType) -> Self {
        Self {
            checkpoint_id,
            checkpoint_type,
        }
    }

    /// Encode to record value bytes
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_u64_le(self.checkpoint_id.get());
        buf.put_u32_le(self.checkpoint_type.code());
        buf.freeze()
    }

    /// Decode from record value bytes
    ///
    /// # Errors
    ///
    /// Returns error if the value is truncated or the type is unknown
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, CheckpointRecordError> {
        if bytes.remaining() < Self::ENCODED_LEN {
            return Err(CheckpointRecordError::Truncated {
                expected: Self::ENCODED_LEN,
                actual: bytes.remaining(),
            });
        }
        let checkpoint_id = CheckpointId::new(bytes.get_u64_le());
        let type_code = bytes.get_u32_le();
        let checkpoint_type = CheckpointType::from_code(type_code)
            .ok_or(CheckpointRecordError::UnknownType(type_code))?;
        Ok(Self::new(checkpoint_id, checkpoint_type))
    }
}
