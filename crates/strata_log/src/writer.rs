//! Log stream writer interface.

use crate::record::RecordMetadata;
use bytes::Bytes;
use strata_core::Key;

/// Position of a record in the partition log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(i64);

impl Position {
    /// Create from raw value
    #[must_use]
    pub const fn new(position: i64) -> Self {
        Self(position)
    }

    /// Get raw value
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is writing, used for flow control and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteContext {
    /// Command delivered from another partition
    InterPartition,
    /// Follow-up commands produced by a scheduled task
    ScheduledTask,
}

/// Reasons an append can be rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteFailure {
    /// Log is closed
    #[error("Log stream is closed")]
    Closed,

    /// Replica is not the leader of the partition
    #[error("Not the leader of the partition")]
    NotLeader,

    /// Write buffer is full
    #[error("Write limit exhausted")]
    WriteLimitExhausted,

    /// Entry cannot be appended
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

/// One record to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAppendEntry {
    /// Record key; `None` lets the log assign one
    pub key: Option<Key>,
    /// Record metadata
    pub metadata: RecordMetadata,
    /// Record value
    pub value: Bytes,
}

impl LogAppendEntry {
    /// Entry with an explicit key
    #[must_use]
    pub const fn of(key: Key, metadata: RecordMetadata, value: Bytes) -> Self {
        Self {
            key: Some(key),
            metadata,
            value,
        }
    }

    /// Entry whose key is assigned by the log
    #[must_use]
    pub const fn without_key(metadata: RecordMetadata, value: Bytes) -> Self {
        Self {
            key: None,
            metadata,
            value,
        }
    }
}

/// Appends records to the local partition log
///
/// Appends are non-blocking; buffering and replication happen behind the
/// writer.
pub trait LogStreamWriter: Send {
    /// Append a batch atomically, returning the position of its last record
    ///
    /// # Errors
    ///
    /// Returns the reason the batch was rejected; nothing is appended then
    fn try_write_batch(
        &mut self,
        context: WriteContext,
        entries: Vec<LogAppendEntry>,
    ) -> Result<Position, WriteFailure>;

    /// Append a single record
    ///
    /// # Errors
    ///
    /// Returns the reason the record was rejected
    fn try_write(
        &mut self,
        context: WriteContext,
        entry: LogAppendEntry,
    ) -> Result<Position, WriteFailure> {
        self.try_write_batch(context, vec![entry])
    }
}

impl<W: LogStreamWriter + ?Sized> LogStreamWriter for Box<W> {
    fn try_write_batch(
        &mut self,
        context: WriteContext,
        entries: Vec<LogAppendEntry>,
    ) -> Result<Position, WriteFailure> {
        (**self).try_write_batch(context, entries)
    }
}
