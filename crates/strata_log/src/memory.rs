//! In-memory partition log.
//!
//! Stands in for the replicated log in tests and in single-process nodes.
//! Clones are handles onto the same log.

use crate::record::RecordMetadata;
use crate::writer::{LogAppendEntry, LogStreamWriter, Position, WriteContext, WriteFailure};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strata_core::{Key, PartitionId};

/// A record that was appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRecord {
    /// Assigned position
    pub position: Position,
    /// Record key, assigned if none was given
    pub key: Key,
    /// Record metadata
    pub metadata: RecordMetadata,
    /// Context the record was written in
    pub context: WriteContext,
    /// Record value
    pub value: Bytes,
}

struct Inner {
    partition_id: PartitionId,
    records: Vec<LoggedRecord>,
    next_key_counter: i64,
    max_records: Option<usize>,
    injected_failures: VecDeque<WriteFailure>,
    closed: bool,
}

/// In-memory log with partition-encoded key generation
#[derive(Clone)]
pub struct InMemoryLogStream {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryLogStream {
    /// Create an empty log for `partition_id`
    #[must_use]
    pub fn new(partition_id: PartitionId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                partition_id,
                records: Vec::new(),
                next_key_counter: 1,
                max_records: None,
                injected_failures: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Reject writes that would grow the log beyond `max_records`
    #[must_use]
    pub fn with_capacity_limit(self, max_records: usize) -> Self {
        self.lock().max_records = Some(max_records);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Partition this log belongs to
    #[must_use]
    pub fn partition_id(&self) -> PartitionId {
        self.lock().partition_id
    }

    /// Make the next write fail with `failure`
    pub fn inject_failure(&self, failure: WriteFailure) {
        self.lock().injected_failures.push_back(failure);
    }

    /// Close the log; every later write fails
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Snapshot of all records in append order
    #[must_use]
    pub fn records(&self) -> Vec<LoggedRecord> {
        self.lock().records.clone()
    }

    /// Number of appended records
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether nothing has been appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Last appended record
    #[must_use]
    pub fn last(&self) -> Option<LoggedRecord> {
        self.lock().records.last().cloned()
    }
}

impl std::fmt::Debug for InMemoryLogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("InMemoryLogStream")
            .field("partition_id", &inner.partition_id)
            .field("records", &inner.records.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl LogStreamWriter for InMemoryLogStream {
    fn try_write_batch(
        &mut self,
        context: WriteContext,
        entries: Vec<LogAppendEntry>,
    ) -> Result<Position, WriteFailure> {
        let mut inner = self.lock();

        if inner.closed {
            return Err(WriteFailure::Closed);
        }
        if let Some(failure) = inner.injected_failures.pop_front() {
            return Err(failure);
        }
        if entries.is_empty() {
            return Err(WriteFailure::InvalidEntry("empty batch".to_string()));
        }
        if let Some(max) = inner.max_records {
            if inner.records.len().saturating_add(entries.len()) > max {
                return Err(WriteFailure::WriteLimitExhausted);
            }
        }

        let mut last = Position::new(0);
        for entry in entries {
            let key = match entry.key {
                Some(key) => key,
                None => {
                    let key = Key::encode(inner.partition_id, inner.next_key_counter);
                    inner.next_key_counter = inner.next_key_counter.saturating_add(1);
                    key
                }
            };
            last = Position::new(i64::try_from(inner.records.len()).unwrap_or(i64::MAX) + 1);
            inner.records.push(LoggedRecord {
                position: last,
                key,
                metadata: entry.metadata,
                context,
                value: entry.value,
            });
        }

        Ok(last)
    }
}
