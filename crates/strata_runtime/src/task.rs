//! Results of scheduled tasks.
//!
//! A task does not write to the log itself. It appends follow-up commands to
//! a [`TaskResultBuilder`] and the stream processor writes the finished
//! [`TaskResult`] as one batch.

use bytes::Bytes;
use strata_core::Key;
use strata_log::{Intent, LogAppendEntry, RecordMetadata};

/// Collects the follow-up commands of one task run
pub trait TaskResultBuilder {
    /// Append a command for `key`
    ///
    /// Returns `false` when the result is full; the command was not appended.
    fn append_command_record(&mut self, key: Key, intent: Intent, value: &Bytes) -> bool;

    /// Finish the result
    fn build(self) -> TaskResult
    where
        Self: Sized;
}

/// Commands produced by one task run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResult {
    entries: Vec<LogAppendEntry>,
}

impl TaskResult {
    /// Empty result
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appended commands in order
    #[must_use]
    pub fn records(&self) -> &[LogAppendEntry] {
        &self.entries
    }

    /// Take the appended commands
    #[must_use]
    pub fn into_entries(self) -> Vec<LogAppendEntry> {
        self.entries
    }

    /// Number of appended commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder with a fixed record limit
#[derive(Debug)]
pub struct BufferedTaskResultBuilder {
    entries: Vec<LogAppendEntry>,
    max_records: usize,
}

impl BufferedTaskResultBuilder {
    /// Builder accepting at most `max_records` commands
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_records,
        }
    }
}

impl TaskResultBuilder for BufferedTaskResultBuilder {
    fn append_command_record(&mut self, key: Key, intent: Intent, value: &Bytes) -> bool {
        if self.entries.len() >= self.max_records {
            return false;
        }
        self.entries.push(LogAppendEntry::of(
            key,
            RecordMetadata::command(intent),
            value.clone(),
        ));
        true
    }

    fn build(self) -> TaskResult {
        TaskResult {
            entries: self.entries,
        }
    }
}
