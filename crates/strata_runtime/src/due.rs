//! Time-ordered indexes of due entries.
//!
//! An index holds one entry per timer or job deadline, ordered by due date
//! and then by key. The owning domain state inserts and removes entries;
//! the due-date checkers only read them.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock};
use strata_core::Key;
use strata_log::{Intent, JobIntent, TimerIntent};

/// Which due index a checker drains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DueDateKind {
    /// Timer due dates, triggering `TIMER TRIGGER`
    Timers,
    /// Job activation deadlines, triggering `JOB TIME_OUT`
    JobTimeouts,
    /// Job retry backoffs, triggering `JOB RECUR_AFTER_BACKOFF`
    JobBackoffs,
}

impl DueDateKind {
    /// Every kind, in the order the processor owns them
    pub const ALL: [DueDateKind; 3] = [Self::Timers, Self::JobTimeouts, Self::JobBackoffs];

    /// Command written for each due entry of this kind
    #[must_use]
    pub const fn follow_up_intent(self) -> Intent {
        match self {
            Self::Timers => Intent::Timer(TimerIntent::Trigger),
            Self::JobTimeouts => Intent::Job(JobIntent::TimeOut),
            Self::JobBackoffs => Intent::Job(JobIntent::RecurAfterBackoff),
        }
    }
}

impl std::fmt::Display for DueDateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timers => f.write_str("timers"),
            Self::JobTimeouts => f.write_str("job-timeouts"),
            Self::JobBackoffs => f.write_str("job-backoffs"),
        }
    }
}

/// Position of an entry in a due index, also used as resumption cursor
///
/// Ordered by due date, ties broken by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DuePosition {
    /// Due date in epoch millis
    pub due_date: i64,
    /// Key of the scheduled record
    pub key: Key,
}

impl DuePosition {
    /// Create a new position
    #[must_use]
    pub const fn new(due_date: i64, key: Key) -> Self {
        Self { due_date, key }
    }
}

/// An entry that becomes due at `due_date`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    /// Due date in epoch millis
    pub due_date: i64,
    /// Key of the scheduled record
    pub key: Key,
    /// Record value to send with the follow-up command
    pub payload: Bytes,
}

impl DueEntry {
    /// Position of this entry in its index
    #[must_use]
    pub const fn position(&self) -> DuePosition {
        DuePosition::new(self.due_date, self.key)
    }
}

/// Time-ordered index that can be scanned for due entries
pub trait DueEntryIndex: Send {
    /// Visit, in order, every entry with `due_date <= horizon` that lies
    /// strictly after `start_after`, until `visitor` returns `false`
    fn visit_due(
        &self,
        horizon: i64,
        start_after: Option<DuePosition>,
        visitor: &mut dyn FnMut(&DueEntry) -> bool,
    );
}

/// In-memory due index
///
/// Clones are handles onto the same index, so domain state can keep
/// inserting while a checker scans.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDueIndex {
    entries: Arc<RwLock<BTreeMap<DuePosition, Bytes>>>,
}

impl InMemoryDueIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry at `(due_date, key)`
    pub fn insert(&self, due_date: i64, key: Key, payload: Bytes) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(DuePosition::new(due_date, key), payload);
    }

    /// Remove the entry at `(due_date, key)`
    pub fn remove(&self, due_date: i64, key: Key) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&DuePosition::new(due_date, key))
            .is_some()
    }

    /// Earliest due date in the index
    #[must_use]
    pub fn next_due_date(&self) -> Option<i64> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .next()
            .map(|position| position.due_date)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DueEntryIndex for InMemoryDueIndex {
    fn visit_due(
        &self,
        horizon: i64,
        start_after: Option<DuePosition>,
        visitor: &mut dyn FnMut(&DueEntry) -> bool,
    ) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let lower = start_after.map_or(Bound::Unbounded, Bound::Excluded);
        let upper = Bound::Included(DuePosition::new(horizon, Key::from_raw(i64::MAX)));
        if let (Bound::Excluded(start), Bound::Included(end)) = (&lower, &upper) {
            // BTreeMap::range panics on an inverted range
            if start >= end {
                return;
            }
        }

        for (position, payload) in entries.range((lower, upper)) {
            let entry = DueEntry {
                due_date: position.due_date,
                key: position.key,
                payload: payload.clone(),
            };
            if !visitor(&entry) {
                break;
            }
        }
    }
}
