//! Deterministic timer queue for the partition processing loop.
//!
//! Runs are keyed by `(due, sequence)` in a `BTreeMap`, so runs due at the
//! same instant fire in the order they were scheduled. Nothing here sleeps;
//! the owner asks for [`TimerQueue::next_deadline`] and polls when it passes.

use crate::due::DueDateKind;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled run
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    due: i64,
    token: CancellationToken,
}

impl ScheduledTask {
    /// Wall-clock millisecond at which the run is due
    #[must_use]
    pub const fn due(&self) -> i64 {
        self.due
    }

    /// Cancel the run; it will not fire
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the run was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules future runs on the processing thread
pub trait ScheduleService {
    /// Run the checker for `task` at wall-clock millisecond `due`
    fn run_at(&mut self, due: i64, task: DueDateKind) -> ScheduledTask;
}

/// Ordered queue of pending runs
#[derive(Debug, Default)]
pub struct TimerQueue {
    pending: BTreeMap<(i64, u64), (DueDateKind, CancellationToken)>,
    sequence: u64,
}

impl TimerQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest deadline of a run that was not cancelled
    ///
    /// Cancelled runs at the head of the queue are dropped.
    pub fn next_deadline(&mut self) -> Option<i64> {
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().1.is_cancelled() {
                entry.remove();
            } else {
                return Some(entry.key().0);
            }
        }
        None
    }

    /// Remove and return every live run due at or before `now`, in order
    pub fn poll_due(&mut self, now: i64) -> Vec<DueDateKind> {
        let mut fired = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let (kind, token) = entry.remove();
            if !token.is_cancelled() {
                fired.push(kind);
            }
        }
        fired
    }

    /// Number of queued runs, cancelled ones included until they are dropped
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no run is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ScheduleService for TimerQueue {
    fn run_at(&mut self, due: i64, task: DueDateKind) -> ScheduledTask {
        let token = CancellationToken::new();
        self.sequence = self.sequence.wrapping_add(1);
        self.pending.insert((due, self.sequence), (task, token.clone()));
        ScheduledTask { due, token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_due_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.run_at(300, DueDateKind::Timers);
        queue.run_at(100, DueDateKind::JobBackoffs);
        queue.run_at(200, DueDateKind::JobTimeouts);

        assert_eq!(queue.next_deadline(), Some(100));
        assert_eq!(
            queue.poll_due(250),
            vec![DueDateKind::JobBackoffs, DueDateKind::JobTimeouts]
        );
        assert_eq!(queue.next_deadline(), Some(300));
    }

    #[test]
    fn test_same_deadline_fires_in_schedule_order() {
        let mut queue = TimerQueue::new();
        queue.run_at(100, DueDateKind::JobTimeouts);
        queue.run_at(100, DueDateKind::Timers);

        assert_eq!(
            queue.poll_due(100),
            vec![DueDateKind::JobTimeouts, DueDateKind::Timers]
        );
    }

    #[test]
    fn test_cancelled_run_does_not_fire() {
        let mut queue = TimerQueue::new();
        let task = queue.run_at(100, DueDateKind::Timers);
        queue.run_at(200, DueDateKind::Timers);
        task.cancel();

        assert!(task.is_cancelled());
        assert_eq!(queue.next_deadline(), Some(200));
        assert_eq!(queue.poll_due(1_000), vec![DueDateKind::Timers]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let mut queue = TimerQueue::new();
        let task = queue.run_at(100, DueDateKind::Timers);
        assert_eq!(task.due(), 100);
        assert!(queue.poll_due(99).is_empty());
        assert_eq!(queue.len(), 1);
    }
}
