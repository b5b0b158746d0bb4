//! Due-date checker.
//!
//! Drains one due index into follow-up commands. A run stops early once it
//! hits the batch limit, the yield deadline or a full result, and resumes
//! right after the last appended entry on the next run, which is scheduled
//! without delay. Only when the whole horizon is drained does the checker
//! fall back to the polling interval.

use crate::due::{DueDateKind, DueEntryIndex, DuePosition};
use crate::schedule::{ScheduleService, ScheduledTask};
use crate::task::{TaskResult, TaskResultBuilder};
use serde::{Deserialize, Serialize};
use strata_core::{CoreError, CoreResult, SharedClock};

/// Checker tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DueDateCheckerConfig {
    /// Delay between scans once the horizon is drained
    pub polling_interval_ms: u64,
    /// Maximum commands appended by one run
    pub batch_limit: usize,
    /// Fraction of the polling interval a run may take before yielding
    pub yield_factor: f64,
}

impl DueDateCheckerConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set polling interval
    #[must_use]
    pub const fn with_polling_interval_ms(mut self, polling_interval_ms: u64) -> Self {
        self.polling_interval_ms = polling_interval_ms;
        self
    }

    /// Set batch limit
    #[must_use]
    pub const fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Set yield factor
    #[must_use]
    pub const fn with_yield_factor(mut self, yield_factor: f64) -> Self {
        self.yield_factor = yield_factor;
        self
    }

    /// Milliseconds a run may scan before it yields
    #[must_use]
    pub fn yield_after_ms(&self) -> i64 {
        // u64 -> f64 loses precision only beyond 2^53 ms
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let millis = (self.polling_interval_ms as f64 * self.yield_factor).round() as i64;
        millis
    }

    /// Polling interval as signed milliseconds
    #[must_use]
    pub fn polling_interval(&self) -> i64 {
        i64::try_from(self.polling_interval_ms).unwrap_or(i64::MAX)
    }

    /// Validate the config
    ///
    /// # Errors
    ///
    /// Returns error if the batch limit is zero or the yield factor is
    /// outside `(0, 1]`
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_limit == 0 {
            return Err(CoreError::validation("batch_limit", "must be at least 1"));
        }
        if !(self.yield_factor > 0.0 && self.yield_factor <= 1.0) {
            return Err(CoreError::validation(
                "yield_factor",
                format!("must be in (0, 1], got {}", self.yield_factor),
            ));
        }
        Ok(())
    }
}

impl Default for DueDateCheckerConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 1_000,
            batch_limit: usize::MAX,
            yield_factor: 0.5,
        }
    }
}

/// Scheduling state of a checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerState {
    /// Accepting schedules, no run pending
    Idle,
    /// A run is pending
    Scheduled,
    /// Paused, failed or closed; schedules are ignored
    Stopped,
}

/// Drains one due index into follow-up commands
pub struct DueDateChecker<I> {
    kind: DueDateKind,
    index: I,
    clock: SharedClock,
    config: DueDateCheckerConfig,
    /// Last appended position of an unfinished horizon
    cursor: Option<DuePosition>,
    /// Horizon of the scan in progress
    execution_timestamp: Option<i64>,
    should_reschedule: bool,
    next_execution: Option<ScheduledTask>,
}

impl<I: DueEntryIndex> DueDateChecker<I> {
    /// Create a stopped checker; it starts on recovery or resumption
    #[must_use]
    pub fn new(
        kind: DueDateKind,
        index: I,
        clock: SharedClock,
        config: DueDateCheckerConfig,
    ) -> Self {
        Self {
            kind,
            index,
            clock,
            config,
            cursor: None,
            execution_timestamp: None,
            should_reschedule: false,
            next_execution: None,
        }
    }

    /// Request a run at or after `due_date`
    ///
    /// Ignored while stopped or if a run is already pending at or before
    /// `due_date`. A pending later run is replaced.
    pub fn schedule<S: ScheduleService + ?Sized>(&mut self, due_date: i64, scheduler: &mut S) {
        if !self.should_reschedule {
            return;
        }
        if let Some(pending) = &self.next_execution {
            if !pending.is_cancelled() && pending.due() <= due_date {
                return;
            }
            pending.cancel();
        }
        self.next_execution = Some(scheduler.run_at(due_date, self.kind));
    }

    /// Run one drain and schedule the next one
    pub fn execute<B, S>(&mut self, mut builder: B, scheduler: &mut S) -> TaskResult
    where
        B: TaskResultBuilder,
        S: ScheduleService + ?Sized,
    {
        if let Some(pending) = self.next_execution.take() {
            pending.cancel();
        }
        if !self.should_reschedule {
            return builder.build();
        }

        let now = self.clock.millis();
        let horizon = *self.execution_timestamp.get_or_insert(now);
        let yield_after = now.saturating_add(self.config.yield_after_ms());
        let batch_limit = self.config.batch_limit.max(1);
        let intent = self.kind.follow_up_intent();

        let clock = &self.clock;
        let mut appended = 0_usize;
        let mut last_appended = None;
        let mut yielded = false;

        self.index.visit_due(horizon, self.cursor, &mut |entry| {
            if appended >= batch_limit || (appended > 0 && clock.millis() >= yield_after) {
                yielded = true;
                return false;
            }
            if !builder.append_command_record(entry.key, intent, &entry.payload) {
                yielded = true;
                return false;
            }
            appended += 1;
            last_appended = Some(entry.position());
            true
        });

        if yielded {
            if last_appended.is_some() {
                self.cursor = last_appended;
            }
            tracing::trace!(
                checker = %self.kind,
                appended,
                horizon,
                "Yielding due date scan"
            );
            self.schedule(now, scheduler);
        } else {
            self.cursor = None;
            self.execution_timestamp = None;
            self.schedule(now.saturating_add(self.config.polling_interval()), scheduler);
        }

        builder.build()
    }

    /// Partition recovered; start checking
    pub fn on_recovered<S: ScheduleService + ?Sized>(&mut self, scheduler: &mut S) {
        self.start(scheduler);
    }

    /// Processing resumed; start checking
    pub fn on_resumed<S: ScheduleService + ?Sized>(&mut self, scheduler: &mut S) {
        self.start(scheduler);
    }

    /// Processing paused
    pub fn on_paused(&mut self) {
        self.stop();
    }

    /// Processing failed
    pub fn on_failed(&mut self) {
        self.stop();
    }

    /// Partition closed
    pub fn on_close(&mut self) {
        self.stop();
    }

    fn start<S: ScheduleService + ?Sized>(&mut self, scheduler: &mut S) {
        self.should_reschedule = true;
        let now = self.clock.millis();
        self.schedule(now, scheduler);
    }

    fn stop(&mut self) {
        self.should_reschedule = false;
        if let Some(pending) = self.next_execution.take() {
            pending.cancel();
        }
        self.cursor = None;
        self.execution_timestamp = None;
    }

    /// Current scheduling state
    #[must_use]
    pub fn state(&self) -> CheckerState {
        if !self.should_reschedule {
            CheckerState::Stopped
        } else if self
            .next_execution
            .as_ref()
            .is_some_and(|pending| !pending.is_cancelled())
        {
            CheckerState::Scheduled
        } else {
            CheckerState::Idle
        }
    }

    /// Due index this checker drains
    #[must_use]
    pub const fn kind(&self) -> DueDateKind {
        self.kind
    }

    /// Due time of the pending run
    #[must_use]
    pub fn next_execution(&self) -> Option<i64> {
        self.next_execution
            .as_ref()
            .filter(|pending| !pending.is_cancelled())
            .map(ScheduledTask::due)
    }

    /// Resumption cursor of an unfinished horizon
    #[must_use]
    pub const fn cursor(&self) -> Option<DuePosition> {
        self.cursor
    }

    /// Horizon of the scan in progress
    #[must_use]
    pub const fn execution_timestamp(&self) -> Option<i64> {
        self.execution_timestamp
    }

    /// Checker config
    #[must_use]
    pub const fn config(&self) -> &DueDateCheckerConfig {
        &self.config
    }
}

impl<I> std::fmt::Debug for DueDateChecker<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DueDateChecker")
            .field("kind", &self.kind)
            .field("cursor", &self.cursor)
            .field("execution_timestamp", &self.execution_timestamp)
            .field("should_reschedule", &self.should_reschedule)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::due::{DueEntry, InMemoryDueIndex};
    use crate::schedule::TimerQueue;
    use crate::task::BufferedTaskResultBuilder;
    use bytes::Bytes;
    use std::collections::HashSet;
    use strata_core::{Clock, ControlledClock, Key};
    use strata_log::{Intent, JobIntent, RecordMetadata};

    const NOW: i64 = 10_000;

    fn checker(
        index: &InMemoryDueIndex,
        clock: &ControlledClock,
        config: DueDateCheckerConfig,
    ) -> DueDateChecker<InMemoryDueIndex> {
        DueDateChecker::new(DueDateKind::JobTimeouts, index.clone(), clock.shared(), config)
    }

    fn keys(result: &TaskResult) -> Vec<i64> {
        result
            .records()
            .iter()
            .filter_map(|entry| entry.key.map(|key| key.get()))
            .collect()
    }

    fn due_jobs(count: i64, due_date: i64) -> InMemoryDueIndex {
        let index = InMemoryDueIndex::new();
        for key in 1..=count {
            index.insert(due_date, Key::from_raw(key), Bytes::from(format!("job-{key}")));
        }
        index
    }

    #[test]
    fn test_config_defaults() {
        let config = DueDateCheckerConfig::default();
        assert_eq!(config.polling_interval_ms, 1_000);
        assert_eq!(config.batch_limit, usize::MAX);
        assert_eq!(config.yield_after_ms(), 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(DueDateCheckerConfig::new().with_batch_limit(0).validate().is_err());
        assert!(DueDateCheckerConfig::new().with_yield_factor(0.0).validate().is_err());
        assert!(DueDateCheckerConfig::new().with_yield_factor(1.5).validate().is_err());
        assert!(DueDateCheckerConfig::new().with_yield_factor(1.0).validate().is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: DueDateCheckerConfig =
            serde_json::from_str(r#"{ "batch_limit": 10 }"#).unwrap();
        assert_eq!(config.batch_limit, 10);
        assert_eq!(config.polling_interval_ms, 1_000);
    }

    #[test]
    fn test_stopped_checker_ignores_schedule() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let mut checker = checker(&InMemoryDueIndex::new(), &clock, DueDateCheckerConfig::new());

        checker.schedule(100, &mut queue);
        assert_eq!(checker.state(), CheckerState::Stopped);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_recovery_schedules_immediately() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let mut checker = checker(&InMemoryDueIndex::new(), &clock, DueDateCheckerConfig::new());

        checker.on_recovered(&mut queue);
        assert_eq!(checker.state(), CheckerState::Scheduled);
        assert_eq!(checker.next_execution(), Some(NOW));
        assert_eq!(queue.next_deadline(), Some(NOW));
    }

    #[test]
    fn test_earlier_pending_run_is_kept() {
        let clock = ControlledClock::new(0);
        let mut queue = TimerQueue::new();
        let mut checker = checker(&InMemoryDueIndex::new(), &clock, DueDateCheckerConfig::new());
        checker.on_resumed(&mut queue);
        queue.poll_due(0);
        checker.execute(BufferedTaskResultBuilder::new(10), &mut queue);
        assert_eq!(checker.next_execution(), Some(1_000));

        checker.schedule(100, &mut queue);
        checker.schedule(150, &mut queue);
        checker.schedule(100, &mut queue);

        assert_eq!(checker.next_execution(), Some(100));
        assert_eq!(queue.next_deadline(), Some(100));
        assert_eq!(queue.poll_due(i64::MAX), vec![DueDateKind::JobTimeouts]);
    }

    #[test]
    fn test_yields_at_batch_limit_without_duplicates() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(5, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new().with_batch_limit(2));
        checker.on_recovered(&mut queue);

        let first = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&first), vec![1, 2]);
        assert_eq!(checker.cursor(), Some(DuePosition::new(NOW, Key::from_raw(2))));
        assert_eq!(checker.next_execution(), Some(NOW));

        let second = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        let third = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&second), vec![3, 4]);
        assert_eq!(keys(&third), vec![5]);

        let mut seen = HashSet::new();
        for key in keys(&first).into_iter().chain(keys(&second)).chain(keys(&third)) {
            assert!(seen.insert(key), "key {key} appended twice");
        }
        assert_eq!(seen.len(), 5);

        let intent = Intent::Job(JobIntent::TimeOut);
        assert!(
            first
                .records()
                .iter()
                .all(|entry| entry.metadata == RecordMetadata::command(intent))
        );
    }

    #[test]
    fn test_second_run_drains_remaining_backlog() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(3, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new().with_batch_limit(2));
        checker.on_recovered(&mut queue);

        let first = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(first.len(), 2);
        assert!(checker.cursor().is_some());

        let second = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&second), vec![3]);
        assert_eq!(checker.cursor(), None);
    }

    #[test]
    fn test_drained_horizon_resets_and_polls() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(2, NOW - 5);
        index.insert(NOW + 10, Key::from_raw(99), Bytes::new());
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new());
        checker.on_recovered(&mut queue);

        let result = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&result), vec![1, 2]);
        assert_eq!(checker.cursor(), None);
        assert_eq!(checker.execution_timestamp(), None);
        assert_eq!(checker.next_execution(), Some(NOW + 1_000));
    }

    #[test]
    fn test_horizon_is_fixed_until_drained() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(3, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new().with_batch_limit(1));
        checker.on_recovered(&mut queue);

        checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        clock.advance(50);
        index.insert(NOW + 20, Key::from_raw(50), Bytes::new());

        let second = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(checker.execution_timestamp(), Some(NOW));
        assert_eq!(keys(&second), vec![2]);
    }

    #[test]
    fn test_full_result_yields_and_revisits_entry() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(3, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new());
        checker.on_recovered(&mut queue);

        let first = checker.execute(BufferedTaskResultBuilder::new(2), &mut queue);
        assert_eq!(keys(&first), vec![1, 2]);
        assert_eq!(checker.next_execution(), Some(NOW));

        let second = checker.execute(BufferedTaskResultBuilder::new(2), &mut queue);
        assert_eq!(keys(&second), vec![3]);
    }

    struct TickingIndex {
        inner: InMemoryDueIndex,
        clock: ControlledClock,
    }

    impl DueEntryIndex for TickingIndex {
        fn visit_due(
            &self,
            horizon: i64,
            start_after: Option<DuePosition>,
            visitor: &mut dyn FnMut(&DueEntry) -> bool,
        ) {
            self.inner.visit_due(horizon, start_after, &mut |entry| {
                let proceed = visitor(entry);
                self.clock.advance(300);
                proceed
            });
        }
    }

    #[test]
    fn test_yields_when_scan_exceeds_time_budget() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = TickingIndex {
            inner: due_jobs(5, NOW),
            clock: clock.clone(),
        };
        let mut checker = DueDateChecker::new(
            DueDateKind::JobBackoffs,
            index,
            clock.shared(),
            DueDateCheckerConfig::new(),
        );
        checker.on_recovered(&mut queue);

        // budget is 500ms and every visited entry costs 300ms
        let result = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&result), vec![1, 2]);
        assert_eq!(checker.next_execution(), Some(NOW));
    }

    #[test]
    fn test_closed_checker_executes_nothing() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(3, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new());
        checker.on_recovered(&mut queue);
        checker.on_close();

        assert_eq!(queue.next_deadline(), None);
        let result = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert!(result.is_empty());
        assert_eq!(checker.state(), CheckerState::Stopped);

        checker.schedule(NOW, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pause_then_resume_restarts_horizon() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let index = due_jobs(3, NOW);
        let mut checker = checker(&index, &clock, DueDateCheckerConfig::new().with_batch_limit(1));
        checker.on_recovered(&mut queue);
        checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);

        checker.on_paused();
        assert_eq!(checker.cursor(), None);

        checker.on_resumed(&mut queue);
        let result = checker.execute(BufferedTaskResultBuilder::new(100), &mut queue);
        assert_eq!(keys(&result), vec![1]);
    }

    #[test]
    fn test_never_runs_before_due_date() {
        let clock = ControlledClock::new(NOW);
        let mut queue = TimerQueue::new();
        let mut checker = checker(&InMemoryDueIndex::new(), &clock, DueDateCheckerConfig::new());
        checker.on_recovered(&mut queue);
        queue.poll_due(NOW);
        checker.execute(BufferedTaskResultBuilder::new(10), &mut queue);

        assert!(queue.poll_due(clock.millis() + 999).is_empty());
        assert_eq!(queue.poll_due(NOW + 1_000), vec![DueDateKind::JobTimeouts]);
    }

    proptest::proptest! {
        #[test]
        fn prop_yielding_appends_every_due_entry_once(
            due_offsets in proptest::collection::vec(-50_i64..50, 0..40),
            batch_limit in 1_usize..8,
            capacity in 1_usize..8,
        ) {
            let clock = ControlledClock::new(NOW);
            let mut queue = TimerQueue::new();
            let index = InMemoryDueIndex::new();
            for (key, offset) in (1_i64..).zip(&due_offsets) {
                index.insert(NOW + offset, Key::from_raw(key), Bytes::new());
            }
            let expected: HashSet<i64> = (1_i64..)
                .zip(&due_offsets)
                .filter(|(_, offset)| **offset <= 0)
                .map(|(key, _)| key)
                .collect();

            let config = DueDateCheckerConfig::new().with_batch_limit(batch_limit);
            let mut checker = checker(&index, &clock, config);
            checker.on_recovered(&mut queue);

            let mut seen = HashSet::new();
            for _ in 0..=due_offsets.len() {
                let result = checker.execute(BufferedTaskResultBuilder::new(capacity), &mut queue);
                for key in keys(&result) {
                    proptest::prop_assert!(seen.insert(key), "key {} appended twice", key);
                }
                if checker.cursor().is_none() && checker.next_execution() != Some(NOW) {
                    break;
                }
            }
            proptest::prop_assert_eq!(seen, expected);
        }
    }
}
