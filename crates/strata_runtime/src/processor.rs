//! Stream processor of one partition.
//!
//! Owns the timer queue, the three due-date checkers and the log writer.
//! Each wake-up executes every run whose deadline passed and writes the
//! produced commands as one batch per run. The processor is single-owner:
//! callers drive it from one task and never share it.

use crate::checker::{DueDateChecker, DueDateCheckerConfig};
use crate::due::{DueDateKind, DueEntryIndex};
use crate::schedule::TimerQueue;
use crate::task::BufferedTaskResultBuilder;
use serde::{Deserialize, Serialize};
use strata_core::{CoreError, CoreResult, PartitionId, SharedClock};
use strata_log::{LogStreamWriter, WriteContext};

/// Processor tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Checker for due timers
    pub timers: DueDateCheckerConfig,
    /// Checker for job deadlines
    pub job_timeouts: DueDateCheckerConfig,
    /// Checker for job retry backoffs
    pub job_backoffs: DueDateCheckerConfig,
    /// Capacity of the result of one scheduled run
    pub max_task_result_records: usize,
}

impl ProcessorConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for every checker
    #[must_use]
    pub const fn with_checkers(mut self, config: DueDateCheckerConfig) -> Self {
        self.timers = config;
        self.job_timeouts = config;
        self.job_backoffs = config;
        self
    }

    /// Set result capacity
    #[must_use]
    pub const fn with_max_task_result_records(mut self, max: usize) -> Self {
        self.max_task_result_records = max;
        self
    }

    /// Config of the checker for `kind`
    #[must_use]
    pub const fn checker(&self, kind: DueDateKind) -> DueDateCheckerConfig {
        match kind {
            DueDateKind::Timers => self.timers,
            DueDateKind::JobTimeouts => self.job_timeouts,
            DueDateKind::JobBackoffs => self.job_backoffs,
        }
    }

    /// Validate the config
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting
    pub fn validate(&self) -> CoreResult<()> {
        for kind in DueDateKind::ALL {
            self.checker(kind).validate()?;
        }
        if self.max_task_result_records == 0 {
            return Err(CoreError::validation(
                "max_task_result_records",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            timers: DueDateCheckerConfig::default(),
            job_timeouts: DueDateCheckerConfig::default(),
            job_backoffs: DueDateCheckerConfig::default(),
            max_task_result_records: 4_096,
        }
    }
}

/// Due indexes drained by the processor
#[derive(Debug, Clone, Default)]
pub struct DueIndexes<I> {
    /// Timers by due date
    pub timers: I,
    /// Activated jobs by deadline
    pub job_timeouts: I,
    /// Failed jobs by retry backoff
    pub job_backoffs: I,
}

/// Lifecycle phase of the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorPhase {
    /// Created, not yet recovered
    Initial,
    /// Recovered and running scheduled tasks
    Processing,
    /// Paused, e.g. while following
    Paused,
    /// Failed; nothing runs until recovery
    Failed,
    /// Closed for good
    Closed,
}

impl std::fmt::Display for ProcessorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Processing => f.write_str("processing"),
            Self::Paused => f.write_str("paused"),
            Self::Failed => f.write_str("failed"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Drives the due-date checkers of one partition
pub struct StreamProcessor<W, I> {
    partition_id: PartitionId,
    writer: W,
    clock: SharedClock,
    queue: TimerQueue,
    timers: DueDateChecker<I>,
    job_timeouts: DueDateChecker<I>,
    job_backoffs: DueDateChecker<I>,
    max_task_result_records: usize,
    phase: ProcessorPhase,
}

impl<W: LogStreamWriter, I: DueEntryIndex> StreamProcessor<W, I> {
    /// Create a processor in the initial phase
    #[must_use]
    pub fn new(
        partition_id: PartitionId,
        writer: W,
        clock: SharedClock,
        indexes: DueIndexes<I>,
        config: ProcessorConfig,
    ) -> Self {
        let checker = |kind: DueDateKind, index: I| {
            DueDateChecker::new(kind, index, clock.clone(), config.checker(kind))
        };
        Self {
            partition_id,
            timers: checker(DueDateKind::Timers, indexes.timers),
            job_timeouts: checker(DueDateKind::JobTimeouts, indexes.job_timeouts),
            job_backoffs: checker(DueDateKind::JobBackoffs, indexes.job_backoffs),
            writer,
            clock,
            queue: TimerQueue::new(),
            max_task_result_records: config.max_task_result_records.max(1),
            phase: ProcessorPhase::Initial,
        }
    }

    fn checkers_mut(&mut self) -> [&mut DueDateChecker<I>; 3] {
        [
            &mut self.timers,
            &mut self.job_timeouts,
            &mut self.job_backoffs,
        ]
    }

    fn transition(&mut self, phase: ProcessorPhase) {
        tracing::debug!(
            partition = %self.partition_id,
            from = %self.phase,
            to = %phase,
            "Stream processor phase change"
        );
        self.phase = phase;
    }

    /// State recovered; start the checkers
    pub fn on_recovered(&mut self) {
        self.transition(ProcessorPhase::Processing);
        let Self {
            queue,
            timers,
            job_timeouts,
            job_backoffs,
            ..
        } = self;
        for checker in [timers, job_timeouts, job_backoffs] {
            checker.on_recovered(queue);
        }
    }

    /// Resume after a pause
    pub fn on_resumed(&mut self) {
        if self.phase != ProcessorPhase::Paused {
            return;
        }
        self.transition(ProcessorPhase::Processing);
        let Self {
            queue,
            timers,
            job_timeouts,
            job_backoffs,
            ..
        } = self;
        for checker in [timers, job_timeouts, job_backoffs] {
            checker.on_resumed(queue);
        }
    }

    /// Pause processing
    pub fn on_paused(&mut self) {
        if self.phase != ProcessorPhase::Processing {
            return;
        }
        self.transition(ProcessorPhase::Paused);
        for checker in self.checkers_mut() {
            checker.on_paused();
        }
    }

    /// Processing failed
    pub fn on_failed(&mut self) {
        self.transition(ProcessorPhase::Failed);
        for checker in self.checkers_mut() {
            checker.on_failed();
        }
    }

    /// Close the processor
    pub fn on_close(&mut self) {
        self.transition(ProcessorPhase::Closed);
        for checker in self.checkers_mut() {
            checker.on_close();
        }
    }

    /// Tell the checker for `kind` that an entry becomes due at `due_date`
    pub fn schedule_due_date(&mut self, kind: DueDateKind, due_date: i64) {
        let Self {
            queue,
            timers,
            job_timeouts,
            job_backoffs,
            ..
        } = self;
        let checker = match kind {
            DueDateKind::Timers => timers,
            DueDateKind::JobTimeouts => job_timeouts,
            DueDateKind::JobBackoffs => job_backoffs,
        };
        checker.schedule(due_date, queue);
    }

    /// Earliest pending run
    pub fn next_wakeup(&mut self) -> Option<i64> {
        self.queue.next_deadline()
    }

    /// Execute every run that is due and write the produced commands
    ///
    /// Returns the number of commands written. A rejected batch is dropped;
    /// its entries are still in their due index and are proposed again on a
    /// later scan.
    pub fn run_due_tasks(&mut self) -> usize {
        let now = self.clock.millis();
        let due = self.queue.poll_due(now);
        let mut written = 0;

        for kind in due {
            let builder = BufferedTaskResultBuilder::new(self.max_task_result_records);
            let Self {
                queue,
                timers,
                job_timeouts,
                job_backoffs,
                writer,
                partition_id,
                ..
            } = self;
            let checker = match kind {
                DueDateKind::Timers => timers,
                DueDateKind::JobTimeouts => job_timeouts,
                DueDateKind::JobBackoffs => job_backoffs,
            };
            let result = checker.execute(builder, queue);
            if result.is_empty() {
                continue;
            }

            let count = result.len();
            match writer.try_write_batch(WriteContext::ScheduledTask, result.into_entries()) {
                Ok(position) => {
                    tracing::debug!(
                        partition = %partition_id,
                        checker = %kind,
                        count,
                        position = %position,
                        "Wrote scheduled task result"
                    );
                    written += count;
                }
                Err(e) => {
                    tracing::warn!(
                        partition = %partition_id,
                        checker = %kind,
                        count,
                        error = %e,
                        "Failed to write scheduled task result"
                    );
                }
            }
        }

        written
    }

    /// Checker for `kind`
    #[must_use]
    pub const fn checker(&self, kind: DueDateKind) -> &DueDateChecker<I> {
        match kind {
            DueDateKind::Timers => &self.timers,
            DueDateKind::JobTimeouts => &self.job_timeouts,
            DueDateKind::JobBackoffs => &self.job_backoffs,
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> ProcessorPhase {
        self.phase
    }

    /// Partition this processor belongs to
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }
}

impl<W, I> std::fmt::Debug for StreamProcessor<W, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("partition_id", &self.partition_id)
            .field("phase", &self.phase)
            .field("pending_runs", &self.queue.len())
            .finish_non_exhaustive()
    }
}
