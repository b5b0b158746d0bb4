//! STRATA Runtime
//!
//! Single-threaded processing runtime of one partition: a deterministic
//! timer queue, the due-date checkers that turn expired timers and job
//! deadlines into follow-up commands, and the stream processor that writes
//! those commands to the log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checker;
pub mod disk;
pub mod due;
pub mod processor;
pub mod schedule;
pub mod task;

pub use checker::{CheckerState, DueDateChecker, DueDateCheckerConfig};
pub use disk::{DiskSpaceConfig, DiskSpaceEvent, DiskSpaceMonitor, DiskSpaceUsageListener};
pub use due::{DueDateKind, DueEntry, DueEntryIndex, DuePosition, InMemoryDueIndex};
pub use processor::{DueIndexes, ProcessorConfig, ProcessorPhase, StreamProcessor};
pub use schedule::{ScheduleService, ScheduledTask, TimerQueue};
pub use task::{BufferedTaskResultBuilder, TaskResult, TaskResultBuilder};
