//! STRATA Core Types
//!
//! Pure types shared by every partition component: identifiers, record keys
//! and the injectable wall clock. No I/O happens in this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{Key, NodeId, PartitionId};
pub use time::{Clock, ControlledClock, SharedClock, SystemClock};
