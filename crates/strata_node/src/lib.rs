//! STRATA Node
//!
//! Runs every partition of a single-process cluster: one partition actor
//! per partition, connected over the in-process transport.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use node::{Node, NodeError};
