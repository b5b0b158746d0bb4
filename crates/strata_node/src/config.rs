//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{CoreError, NodeId};
use strata_runtime::{DiskSpaceConfig, ProcessorConfig};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Config file
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid config
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Config file
        path: PathBuf,
        /// JSON failure
        #[source]
        source: serde_json::Error,
    },

    /// A setting is out of range
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Settings of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Id of this node in the cluster
    pub node_id: NodeId,
    /// Partitions hosted by this node, numbered from 1
    pub partition_count: u32,
    /// Stream processor and due-date checker settings
    pub processor: ProcessorConfig,
    /// Disk space thresholds
    pub disk: DiskSpaceConfig,
}

impl NodeConfig {
    /// Create a new config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing settings take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set node id
    #[must_use]
    pub const fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }

    /// Set partition count
    #[must_use]
    pub const fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    /// Validate the config
    ///
    /// # Errors
    ///
    /// Returns error for the first invalid setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 {
            return Err(CoreError::validation("partition_count", "must be at least 1").into());
        }
        if i32::try_from(self.partition_count).is_err() {
            return Err(CoreError::validation("partition_count", "exceeds partition id range").into());
        }
        self.processor.validate()?;
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(0),
            partition_count: 1,
            processor: ProcessorConfig::default(),
            disk: DiskSpaceConfig::default(),
        }
    }
}
