//! A node hosting every partition of a single-process cluster.

use crate::config::{ConfigError, NodeConfig};
use std::sync::Arc;
use strata_cluster::{LocalCluster, PartitionActor, PartitionError, PartitionHandle, PartitionRole};
use strata_core::{PartitionId, SharedClock};
use strata_log::InMemoryLogStream;
use strata_runtime::{DueIndexes, InMemoryDueIndex};
use tokio::task::JoinHandle;

/// Node errors
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A partition stopped or failed
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// A partition task panicked or was aborted
    #[error("Partition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct RunningPartition {
    handle: PartitionHandle,
    log: InMemoryLogStream,
    indexes: DueIndexes<InMemoryDueIndex>,
    task: JoinHandle<Result<(), PartitionError>>,
}

/// Running node
pub struct Node {
    config: NodeConfig,
    cluster: LocalCluster,
    partitions: Vec<RunningPartition>,
}

impl Node {
    /// Start every configured partition as leader
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid
    pub fn start(config: NodeConfig, clock: SharedClock) -> Result<Self, NodeError> {
        config.validate()?;
        let cluster = LocalCluster::new();
        let node_id = config.node_id;

        let partitions = partition_ids(&config)
            .map(|partition_id| {
                let log = InMemoryLogStream::new(partition_id);
                let indexes = DueIndexes::<InMemoryDueIndex>::default();
                let (actor, handle) = PartitionActor::new(
                    partition_id,
                    Arc::new(cluster.member(node_id)),
                    log.clone(),
                    indexes.clone(),
                    Arc::clone(&clock),
                    config.processor,
                    config.disk,
                );
                RunningPartition {
                    handle,
                    log,
                    indexes,
                    task: actor.spawn(),
                }
            })
            .collect::<Vec<_>>();

        for partition in &partitions {
            for leader_of in partition_ids(&config) {
                partition
                    .handle
                    .partition_leader_updated(leader_of, Some(node_id))?;
            }
            partition.handle.role_changed(PartitionRole::Leader)?;
        }

        tracing::info!(
            node = %node_id,
            partitions = partitions.len(),
            "Node started"
        );
        Ok(Self {
            config,
            cluster,
            partitions,
        })
    }

    /// Handle of `partition_id`, if hosted here
    #[must_use]
    pub fn handle(&self, partition_id: PartitionId) -> Option<&PartitionHandle> {
        self.partition(partition_id).map(|p| &p.handle)
    }

    /// Log of `partition_id`, if hosted here
    #[must_use]
    pub fn log(&self, partition_id: PartitionId) -> Option<&InMemoryLogStream> {
        self.partition(partition_id).map(|p| &p.log)
    }

    /// Due-date indexes of `partition_id`, if hosted here
    #[must_use]
    pub fn due_indexes(&self, partition_id: PartitionId) -> Option<&DueIndexes<InMemoryDueIndex>> {
        self.partition(partition_id).map(|p| &p.indexes)
    }

    /// Report free disk bytes to every partition
    ///
    /// # Errors
    ///
    /// Returns error if a partition has stopped
    pub fn disk_space_changed(&self, free_bytes: u64) -> Result<(), NodeError> {
        for partition in &self.partitions {
            partition.handle.disk_space_changed(free_bytes)?;
        }
        Ok(())
    }

    /// In-process network of this node
    #[must_use]
    pub const fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }

    /// Config the node was started with
    #[must_use]
    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Stop every partition and wait for them
    ///
    /// # Errors
    ///
    /// Returns the first partition failure; every partition is still awaited
    pub async fn shutdown(self) -> Result<(), NodeError> {
        let mut first_error = None;
        for partition in &self.partitions {
            // Already stopped partitions report through their task
            let _ = partition.handle.shutdown();
        }
        for partition in self.partitions {
            let result = match partition.task.await {
                Ok(result) => result.map_err(NodeError::from),
                Err(e) => Err(NodeError::from(e)),
            };
            if let Err(e) = result {
                tracing::error!(
                    partition = %partition.handle.partition_id(),
                    error = %e,
                    "Partition stopped with error"
                );
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(node = %self.config.node_id, "Node stopped");
        first_error.map_or(Ok(()), Err)
    }

    fn partition(&self, partition_id: PartitionId) -> Option<&RunningPartition> {
        self.partitions
            .iter()
            .find(|p| p.handle.partition_id() == partition_id)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.config.node_id)
            .field("partitions", &self.partitions.len())
            .field("cluster", &self.cluster)
            .finish()
    }
}

fn partition_ids(config: &NodeConfig) -> impl Iterator<Item = PartitionId> {
    let count = i32::try_from(config.partition_count).unwrap_or(i32::MAX);
    (PartitionId::FIRST.get()..=count).map(PartitionId::new)
}
