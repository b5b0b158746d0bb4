//! Two partition actors exchanging commands over the in-process transport.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use strata_cluster::{
    LocalCluster, OutgoingCommand, PartitionActor, PartitionError, PartitionHandle, PartitionRole,
};
use strata_core::{ControlledClock, Key, NodeId, PartitionId};
use strata_log::{
    CheckpointId, CheckpointIntent, CheckpointRecord, CheckpointType, InMemoryLogStream, Intent,
    JobIntent, WriteContext,
};
use strata_runtime::{DiskSpaceConfig, DueIndexes, InMemoryDueIndex, ProcessorConfig};
use tokio::task::JoinHandle;

const NOW: i64 = 1_700_000_000_000;

struct Partition {
    handle: PartitionHandle,
    log: InMemoryLogStream,
    indexes: DueIndexes<InMemoryDueIndex>,
    task: JoinHandle<Result<(), PartitionError>>,
}

impl Partition {
    fn start(cluster: &LocalCluster, clock: &ControlledClock, partition: i32, node: i32) -> Self {
        let partition_id = PartitionId::new(partition);
        let log = InMemoryLogStream::new(partition_id);
        let indexes = DueIndexes::<InMemoryDueIndex>::default();
        let (actor, handle) = PartitionActor::new(
            partition_id,
            Arc::new(cluster.member(NodeId::new(node))),
            log.clone(),
            indexes.clone(),
            clock.shared(),
            ProcessorConfig::default(),
            DiskSpaceConfig::new(1_000),
        );
        Self {
            handle,
            log,
            indexes,
            task: actor.spawn(),
        }
    }

    async fn stop(self) {
        self.handle.shutdown().unwrap();
        assert_eq!(self.task.await.unwrap(), Ok(()));
    }
}

async fn wait_for_records(log: &InMemoryLogStream, count: usize) {
    for _ in 0..200 {
        if log.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn job_complete(receiver: i32, key: i64) -> OutgoingCommand {
    OutgoingCommand::new(
        PartitionId::new(receiver),
        Intent::Job(JobIntent::Complete),
        Bytes::from_static(b"job"),
    )
    .with_record_key(Key::from_raw(key))
}

#[tokio::test]
async fn test_command_is_written_behind_checkpoint() {
    let cluster = LocalCluster::new();
    let clock = ControlledClock::new(NOW);
    let one = Partition::start(&cluster, &clock, 1, 0);
    let two = Partition::start(&cluster, &clock, 2, 1);

    two.handle.role_changed(PartitionRole::Leader).unwrap();
    assert!(two.handle.status().await.unwrap().subscribed);

    one.handle
        .partition_leader_updated(PartitionId::new(2), Some(NodeId::new(1)))
        .unwrap();
    one.handle
        .checkpoint_created(CheckpointId::new(5), CheckpointType::ManualBackup)
        .unwrap();
    one.handle.send_command(job_complete(2, 42)).unwrap();

    wait_for_records(&two.log, 2).await;
    let records = two.log.records();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].metadata.intent, Intent::Checkpoint(CheckpointIntent::Create));
    assert_eq!(records[0].context, WriteContext::InterPartition);
    assert_eq!(
        CheckpointRecord::from_bytes(&records[0].value).unwrap(),
        CheckpointRecord::new(CheckpointId::new(5), CheckpointType::ManualBackup)
    );

    assert_eq!(records[1].metadata.intent, Intent::Job(JobIntent::Complete));
    assert_eq!(records[1].key, Key::from_raw(42));
    assert_eq!(records[1].value, Bytes::from_static(b"job"));
    assert!(records[0].position < records[1].position);

    let status = two.handle.status().await.unwrap();
    assert_eq!(status.checkpoint_id, CheckpointId::new(5));

    // same checkpoint again: no second checkpoint record
    one.handle.send_command(job_complete(2, 43)).unwrap();
    wait_for_records(&two.log, 3).await;
    let records = two.log.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].key, Key::from_raw(43));

    one.stop().await;
    two.stop().await;
}

#[tokio::test]
async fn test_low_disk_space_rejects_commands() {
    let cluster = LocalCluster::new();
    let clock = ControlledClock::new(NOW);
    let one = Partition::start(&cluster, &clock, 1, 0);
    let two = Partition::start(&cluster, &clock, 2, 1);

    two.handle.role_changed(PartitionRole::Leader).unwrap();
    two.handle.disk_space_changed(10).unwrap();
    let status = two.handle.status().await.unwrap();
    assert!(status.subscribed);
    assert!(!status.disk_space_available);
    one.handle
        .partition_leader_updated(PartitionId::new(2), Some(NodeId::new(1)))
        .unwrap();
    one.handle
        .checkpoint_created(CheckpointId::new(3), CheckpointType::Marker)
        .unwrap();
    one.handle.send_command(job_complete(2, 42)).unwrap();

    // round trips order the delivery before the checks
    one.handle.status().await.unwrap();
    let status = two.handle.status().await.unwrap();
    assert!(!status.disk_space_available);
    assert_eq!(status.checkpoint_id, CheckpointId::NONE);
    assert!(two.log.is_empty());
    assert_eq!(cluster.delivered(), 1);

    two.handle.disk_space_changed(5_000).unwrap();
    one.handle.send_command(job_complete(2, 44)).unwrap();
    wait_for_records(&two.log, 2).await;
    assert_eq!(two.log.len(), 2);

    one.stop().await;
    two.stop().await;
}

#[tokio::test]
async fn test_unknown_leader_drops_command() {
    let cluster = LocalCluster::new();
    let clock = ControlledClock::new(NOW);
    let one = Partition::start(&cluster, &clock, 1, 0);
    let two = Partition::start(&cluster, &clock, 2, 1);

    two.handle.role_changed(PartitionRole::Leader).unwrap();
    one.handle.send_command(job_complete(2, 42)).unwrap();
    one.handle.status().await.unwrap();
    two.handle.status().await.unwrap();

    assert!(two.log.is_empty());
    assert_eq!(cluster.delivered(), 0);
    assert_eq!(cluster.dropped(), 0);

    one.stop().await;
    two.stop().await;
}

#[tokio::test]
async fn test_follower_is_not_subscribed() {
    let cluster = LocalCluster::new();
    let clock = ControlledClock::new(NOW);
    let one = Partition::start(&cluster, &clock, 1, 0);
    let two = Partition::start(&cluster, &clock, 2, 1);

    two.handle.role_changed(PartitionRole::Leader).unwrap();
    two.handle.role_changed(PartitionRole::Follower).unwrap();
    assert!(!two.handle.status().await.unwrap().subscribed);
    one.handle
        .partition_leader_updated(PartitionId::new(2), Some(NodeId::new(1)))
        .unwrap();
    one.handle.send_command(job_complete(2, 42)).unwrap();
    one.handle.status().await.unwrap();

    let status = two.handle.status().await.unwrap();
    assert!(!status.subscribed);
    assert!(two.log.is_empty());
    assert_eq!(cluster.dropped(), 1);

    one.stop().await;
    two.stop().await;
}

#[tokio::test]
async fn test_expired_job_deadlines_become_commands() {
    let cluster = LocalCluster::new();
    let clock = ControlledClock::new(NOW);
    let one = Partition::start(&cluster, &clock, 1, 0);

    one.indexes
        .job_timeouts
        .insert(NOW - 5, Key::from_raw(7), Bytes::from_static(b"deadline"));
    one.indexes
        .job_backoffs
        .insert(NOW + 60_000, Key::from_raw(8), Bytes::from_static(b"backoff"));
    one.handle.role_changed(PartitionRole::Leader).unwrap();

    wait_for_records(&one.log, 1).await;
    let records = one.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.intent, Intent::Job(JobIntent::TimeOut));
    assert_eq!(records[0].key, Key::from_raw(7));
    assert_eq!(records[0].context, WriteContext::ScheduledTask);

    one.stop().await;
}
