//! End-to-end collection rounds over scripted disks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sysprobe::{
    Coordinator, DiskConfig, DiskProbe, DiskSource, MetricSource, Partition, SourceError,
    UsageStat,
};
use sysprobe_common::{MOUNT_POINT, MetricEnvelope, ReportCategory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Disks with fixed partitions; usage answers after an optional delay.
#[derive(Default)]
struct ScriptedDisks {
    partitions: Vec<Partition>,
    usage: HashMap<String, UsageStat>,
    delay: Duration,
}

impl ScriptedDisks {
    fn new(partitions: Vec<Partition>) -> Self {
        Self {
            partitions,
            ..Self::default()
        }
    }

    fn with_usage(mut self, mount_point: &str, usage: UsageStat) -> Self {
        self.usage.insert(mount_point.to_string(), usage);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl DiskProbe for ScriptedDisks {
    fn partitions(&self) -> Result<Vec<Partition>, SourceError> {
        Ok(self.partitions.clone())
    }

    async fn usage(&self, mount_point: &str) -> Result<UsageStat, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.usage
            .get(mount_point)
            .copied()
            .ok_or_else(|| SourceError::usage(mount_point, "no such device"))
    }
}

fn root_usage() -> UsageStat {
    UsageStat {
        total: 100,
        used: 40,
        free: 60,
        used_percent: 40.0,
    }
}

fn disk_source(disks: ScriptedDisks) -> Arc<dyn MetricSource> {
    Arc::new(DiskSource::with_probe("", disks, &DiskConfig::include_all()))
}

fn channel() -> (mpsc::Sender<MetricEnvelope>, mpsc::Receiver<MetricEnvelope>) {
    mpsc::channel(4)
}

#[tokio::test]
async fn test_root_and_proc_round() {
    let disks = ScriptedDisks::new(vec![
        Partition::new("/dev/sda1", "ext4", "/"),
        Partition::new("", "", "/proc"),
    ])
    .with_usage("/", root_usage());

    let (tx, mut rx) = channel();
    let coordinator = Coordinator::new(vec![disk_source(disks)], tx);

    let report = coordinator
        .start_round(&CancellationToken::new())
        .drain(&mut rx)
        .await;

    assert_eq!(report.envelopes.len(), 1);
    let envelope = &report.envelopes[0];
    assert_eq!(envelope.dimension(MOUNT_POINT), Some("/"));
    assert_eq!(envelope.category, ReportCategory::System);

    let metrics: Vec<_> = envelope
        .metrics
        .iter()
        .map(|m| (m.name.as_str(), m.value))
        .collect();
    assert_eq!(
        metrics,
        [("free", 60.0), ("in_use", 40.0), ("total", 100.0), ("used", 40.0)]
    );
}

#[tokio::test]
async fn test_five_disk_sources_fan_in() {
    let sources: Vec<Arc<dyn MetricSource>> = (0..5u64)
        .map(|i| {
            let mount = format!("/mnt/{}", i);
            let disks = ScriptedDisks::new(vec![
                Partition::new(format!("/dev/sd{}", i), "ext4", mount.clone()),
                Partition::new(format!("/dev/broken{}", i), "ext4", "/mnt/broken"),
            ])
            .with_usage(&mount, UsageStat::new(100, i * 10, 100 - i * 10))
            .with_delay(Duration::from_millis(5 * (5 - i)));
            disk_source(disks)
        })
        .collect();

    let (tx, mut rx) = mpsc::channel(1);
    let coordinator = Coordinator::new(sources, tx);

    let round = coordinator.start_round(&CancellationToken::new());
    let barrier = round.barrier().clone();
    assert_eq!(barrier.pending(), 5);

    let report = round.drain(&mut rx).await;

    assert_eq!(barrier.pending(), 0);
    assert_eq!(report.envelopes.len(), 5);

    let mut mounts: Vec<_> = report
        .envelopes
        .iter()
        .filter_map(|e| e.dimension(MOUNT_POINT))
        .collect();
    mounts.sort_unstable();
    assert_eq!(mounts, ["/mnt/0", "/mnt/1", "/mnt/2", "/mnt/3", "/mnt/4"]);
}

#[tokio::test]
async fn test_deadline_bounds_hung_mount() {
    let hung = ScriptedDisks::new(vec![Partition::new("nfs:/export", "nfs", "/net")])
        .with_usage("/net", root_usage())
        .with_delay(Duration::from_secs(60));
    let healthy = ScriptedDisks::new(vec![Partition::new("/dev/sda1", "ext4", "/")])
        .with_usage("/", root_usage());

    let (tx, mut rx) = channel();
    let coordinator = Coordinator::new(vec![disk_source(hung), disk_source(healthy)], tx)
        .with_round_timeout(Some(Duration::from_millis(100)));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator
            .start_round(&CancellationToken::new())
            .drain(&mut rx),
    )
    .await
    .expect("round deadline should cancel the hung mount");

    assert!(report.cancelled);
    assert_eq!(report.envelopes.len(), 1);
    assert_eq!(report.envelopes[0].dimension(MOUNT_POINT), Some("/"));
}

#[tokio::test]
async fn test_shutdown_before_round_emits_nothing() {
    let disks = ScriptedDisks::new(vec![Partition::new("/dev/sda1", "ext4", "/")])
        .with_usage("/", root_usage());

    let (tx, mut rx) = channel();
    let coordinator = Coordinator::new(vec![disk_source(disks)], tx);

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let round = coordinator.start_round(&shutdown);
    let barrier = round.barrier().clone();
    let report = round.drain(&mut rx).await;

    assert!(report.envelopes.is_empty());
    assert!(report.cancelled);
    assert!(barrier.is_complete());
}
