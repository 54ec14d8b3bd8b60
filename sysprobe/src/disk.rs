//! Disk usage source.
//!
//! Partitions are enumerated once when the source is built. Each pass walks
//! that snapshot in order and emits one envelope per collectible partition,
//! tagged with its mount point. A partition mounted after construction is not
//! seen until the source is rebuilt.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sysprobe_common::{Dimension, MOUNT_POINT, MetricEnvelope, ReportCategory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::barrier::CompletionBarrier;
use crate::config::DiskConfig;
use crate::convert::{NamedMetric, Sample, sample};
use crate::error::SourceError;
use crate::logger::SourceLogger;
use crate::platform;
use crate::source::{MetricSource, emit};

/// A mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub device: String,
    pub fs_type: String,
    pub mount_point: String,
}

impl Partition {
    pub fn new(
        device: impl Into<String>,
        fs_type: impl Into<String>,
        mount_point: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            fs_type: fs_type.into(),
            mount_point: mount_point.into(),
        }
    }

    /// Pseudo filesystems may have no device or type; those are never sampled.
    pub fn is_collectible(&self) -> bool {
        !self.device.is_empty() && !self.fs_type.is_empty()
    }
}

/// Space usage of one filesystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStat {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

impl UsageStat {
    pub fn new(total: u64, used: u64, free: u64) -> Self {
        Self {
            total,
            used,
            free,
            used_percent: used_percent(used, free),
        }
    }

    /// Compute usage from `statvfs` block counts.
    ///
    /// `free` counts blocks available to unprivileged users, while `used`
    /// excludes every free block, so `used + free` may be less than `total`.
    pub fn from_blocks(
        blocks: u64,
        blocks_free: u64,
        blocks_available: u64,
        fragment_size: u64,
    ) -> Self {
        let total = blocks.saturating_mul(fragment_size);
        let free = blocks_available.saturating_mul(fragment_size);
        let used = blocks
            .saturating_sub(blocks_free)
            .saturating_mul(fragment_size);
        Self::new(total, used, free)
    }

    /// Readings emitted for this partition.
    pub fn to_sample(&self) -> Sample {
        sample([
            ("total", self.total as f64),
            ("used", self.used as f64),
            ("free", self.free as f64),
            ("in_use", self.used_percent),
        ])
    }
}

fn used_percent(used: u64, free: u64) -> f64 {
    let denominator = used as f64 + free as f64;
    if denominator > 0.0 {
        used as f64 / denominator * 100.0
    } else {
        0.0
    }
}

/// Host queries the disk source depends on.
#[async_trait]
pub trait DiskProbe: Send + Sync {
    /// List mounted filesystems.
    fn partitions(&self) -> Result<Vec<Partition>, SourceError>;

    /// Query current usage of the filesystem mounted at `mount_point`.
    async fn usage(&self, mount_point: &str) -> Result<UsageStat, SourceError>;
}

type UsageQuery = dyn Fn(&str) -> Result<UsageStat, SourceError> + Send + Sync;

/// The running host.
///
/// Usage queries run on the blocking pool. A mount whose previous query has
/// not returned is refused instead of queried again, so a hung filesystem
/// holds at most one blocking thread however many rounds time out on it.
#[derive(Clone)]
pub struct HostDisks {
    query: Arc<UsageQuery>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl HostDisks {
    pub fn new() -> Self {
        Self::with_query(platform::usage)
    }

    /// Use `query` in place of the platform `statvfs` call.
    pub fn with_query<F>(query: F) -> Self
    where
        F: Fn(&str) -> Result<UsageStat, SourceError> + Send + Sync + 'static,
    {
        Self {
            query: Arc::new(query),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mount points whose query has not returned yet.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl Default for HostDisks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostDisks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDisks")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears a mount from the in-flight set when its blocking query returns.
struct InFlight {
    set: Arc<Mutex<HashSet<String>>>,
    mount_point: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.mount_point);
    }
}

#[async_trait]
impl DiskProbe for HostDisks {
    fn partitions(&self) -> Result<Vec<Partition>, SourceError> {
        platform::partitions()
    }

    async fn usage(&self, mount_point: &str) -> Result<UsageStat, SourceError> {
        if !lock(&self.in_flight).insert(mount_point.to_string()) {
            return Err(SourceError::usage(
                mount_point,
                "previous query still pending",
            ));
        }

        let slot = InFlight {
            set: Arc::clone(&self.in_flight),
            mount_point: mount_point.to_string(),
        };
        let query = Arc::clone(&self.query);

        tokio::task::spawn_blocking(move || {
            let usage = query(&slot.mount_point);
            drop(slot);
            usage
        })
        .await
        .map_err(|_| SourceError::Interrupted(mount_point.to_string()))?
    }
}

/// Enumerate partitions once, keeping those the filter accepts.
///
/// A failure yields an empty list: the source then performs empty passes.
pub fn enumerate<P: DiskProbe>(probe: &P, filter: &DiskConfig) -> Vec<Partition> {
    match probe.partitions() {
        Ok(partitions) => partitions
            .into_iter()
            .filter(|p| filter.should_include(&p.mount_point, &p.fs_type))
            .collect(),
        Err(e) => {
            warn!(error = %e, "Disk source starting without partitions");
            Vec::new()
        }
    }
}

/// Source emitting usage of every mounted filesystem.
pub struct DiskSource<P = HostDisks> {
    named: NamedMetric,
    logger: SourceLogger,
    probe: P,
    partitions: Vec<Partition>,
}

impl DiskSource<HostDisks> {
    /// Create a source for the running host.
    pub fn new(namespace: impl Into<String>, filter: &DiskConfig) -> Self {
        Self::with_probe(namespace, HostDisks::new(), filter)
    }
}

impl<P: DiskProbe> DiskSource<P> {
    /// Create a source over an arbitrary probe.
    pub fn with_probe(namespace: impl Into<String>, probe: P, filter: &DiskConfig) -> Self {
        let partitions = enumerate(&probe, filter);
        debug!(count = partitions.len(), "Enumerated disk partitions");

        Self {
            named: NamedMetric::new(namespace, "disk"),
            logger: SourceLogger::default(),
            probe,
            partitions,
        }
    }

    /// Set the window in which repeated failures are logged once.
    pub fn with_log_throttle(mut self, throttle: Duration) -> Self {
        self.logger = SourceLogger::new(throttle);
        self
    }

    /// The partition snapshot taken at construction.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn logger(&self) -> &SourceLogger {
        &self.logger
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

#[async_trait]
impl<P: DiskProbe> MetricSource for DiskSource<P> {
    fn name(&self) -> &str {
        self.named.group()
    }

    async fn collect(
        &self,
        ctx: CancellationToken,
        barrier: CompletionBarrier,
        out: mpsc::Sender<MetricEnvelope>,
    ) {
        let _release = barrier.release_on_drop();

        for part in &self.partitions {
            if !part.is_collectible() {
                continue;
            }

            let usage = tokio::select! {
                biased;
                _ = ctx.cancelled() => return,
                usage = self.probe.usage(&part.mount_point) => usage,
            };

            let usage = match usage {
                Ok(usage) => usage,
                Err(e) => {
                    self.logger.log(&format!(
                        "Failed to get disk metrics for mount point {}, {}",
                        part.mount_point, e
                    ));
                    continue;
                }
            };

            let metrics = self.named.convert(&usage.to_sample());

            // Mount point varies per envelope, so it is not a common dimension.
            let envelope = MetricEnvelope::new(
                vec![Dimension::new(MOUNT_POINT, part.mount_point.clone())],
                metrics,
                ReportCategory::System,
            );

            if !emit(&ctx, &out, envelope).await {
                return;
            }
        }
    }
}
