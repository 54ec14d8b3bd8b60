//! Virtual memory source.

use std::sync::Mutex;

use async_trait::async_trait;
use sysinfo::System;
use sysprobe_common::{MetricEnvelope, ReportCategory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::barrier::CompletionBarrier;
use crate::convert::{NamedMetric, Sample, sample};
use crate::source::{MetricSource, emit};

/// Source emitting host-wide memory totals in a single envelope.
pub struct MemorySource {
    named: NamedMetric,
    system: Mutex<System>,
}

impl MemorySource {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            named: NamedMetric::new(namespace, "mem"),
            system: Mutex::new(System::new()),
        }
    }

    fn sample(&self) -> Sample {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let pct_used = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        sample([
            ("total", total as f64),
            ("available", system.available_memory() as f64),
            ("used", used as f64),
            ("free", system.free_memory() as f64),
            ("pct_used", pct_used),
        ])
    }
}

#[async_trait]
impl MetricSource for MemorySource {
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

        if ctx.is_cancelled() {
            return;
        }

        let metrics = self.named.convert(&self.sample());
        let envelope = MetricEnvelope::new(Vec::new(), metrics, ReportCategory::System);
        emit(&ctx, &out, envelope).await;
    }
}
