//! Collection rounds: concurrent fan-in of every source into one channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysprobe_common::MetricEnvelope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::barrier::CompletionBarrier;
use crate::source::MetricSource;

/// Launches every source concurrently, once per round.
///
/// All sources share one bounded channel. A source whose send finds the
/// channel full waits until the consumer frees a slot or the round is
/// cancelled, so rounds must be drained while they run (see [`Round::drain`]).
pub struct Coordinator {
    sources: Vec<Arc<dyn MetricSource>>,
    sender: mpsc::Sender<MetricEnvelope>,
    round_timeout: Option<Duration>,
}

impl Coordinator {
    pub fn new(
        sources: Vec<Arc<dyn MetricSource>>,
        sender: mpsc::Sender<MetricEnvelope>,
    ) -> Self {
        Self {
            sources,
            sender,
            round_timeout: None,
        }
    }

    /// Cancel rounds that run longer than `timeout`.
    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn sources(&self) -> &[Arc<dyn MetricSource>] {
        &self.sources
    }

    /// Start one round.
    ///
    /// The barrier is charged with the number of sources before any task is
    /// spawned, so it cannot read zero while sources are still starting.
    /// Cancelling `parent` cancels the round.
    pub fn start_round(&self, parent: &CancellationToken) -> Round {
        let ctx = parent.child_token();
        let barrier = CompletionBarrier::new();
        barrier.add(self.sources.len());

        let tasks = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let ctx = ctx.clone();
                let barrier = barrier.clone();
                let out = self.sender.clone();
                tokio::spawn(async move { source.collect(ctx, barrier, out).await })
            })
            .collect();

        if let Some(timeout) = self.round_timeout {
            spawn_deadline(ctx.clone(), barrier.clone(), timeout);
        }

        debug!(sources = self.sources.len(), "Collection round started");

        Round {
            ctx,
            barrier,
            launched: self.sources.len(),
            started: Instant::now(),
            tasks,
        }
    }
}

fn spawn_deadline(ctx: CancellationToken, barrier: CompletionBarrier, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = barrier.wait() => {}
            _ = ctx.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    pending = barrier.pending(),
                    "Collection round deadline reached, cancelling sources"
                );
                ctx.cancel();
            }
        }
    });
}

/// A running collection round.
pub struct Round {
    ctx: CancellationToken,
    barrier: CompletionBarrier,
    launched: usize,
    started: Instant,
    tasks: Vec<JoinHandle<()>>,
}

impl Round {
    /// Barrier tracking the sources still running.
    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Cancel every source of this round.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Wait for every source to finish without reading the channel.
    ///
    /// Only safe when the channel has room for everything the round emits or
    /// another task is draining it.
    pub async fn wait(self) -> RoundReport {
        self.barrier.wait().await;
        self.finish(Vec::new()).await
    }

    /// Read envelopes until every source has finished, then take whatever is
    /// still buffered.
    ///
    /// Sources send before releasing the barrier, so once it reads zero the
    /// channel holds everything this round produced. Rounds sharing a
    /// receiver must not overlap.
    pub async fn drain(self, receiver: &mut mpsc::Receiver<MetricEnvelope>) -> RoundReport {
        let mut envelopes = Vec::new();

        loop {
            tokio::select! {
                biased;
                Some(envelope) = receiver.recv() => envelopes.push(envelope),
                _ = self.barrier.wait() => break,
            }
        }

        while let Ok(envelope) = receiver.try_recv() {
            envelopes.push(envelope);
        }

        self.finish(envelopes).await
    }

    async fn finish(self, envelopes: Vec<MetricEnvelope>) -> RoundReport {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Source task failed");
            }
        }

        let report = RoundReport {
            launched: self.launched,
            envelopes,
            elapsed: self.started.elapsed(),
            cancelled: self.ctx.is_cancelled(),
        };

        debug!(
            sources = report.launched,
            envelopes = report.envelopes.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            cancelled = report.cancelled,
            "Collection round finished"
        );

        report
    }
}

/// Outcome of one drained round.
#[derive(Debug)]
pub struct RoundReport {
    /// Number of sources launched.
    pub launched: usize,
    /// Envelopes emitted, per-source order preserved.
    pub envelopes: Vec<MetricEnvelope>,
    pub elapsed: Duration,
    /// Whether the round was cancelled (deadline or shutdown) before finishing.
    pub cancelled: bool,
}
