//! Agent runner: periodic rounds until shutdown.

use std::sync::Arc;

use sysprobe_common::MetricEnvelope;
use tokio::io::AsyncWrite;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SysprobeConfig;
use crate::disk::DiskSource;
use crate::memory::MemorySource;
use crate::round::{Coordinator, RoundReport};
use crate::sink::EnvelopeSink;
use crate::source::MetricSource;

/// Build the sources enabled in the configuration.
pub fn sources_from_config(config: &SysprobeConfig) -> Vec<Arc<dyn MetricSource>> {
    let mut sources: Vec<Arc<dyn MetricSource>> = Vec::new();
    let namespace = &config.agent.namespace;

    if config.sources.disk {
        let disk = DiskSource::new(namespace.clone(), &config.disk)
            .with_log_throttle(config.agent.log_throttle());
        info!(partitions = disk.partitions().len(), "Disk source enabled");
        sources.push(Arc::new(disk));
    }

    if config.sources.memory {
        sources.push(Arc::new(MemorySource::new(namespace.clone())));
    }

    sources
}

/// Runs collection rounds and writes every envelope to a sink.
///
/// Handles:
/// - Source construction from configuration
/// - One round per poll interval, drained before the next starts
/// - Graceful shutdown on Ctrl+C
pub struct AgentRunner<W = tokio::io::Stdout> {
    config: SysprobeConfig,
    coordinator: Coordinator,
    receiver: mpsc::Receiver<MetricEnvelope>,
    sink: EnvelopeSink<W>,
    shutdown: CancellationToken,
}

impl AgentRunner<tokio::io::Stdout> {
    /// Create a runner writing to stdout with the configured sources.
    pub fn new(config: SysprobeConfig) -> Self {
        let sources = sources_from_config(&config);
        Self::with_sources(config, sources, tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin> AgentRunner<W> {
    /// Create a runner over explicit sources and output.
    pub fn with_sources(
        config: SysprobeConfig,
        sources: Vec<Arc<dyn MetricSource>>,
        writer: W,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.agent.channel_capacity.max(1));
        let coordinator =
            Coordinator::new(sources, sender).with_round_timeout(config.agent.round_timeout());
        let sink = EnvelopeSink::new(writer, config.base.serialization);

        Self {
            config,
            coordinator,
            receiver,
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the runner (and cancels the round in flight).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn sink(&self) -> &EnvelopeSink<W> {
        &self.sink
    }

    /// Run one round and write its envelopes.
    pub async fn run_once(&mut self) -> sysprobe_common::Result<RoundReport> {
        let round = self.coordinator.start_round(&self.shutdown);
        let report = round.drain(&mut self.receiver).await;

        for envelope in &report.envelopes {
            self.sink.write(envelope).await?;
        }
        self.sink.flush().await?;

        debug!(
            envelopes = report.envelopes.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Round written"
        );

        Ok(report)
    }

    /// Run rounds every poll interval until the shutdown token is cancelled.
    pub async fn run_until_cancelled(&mut self) -> sysprobe_common::Result<()> {
        let mut ticker = tokio::time::interval(self.config.agent.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            sources = self.coordinator.sources().len(),
            interval_secs = self.config.agent.poll_interval_secs,
            "Agent running"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.run_once().await?;
        }

        Ok(())
    }

    /// Run until Ctrl+C is received.
    pub async fn run(mut self) -> sysprobe_common::Result<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("Received shutdown signal");
            shutdown.cancel();
        });

        self.run_until_cancelled().await?;

        info!(envelopes = self.sink.written(), "Goodbye!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sysprobe_common::{Format, ReportCategory, SimpleMetric, decode};

    use crate::barrier::CompletionBarrier;
    use crate::source::emit;

    struct ConstSource;

    #[async_trait::async_trait]
    impl MetricSource for ConstSource {
        fn name(&self) -> &str {
            "const"
        }

        async fn collect(
            &self,
            ctx: CancellationToken,
            barrier: CompletionBarrier,
            out: mpsc::Sender<MetricEnvelope>,
        ) {
            let _release = barrier.release_on_drop();
            let envelope = MetricEnvelope::new(
                Vec::new(),
                vec![SimpleMetric::gauge("answer", 42.0)],
                ReportCategory::Agent,
            );
            emit(&ctx, &out, envelope).await;
        }
    }

    fn const_sources(n: usize) -> Vec<Arc<dyn MetricSource>> {
        (0..n)
            .map(|_| Arc::new(ConstSource) as Arc<dyn MetricSource>)
            .collect()
    }

    fn config() -> SysprobeConfig {
        let mut config = SysprobeConfig::default();
        config.agent.poll_interval_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_run_once_writes_envelopes() {
        let mut runner = AgentRunner::with_sources(config(), const_sources(2), Vec::new());

        let report = runner.run_once().await.unwrap();
        assert_eq!(report.launched, 2);
        assert_eq!(report.envelopes.len(), 2);
        assert_eq!(runner.sink().written(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut runner = AgentRunner::with_sources(config(), const_sources(1), Vec::new());
        let shutdown = runner.shutdown_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), runner.run_until_cancelled())
            .await
            .expect("runner should stop")
            .unwrap();

        // The first tick fires immediately.
        assert_eq!(runner.sink().written(), 1);
    }

    #[tokio::test]
    async fn test_output_decodes() {
        let mut runner = AgentRunner::with_sources(config(), const_sources(1), Vec::new());
        runner.run_once().await.unwrap();

        let AgentRunner { sink, .. } = runner;
        let output = sink.into_inner();
        let envelope: MetricEnvelope = decode(output.trim_ascii_end(), Format::Json).unwrap();
        assert_eq!(envelope.metric("answer"), Some(42.0));
        assert_eq!(envelope.category, ReportCategory::Agent);
    }

    #[test]
    fn test_sources_from_config() {
        let mut config = SysprobeConfig::default();
        config.sources.disk = false;

        let sources = sources_from_config(&config);
        let names: Vec<_> = sources.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["mem"]);
    }
}
