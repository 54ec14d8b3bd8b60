//! The contract every metric source implements.

use async_trait::async_trait;
use sysprobe_common::MetricEnvelope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::barrier::CompletionBarrier;

/// A probe that samples one category of host state and emits envelopes.
///
/// `collect` runs one pass over the source's targets. Implementations must:
/// - release `barrier` exactly once on every exit path (take
///   [`CompletionBarrier::release_on_drop`] first thing);
/// - stop as soon as `ctx` is cancelled, without sending anything further;
/// - contain their own failures: nothing is returned to the coordinator.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Source name (e.g. `"disk"`), used for logging.
    fn name(&self) -> &str;

    async fn collect(
        &self,
        ctx: CancellationToken,
        barrier: CompletionBarrier,
        out: mpsc::Sender<MetricEnvelope>,
    );
}

/// Send an envelope unless the round is cancelled first.
///
/// Blocks while the channel is full. Returns `false` when the source should
/// stop: the round was cancelled or the consumer is gone.
pub async fn emit(
    ctx: &CancellationToken,
    out: &mpsc::Sender<MetricEnvelope>,
    envelope: MetricEnvelope,
) -> bool {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => false,
        sent = out.send(envelope) => match sent {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Envelope channel closed, stopping source");
                false
            }
        },
    }
}
