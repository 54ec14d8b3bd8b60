//! Completion barrier shared by the sources of one collection round.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    notify: Notify,
}

/// Countdown of source tasks still running in a round.
///
/// The coordinator adds the number of tasks before spawning any of them and
/// every task releases exactly once on exit, so the count reaches zero exactly
/// when the last task has terminated.
#[derive(Debug, Clone, Default)]
pub struct CompletionBarrier {
    inner: Arc<Inner>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` more tasks.
    pub fn add(&self, n: usize) {
        self.inner.pending.fetch_add(n, Ordering::AcqRel);
    }

    /// Mark one task as finished.
    ///
    /// Extra calls past zero are ignored and logged.
    pub fn done(&self) {
        let previous =
            self.inner
                .pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.inner.notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("Completion barrier released more times than registered"),
        }
    }

    /// Number of tasks that have not released yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    /// Release once when the returned guard is dropped.
    ///
    /// Hold the guard for the whole body of a task so every exit path
    /// (return, cancellation, panic) releases exactly once.
    pub fn release_on_drop(&self) -> BarrierGuard {
        BarrierGuard {
            barrier: self.clone(),
        }
    }

    /// Wait until every registered task has released.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_complete() {
                return;
            }

            notified.await;
        }
    }
}

/// Scoped release of one [`CompletionBarrier`] slot.
#[derive(Debug)]
#[must_use = "the barrier is released as soon as the guard is dropped"]
pub struct BarrierGuard {
    barrier: CompletionBarrier,
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.barrier.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_add_and_done() {
        let barrier = CompletionBarrier::new();
        assert!(barrier.is_complete());

        barrier.add(3);
        assert_eq!(barrier.pending(), 3);

        barrier.done();
        barrier.done();
        assert_eq!(barrier.pending(), 1);

        barrier.done();
        assert!(barrier.is_complete());
    }

    #[test]
    fn test_done_past_zero_is_ignored() {
        let barrier = CompletionBarrier::new();
        barrier.done();
        assert_eq!(barrier.pending(), 0);

        barrier.add(1);
        assert_eq!(barrier.pending(), 1);
    }

    #[test]
    fn test_guard_releases_once() {
        let barrier = CompletionBarrier::new();
        barrier.add(2);

        {
            let _guard = barrier.release_on_drop();
            assert_eq!(barrier.pending(), 2);
        }

        assert_eq!(barrier.pending(), 1);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_empty() {
        let barrier = CompletionBarrier::new();
        tokio::time::timeout(Duration::from_millis(100), barrier.wait())
            .await
            .expect("wait should not block on an empty barrier");
    }

    #[tokio::test]
    async fn test_wait_until_all_released() {
        let barrier = CompletionBarrier::new();
        barrier.add(4);

        for i in 0..4u64 {
            let guard = barrier.release_on_drop();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * (4 - i))).await;
                drop(guard);
            });
        }

        tokio::time::timeout(Duration::from_secs(2), barrier.wait())
            .await
            .expect("barrier should drain");
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_on_panic() {
        let barrier = CompletionBarrier::new();
        barrier.add(1);

        let guard = barrier.release_on_drop();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("source blew up");
        });

        assert!(handle.await.is_err());
        assert!(barrier.is_complete());
    }
}
