//! Throttled failure logging for metric sources.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default window during which an identical message is logged only once.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(3600);

/// Logger owned by a source for per-target failures.
///
/// The first occurrence of a message is always logged. Repeats inside the
/// throttle window are dropped so a permanently broken mount point does not
/// log on every round.
#[derive(Debug)]
pub struct SourceLogger {
    throttle: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
    emitted: AtomicU64,
}

impl SourceLogger {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_logged: Mutex::new(HashMap::new()),
            emitted: AtomicU64::new(0),
        }
    }

    /// Log `message` at warn level unless it was logged within the window.
    ///
    /// Returns whether a line was written.
    pub fn log(&self, message: &str) -> bool {
        let now = Instant::now();
        {
            let mut last_logged = self
                .last_logged
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(at) = last_logged.get(message) {
                if now.duration_since(*at) < self.throttle {
                    return false;
                }
            }
            last_logged.insert(message.to_string(), now);
        }

        tracing::warn!("{}", message);
        self.emitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of lines written so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Default for SourceLogger {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE)
    }
}
