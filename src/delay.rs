use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operator-adjustable per-frame delay, shared across every session task.
///
/// One writer (the control listener), many readers (the session receive
/// loops). Readers may observe a stale value for a short interval; the delay
/// is a best-effort throttle, not a correctness mechanism, so relaxed
/// ordering is enough.
#[derive(Debug, Clone, Default)]
pub struct DelayCell {
    millis: Arc<AtomicU64>,
}

impl DelayCell {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Current delay in milliseconds.
    pub fn get(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    /// Replace the delay; visible to all sessions on their next frame.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    /// Sleep for the current delay, if any.
    pub async fn wait(&self) {
        let millis = self.get();
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
