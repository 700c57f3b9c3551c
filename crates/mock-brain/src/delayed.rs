//! Latency injection for timeout tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use brain_core::{async_trait, Brain, BrainError, Completion, CompletionRequest};

/// Wraps a brain and sleeps before every completion.
///
/// Pair with `#[tokio::test(start_paused = true)]` so deadlines elapse
/// without wall-clock waiting.
pub struct DelayedBrain<B: Brain> {
    inner: B,
    delay: Duration,
    started: AtomicUsize,
}

impl<B: Brain> DelayedBrain<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            started: AtomicUsize::new(0),
        }
    }

    /// Completions started so far, including ones abandoned mid-delay.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<B: Brain> Brain for DelayedBrain<B> {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BrainError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.complete(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn is_ready(&self) -> bool {
        self.inner.is_ready().await
    }
}
