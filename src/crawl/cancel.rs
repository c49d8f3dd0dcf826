use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Per-job cancellation flag with a wake-up primitive.
///
/// Clones share the same flag. A token is created with its job and is never
/// reused for another one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Calling this more than once has no further effect.
    pub fn request(&self) {
        self.inner.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Wait for a cancel request for at most `timeout`.
    ///
    /// Returns true if woken by cancellation, false if the timeout elapsed
    /// first.
    pub async fn wait_until_cancelled_or(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.inner.cancelled())
            .await
            .is_ok()
    }

    /// A cheap `should_cancel` callback bound to this token.
    pub fn checker(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let inner = self.inner.clone();
        move || inner.is_cancelled()
    }
}
