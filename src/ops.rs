/**
 * Cooperative Cancellation
 *
 * DESIGN DECISION: A cheap `Arc<AtomicBool>` flag rather than pulling in a
 * dedicated cancellation-token crate
 * WHY: the façade only needs a single boolean "stop now" signal checked at
 * phase boundaries between Analyzer/Planner/Optimizer passes — a full
 * hierarchical cancellation tree is more machinery than one flag needs.
 *
 * PATTERN: Pattern-001 (Planning Core), extending an `Arc<AtomicBool>`
 * shutdown-flag idiom from server loops to the façade's async operations.
 */

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation signal shared between a caller and the
/// façade operation it invoked. Cancelling is a one-way latch: once set,
/// a token never un-cancels.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` if the token has been cancelled,
    /// otherwise `Ok(())`. Intended to be called at phase boundaries inside
    /// a long-running façade operation.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs `fut`, racing it against the caller-supplied timeout. A `None`
/// timeout means no deadline is enforced.
pub async fn with_timeout<T>(
    timeout: Option<std::time::Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        None => fut.await,
        Some(duration) => match tokio::time::timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(duration)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn with_timeout_returns_timeout_error_when_exceeded() {
        let result = with_timeout(Some(std::time::Duration::from_millis(10)), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_without_deadline() {
        let result = with_timeout(None, async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
