//! Cooperative cancellation token.

use crate::error::{AstroError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cancellation that can be checked or awaited.
pub trait Cancellable {
    /// Check if cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Request cancellation.
    fn cancel(&self);
}

/// Clonable token shared between a caller and a running agent.
///
/// Cancelling is sticky: once set it never resets.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled).
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellable for CancellationToken {
    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    fn cancel(&self) {
        self.cancelled.send_replace(true);
    }
}

/// Run one external call under a deadline, aborting it on cancellation.
pub async fn guarded<T, F>(
    token: &CancellationToken,
    stage: &str,
    limit: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(AstroError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AstroError::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(AstroError::timeout(stage, limit.as_millis() as u64)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky_and_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_guarded_times_out() {
        let token = CancellationToken::new();
        let err = guarded(&token, "execution", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AstroError::Timeout { ref stage, after_ms: 10 } if stage == "execution"));
    }

    #[tokio::test]
    async fn test_guarded_aborts_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = guarded(&token, "generation", Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AstroError::Cancelled));
    }

    #[tokio::test]
    async fn test_guarded_passes_result_through() {
        let token = CancellationToken::new();
        let value = guarded(&token, "embedding", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
