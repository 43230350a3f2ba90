// src/core/cancel.rs
//
// Cooperative cancellation shared by every analyzer of one file. Long-running
// analyzers call `checkpoint()` between rows / frames / windows. A file's
// token is derived from the caller's, so cancelling a batch reaches every
// file while each file keeps its own deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{DetectionError, Result};

#[derive(Debug)]
struct Shared {
    cancelled: AtomicBool,
    expired: AtomicBool,
    deadline: Option<(Instant, u64)>,
    parent: Option<CancelToken>,
}

/// Clonable handle; all clones observe the same cancellation state
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    /// Token with no deadline; only `cancel()` stops work
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Token that expires `budget_ms` milliseconds from now
    pub fn with_deadline(budget_ms: u64) -> Self {
        let deadline = Instant::now() + Duration::from_millis(budget_ms);
        Self::build(Some((deadline, budget_ms)))
    }

    pub fn from_timeout(timeout_ms: Option<u64>) -> Self {
        match timeout_ms {
            Some(ms) => Self::with_deadline(ms),
            None => Self::new(),
        }
    }

    /// Token that stops when this one is cancelled or when its own deadline
    /// passes. Cancelling the child leaves this token untouched.
    pub fn child(&self, timeout_ms: Option<u64>) -> Self {
        let deadline = timeout_ms.map(|ms| (Instant::now() + Duration::from_millis(ms), ms));
        Self {
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                expired: AtomicBool::new(false),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    fn build(deadline: Option<(Instant, u64)>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                expired: AtomicBool::new(false),
                deadline,
                parent: None,
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    /// Explicitly cancelled, here or on an ancestor
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
            || self.shared.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    pub fn budget_ms(&self) -> Option<u64> {
        self.shared.deadline.map(|(_, ms)| ms)
    }

    /// Fails with `Timeout` once this token's or an ancestor's deadline has
    /// passed and with `Cancelled` after an explicit `cancel()` on either.
    /// Expiry is sticky.
    pub fn checkpoint(&self) -> Result<()> {
        if let Some((deadline, budget_ms)) = self.shared.deadline {
            if self.shared.expired.load(Ordering::Relaxed) || Instant::now() >= deadline {
                self.shared.expired.store(true, Ordering::Relaxed);
                return Err(DetectionError::Timeout { budget_ms });
            }
        }
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return Err(DetectionError::Cancelled);
        }
        match &self.shared.parent {
            Some(parent) => parent.checkpoint(),
            None => Ok(()),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        assert_eq!(token.budget_ms(), None);
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(matches!(clone.checkpoint(), Err(DetectionError::Cancelled)));
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancelToken::with_deadline(0);
        assert!(matches!(
            token.checkpoint(),
            Err(DetectionError::Timeout { budget_ms: 0 })
        ));
    }

    #[test]
    fn test_child_follows_parent() {
        let batch = CancelToken::new();
        let file = batch.child(Some(60_000));
        assert!(file.checkpoint().is_ok());
        batch.cancel();
        assert!(file.is_cancelled());
        assert!(matches!(file.checkpoint(), Err(DetectionError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_stays_local() {
        let batch = CancelToken::new();
        let file = batch.child(None);
        file.cancel();
        assert!(!batch.is_cancelled());
        assert!(batch.checkpoint().is_ok());
    }

    #[test]
    fn test_child_keeps_own_deadline() {
        let batch = CancelToken::new();
        let file = batch.child(Some(0));
        assert!(matches!(file.checkpoint(), Err(DetectionError::Timeout { budget_ms: 0 })));
        assert!(batch.checkpoint().is_ok());
    }

    #[test]
    fn test_generous_deadline_passes() {
        let token = CancelToken::with_deadline(60_000);
        assert!(token.checkpoint().is_ok());
    }
}
