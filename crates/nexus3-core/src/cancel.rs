//! Cancellation Token (C1) — a single-writer cooperative cancel flag.
//!
//! Built atop `tokio_util::sync::CancellationToken`, but wrapped so the rest
//! of the codebase depends on our contract, not tokio's: `cancelled()`,
//! `cancel()`, and `raise_if_cancelled()` that fails with [`Error::Cancelled`].
//! Checks happen only at explicit points (before a provider request, between
//! streamed chunks, before and between tool executions); a token is created
//! once per request and never reused.

use crate::error::{Error, Result};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn raise_if_cancelled(&self) -> Result<()> {
        if self.cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Awaits until cancelled; intended for use inside `tokio::select!`.
    pub async fn cancelled_fut(&self) {
        self.0.cancelled().await
    }

    /// A token tied to this one's lifetime, for scoping a sub-operation
    /// (e.g. a single tool call) without affecting the parent's state.
    pub fn child_token(&self) -> Self {
        Self(self.0.child_token())
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
    fn fresh_token_is_not_cancelled() {
        let t = CancelToken::new();
        assert!(!t.cancelled());
        assert!(t.raise_if_cancelled().is_ok());
    }

    #[test]
    fn cancel_is_observed_immediately() {
        let t = CancelToken::new();
        t.cancel();
        assert!(t.cancelled());
        assert!(matches!(t.raise_if_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn cancel_is_permanent() {
        let t = CancelToken::new();
        t.cancel();
        t.cancel(); // idempotent
        assert!(t.cancelled());
    }

    #[tokio::test]
    async fn cancelled_fut_resolves_after_cancel() {
        let t = CancelToken::new();
        let t2 = t.clone();
        tokio::spawn(async move {
            t2.cancel();
        });
        t.cancelled_fut().await;
        assert!(t.cancelled());
    }
}
