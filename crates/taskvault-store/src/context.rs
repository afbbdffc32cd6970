//! Deadline and cancellation carried into every store call.

use std::future::{self, Future};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};

/// Per-call context: a cancellation token plus an optional deadline.
///
/// Clones share the same token. [`child`](Self::child) derives a context that
/// is cancelled with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context expiring at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context. The earlier of both deadlines applies.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context with an additional timeout.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called on this context or a parent.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast when the context is already done.
    ///
    /// # Errors
    /// [`StoreError::Cancelled`] or [`StoreError::DeadlineExceeded`].
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// The future is dropped when the context wins, so only pass work that is
    /// safe to abandon.
    ///
    /// # Errors
    /// [`StoreError::Cancelled`] or [`StoreError::DeadlineExceeded`].
    pub async fn run<F>(&self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.check()?;
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(StoreError::Cancelled),
            () = expiry => Err(StoreError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
