//! Cancellation and deadlines for wait loops.
//!
//! A [`Context`] couples a [`CancellationToken`] with an optional deadline. Every retry and
//! poll call takes one; cancelling it interrupts an in-progress backoff sleep immediately, and
//! probes receive derived child contexts so they can observe the same signal.
//!
//! Semantics:
//! - Children inherit cancellation from their parents, never the reverse.
//! - A child's deadline is the earlier of its own and its parent's.
//! - [`Context::err`] reports `Canceled` once the token fires, otherwise `DeadlineExceeded` once
//!   the deadline has passed.
//! - [`Context::cause`] additionally surfaces a custom cause recorded with
//!   [`Context::cancel_with_cause`] on this context or any ancestor.
//!
//! Time is read from `tokio::time::Instant`, so tests can drive deadlines with a paused clock.
//!
//! Example
//! ```rust
//! use statewait::{Context, ContextError};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let root = Context::background();
//! let scoped = root.with_timeout(Duration::from_secs(30));
//! assert!(scoped.err().is_none());
//!
//! root.cancel_with_cause("shutting down");
//! assert_eq!(scoped.err(), Some(ContextError::Canceled));
//! assert_eq!(scoped.cause(), Some(ContextError::Cause("shutting down".into())));
//! # });
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`Context`] stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context was cancelled without a recorded cause.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The context was cancelled with a caller-supplied cause.
    #[error("{0}")]
    Cause(String),
}

impl ContextError {
    /// True for explicit cancellation, with or without a cause.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::Cause(_))
    }

    /// True when the deadline elapsed.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

#[derive(Debug)]
struct Scope {
    token: CancellationToken,
    cause: OnceLock<String>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    fn root() -> Self {
        Self { token: CancellationToken::new(), cause: OnceLock::new(), parent: None }
    }
}

/// Cancellation token plus optional deadline, cheap to clone.
#[derive(Debug, Clone)]
pub struct Context {
    scope: Arc<Scope>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self { scope: Arc::new(Scope::root()), deadline: None }
    }

    /// Derive a child that can be cancelled on its own and is cancelled with `self`.
    pub fn child(&self) -> Self {
        let scope = Scope {
            token: self.scope.token.child_token(),
            cause: OnceLock::new(),
            parent: Some(Arc::clone(&self.scope)),
        };
        Self { scope: Arc::new(scope), deadline: self.deadline }
    }

    /// Derive a child whose deadline is the earlier of `deadline` and the parent's.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    /// Derive a child that expires `timeout` from now (or with the parent, if sooner).
    ///
    /// Timeouts too large to represent leave the parent's deadline unchanged.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.scope.token.cancel();
    }

    /// Cancel with a cause reported by [`Context::cause`]. The first cancellation wins.
    pub fn cancel_with_cause(&self, cause: impl Into<String>) {
        if !self.scope.token.is_cancelled() {
            let _ = self.scope.cause.set(cause.into());
        }
        self.scope.token.cancel();
    }

    /// True once this context (or an ancestor) was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.scope.token.is_cancelled()
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.scope.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Like [`Context::err`], but prefers a recorded cancellation cause.
    pub fn cause(&self) -> Option<ContextError> {
        let err = self.err()?;
        if err != ContextError::Canceled {
            return Some(err);
        }
        let mut scope = Some(&self.scope);
        while let Some(current) = scope {
            if let Some(cause) = current.cause.get() {
                return Some(ContextError::Cause(cause.clone()));
            }
            scope = current.parent.as_ref();
        }
        Some(err)
    }

    /// `Err` with the current [`ContextError`] once the context is done.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.scope.token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            },
            None => self.scope.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
