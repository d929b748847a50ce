//! Predicate-driven retries of a single fallible action
//!
//! An [`Operation`] wraps an async action; attaching a predicate produces a [`Retrier`] that
//! drives a [`BackoffLoop`] until the predicate stops it or the budget runs out.
//!
//! Semantics:
//! - Each iteration runs the action once, then hands its outcome to the predicate.
//! - [`Verdict::Stop`] returns the carried result immediately; [`Verdict::Retry`] keeps going
//!   and remembers the carried error as the last error.
//! - Every action call receives a child [`Context`] expiring with the loop. An action that fails
//!   with a context error because that child expired ends the loop.
//! - When the loop's own budget is spent and no real error was remembered, the call fails with a
//!   [`TimeoutError`] whose last state is `retryableerror` and expected state `success`.
//! - When the caller's context is cancelled first, its cause is returned as
//!   [`WaitError::Context`].
//! - [`Retrier::delay`] and [`Retrier::delay_rand`] add one pause before the first attempt,
//!   drawn from the same budget.
//!
//! Example
//! ```rust
//! use statewait::{Context, Operation, WaitError};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut calls = 0;
//! let mut retrier = Operation::new(move |_ctx| {
//!     calls += 1;
//!     let seen = calls;
//!     async move { Ok::<_, WaitError<std::io::Error>>(seen) }
//! })
//! .until_found_n(3);
//!
//! let seen = retrier.run(&Context::background(), Duration::from_secs(5)).await.unwrap();
//! assert_eq!(seen, 3);
//! # });
//! ```

use crate::{Backoff, BackoffLoop, BackoffOptions, Context, Jitter, TimeoutError, WaitError};
use futures::future::BoxFuture;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;

const RETRY_LAST_STATE: &str = "retryableerror";
const RETRY_EXPECTED_STATE: &str = "success";

type Action<T, E> = Box<dyn FnMut(Context) -> BoxFuture<'static, Result<T, WaitError<E>>> + Send>;
type Predicate<T, E> = Box<dyn FnMut(Result<T, WaitError<E>>) -> Verdict<T, E> + Send>;

/// What a predicate decided about one action outcome.
#[derive(Debug)]
pub enum Verdict<T, E> {
    /// Run the action again, remembering the given error as the last one seen.
    Retry(Option<WaitError<E>>),
    /// Return this result to the caller.
    Stop(Result<T, WaitError<E>>),
}

/// A retriable async action.
pub struct Operation<T, E> {
    action: Action<T, E>,
}

impl<T, E> fmt::Debug for Operation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("action", &"<action>").finish()
    }
}

impl<T, E> Operation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wrap `action`; nothing runs until a retrier built from it is run.
    pub fn new<F, Fut>(mut action: F) -> Self
    where
        F: FnMut(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, WaitError<E>>> + Send + 'static,
    {
        Self { action: Box::new(move |ctx| Box::pin(action(ctx))) }
    }

    /// Retry until `predicate` returns [`Verdict::Stop`].
    pub fn retry_if<P>(self, predicate: P) -> Retrier<T, E>
    where
        P: FnMut(Result<T, WaitError<E>>) -> Verdict<T, E> + Send + 'static,
    {
        Retrier {
            action: self.action,
            predicate: Box::new(predicate),
            options: BackoffOptions::default(),
            delay: Duration::ZERO,
            delay_rand: Duration::ZERO,
        }
    }

    /// Succeed once the action has succeeded `n` times in a row.
    ///
    /// A not-found error restarts the count and is retried; any other error stops immediately.
    /// `n < 1` is treated as `1`.
    pub fn until_found_n(self, n: usize) -> Retrier<T, E> {
        let needed = n.max(1);
        let mut found = 0usize;
        self.retry_if(move |outcome| match outcome {
            Ok(value) => {
                found += 1;
                if found >= needed {
                    Verdict::Stop(Ok(value))
                } else {
                    Verdict::Retry(None)
                }
            }
            Err(err) if err.is_not_found() => {
                found = 0;
                Verdict::Retry(Some(err))
            }
            Err(err) => Verdict::Stop(Err(err)),
        })
    }

    /// Retry while the action reports not-found; stop at the first success or other error.
    pub fn retry_when_not_found(self) -> Retrier<T, E> {
        self.until_found_n(1)
    }

    /// Retry while `retryable` accepts the error; stop at the first success or other error.
    pub fn retry_when<R>(self, retryable: R) -> Retrier<T, E>
    where
        R: Fn(&WaitError<E>) -> bool + Send + 'static,
    {
        self.retry_if(move |outcome| match outcome {
            Err(err) if retryable(&err) => Verdict::Retry(Some(err)),
            other => Verdict::Stop(other),
        })
    }

    /// Like [`Operation::retry_when_not_found`] for an object this caller just created, which
    /// may take a while to become visible. For an existing object not-found is final.
    pub fn retry_when_new_resource_not_found(self, is_new: bool) -> Retrier<T, E> {
        self.retry_when(move |err| is_new && err.is_not_found())
    }

    /// Wait for the action to report not-found.
    ///
    /// Successful calls mean the object still exists and are retried. If the budget runs out
    /// while it is still found, the call fails with [`WaitError::FoundResource`].
    pub fn until_not_found(self) -> UntilNotFound<E> {
        let mut action = self.action;
        let gone = Operation::<(), E>::new(move |ctx| {
            let found = action(ctx);
            async move { found.await.map(|_| ()) }
        })
        .retry_if(|outcome| match outcome {
            Ok(()) => Verdict::Retry(None),
            Err(err) if err.is_not_found() => Verdict::Stop(Ok(())),
            Err(err) => Verdict::Stop(Err(err)),
        });
        UntilNotFound { retrier: gone }
    }
}

/// An operation bound to a predicate, ready to run.
pub struct Retrier<T, E> {
    action: Action<T, E>,
    predicate: Predicate<T, E>,
    options: BackoffOptions,
    delay: Duration,
    delay_rand: Duration,
}

impl<T, E> fmt::Debug for Retrier<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("action", &"<action>")
            .field("predicate", &"<predicate>")
            .field("options", &self.options)
            .field("delay", &self.delay)
            .field("delay_rand", &self.delay_rand)
            .finish()
    }
}

impl<T, E> Retrier<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Replace the backoff, jitter, and sleeper used between attempts.
    pub fn with_options(mut self, options: BackoffOptions) -> Self {
        self.options = options;
        self
    }

    /// Pause this long before the first attempt.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add a random pause of up to `max` before the first attempt, on top of [`Retrier::delay`].
    /// Spreads out callers that would otherwise start in lockstep.
    pub fn delay_rand(mut self, max: Duration) -> Self {
        self.delay_rand = max;
        self
    }

    /// Retry at a fixed, unjittered interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.backoff(Backoff::constant(interval)).with_jitter(Jitter::None);
        self
    }

    fn initial_delay(&self) -> Duration {
        let max = u64::try_from(self.delay_rand.as_nanos()).unwrap_or(u64::MAX);
        if max == 0 {
            return self.delay;
        }
        let extra = Duration::from_nanos(rand::rng().random_range(0..=max));
        self.delay.saturating_add(extra)
    }

    /// Run the action until the predicate stops, `timeout` elapses, or `ctx` is cancelled.
    pub async fn run(&mut self, ctx: &Context, timeout: Duration) -> Result<T, WaitError<E>> {
        tracing::debug!(?timeout, "starting retry loop");
        let mut lp = BackoffLoop::begin(timeout, self.options.clone());
        let mut last_err: Option<WaitError<E>> = None;

        let initial = self.initial_delay();
        if !initial.is_zero() {
            tracing::trace!(?initial, "pausing before first attempt");
            lp.pause(ctx, initial).await;
        }

        while lp.advance(ctx).await {
            let attempt_ctx = match lp.deadline() {
                Some(deadline) => ctx.with_deadline(deadline),
                None => ctx.child(),
            };
            let outcome = (self.action)(attempt_ctx.clone()).await;
            if matches!(outcome, Err(WaitError::Context(_))) && attempt_ctx.err().is_some() {
                tracing::trace!(attempt = lp.attempt(), "action context expired");
                last_err = outcome.err();
                break;
            }
            match (self.predicate)(outcome) {
                Verdict::Stop(result) => {
                    tracing::debug!(attempts = lp.attempt(), ok = result.is_ok(), "retry loop stopped");
                    return result;
                }
                Verdict::Retry(err) => {
                    tracing::trace!(attempt = lp.attempt(), failed = err.is_some(), "retrying");
                    last_err = err;
                }
            }
        }

        if lp.remaining().is_zero() {
            return match last_err {
                Some(err) if !matches!(err, WaitError::Context(_)) => Err(err),
                _ => {
                    tracing::warn!(?timeout, attempts = lp.attempt(), "retry loop timed out");
                    Err(WaitError::Timeout(TimeoutError::new(
                        timeout,
                        Some(RETRY_LAST_STATE.to_string()),
                        vec![RETRY_EXPECTED_STATE.to_string()],
                    )))
                }
            };
        }
        if let Some(cause) = ctx.cause() {
            tracing::debug!(%cause, "retry loop cancelled");
            return Err(WaitError::Context(cause));
        }
        Err(last_err.unwrap_or_else(|| {
            WaitError::Timeout(TimeoutError::new(
                timeout,
                Some(RETRY_LAST_STATE.to_string()),
                vec![RETRY_EXPECTED_STATE.to_string()],
            ))
        }))
    }
}

/// Retrier that waits for an object to disappear.
#[derive(Debug)]
pub struct UntilNotFound<E> {
    retrier: Retrier<(), E>,
}

impl<E: Send + 'static> UntilNotFound<E> {
    pub fn with_options(mut self, options: BackoffOptions) -> Self {
        self.retrier = self.retrier.with_options(options);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.retrier = self.retrier.delay(delay);
        self
    }

    pub fn delay_rand(mut self, max: Duration) -> Self {
        self.retrier = self.retrier.delay_rand(max);
        self
    }

    /// `Ok(())` once the object is gone.
    pub async fn run(&mut self, ctx: &Context, timeout: Duration) -> Result<(), WaitError<E>> {
        match self.retrier.run(ctx, timeout).await {
            Err(err) if err.timed_out() => Err(WaitError::FoundResource),
            other => other,
        }
    }
}

/// Error returned by a [`retry_context`] callback, classified by the callback itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    Retryable(E),
    NonRetryable(E),
}

impl<E> RetryError<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Retryable(e) | Self::NonRetryable(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable(e) | Self::NonRetryable(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Retryable(e) | Self::NonRetryable(e) => Some(e),
        }
    }
}

/// Call `f` until it succeeds or returns [`RetryError::NonRetryable`].
///
/// If the budget runs out after a retryable failure, that failure is returned as
/// [`WaitError::Inner`] rather than a timeout.
pub async fn retry_context<T, E, F, Fut>(ctx: &Context, timeout: Duration, mut f: F) -> Result<T, WaitError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnMut(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, RetryError<E>>> + Send + 'static,
{
    Operation::new(move |ctx| {
        let attempt = f(ctx);
        async move { attempt.await.map_err(WaitError::Inner) }
    })
    .retry_if(|outcome| match outcome {
        Err(err @ WaitError::Inner(RetryError::Retryable(_))) => Verdict::Retry(Some(err)),
        other => Verdict::Stop(other),
    })
    .run(ctx, timeout)
    .await
    .map_err(|err| err.map_inner(RetryError::into_inner))
}
