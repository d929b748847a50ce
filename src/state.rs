//! State-change poller
//!
//! [`StateChangeConfig`] repeatedly probes an external object's lifecycle state until it reaches
//! (and optionally stays in) a target state, or fails with a classified [`WaitError`].
//!
//! Per observation:
//! - probe failed with a deadline error: stop polling and report the timeout below.
//! - probe failed otherwise: return the error unchanged.
//! - object absent, empty target: count towards the target streak.
//! - object absent, non-empty target: tolerated `not_found_checks` times in a row, then
//!   [`NotFoundError`] with the number of consecutive absences.
//! - state in target: extend the streak; success once it reaches `continuous_target_occurrence`.
//! - state in pending: reset the streak.
//! - any other state: [`UnexpectedStateError`] if pending states were declared, otherwise treated
//!   as still in progress.
//!
//! When the budget runs out the wait fails with a [`TimeoutError`] carrying the last observed
//! state. When the caller's context is cancelled first its cause is returned as-is.
//!
//! Example
//! ```rust
//! use statewait::{Context, StateChangeConfig, WaitError};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut polls = 0;
//! let mut waiter = StateChangeConfig::new(move |_ctx| {
//!     polls += 1;
//!     let state = if polls < 3 { "creating" } else { "available" };
//!     async move { Ok::<_, WaitError<std::io::Error>>(Some((polls, state))) }
//! })
//! .pending(["creating"])
//! .target(["available"])
//! .poll_interval(Duration::from_millis(10))
//! .timeout(Duration::from_secs(1));
//!
//! let seen = waiter.wait_for_state(&Context::background()).await.unwrap();
//! assert_eq!(seen, Some(3));
//! # });
//! ```

use crate::backoff::Backoff;
use crate::{
    BackoffLoop, BackoffOptions, Context, Jitter, NotFoundError, Sleeper, TimeoutError, TokioSleeper,
    UnexpectedStateError, WaitError,
};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Wait budget when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);
/// Consecutive absences tolerated when `not_found_checks` is left at zero.
pub const DEFAULT_NOT_FOUND_CHECKS: usize = 20;
/// Floor of the first inter-probe delay without a fixed poll interval.
pub const DEFAULT_MIN_POLL_DELAY: Duration = Duration::from_millis(100);
/// Ceiling of the inter-probe delay without a fixed poll interval.
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(10);

type Refresh<T, S, E> = Box<dyn FnMut(Context) -> BoxFuture<'static, Result<Option<(T, S)>, WaitError<E>>> + Send>;
type LastErrorHook<T, E> = Box<dyn Fn(&T) -> Option<E> + Send + Sync>;

/// Configuration of one state wait, built fluently and run with
/// [`StateChangeConfig::wait_for_state`].
pub struct StateChangeConfig<T, S, E> {
    refresh: Refresh<T, S, E>,
    pending: Vec<S>,
    target: Vec<S>,
    timeout: Duration,
    delay: Duration,
    min_timeout: Duration,
    poll_interval: Option<Duration>,
    not_found_checks: usize,
    continuous_target_occurrence: usize,
    jitter: Option<Jitter>,
    sleeper: Arc<dyn Sleeper>,
    last_error_from: Option<LastErrorHook<T, E>>,
}

impl<T, S: fmt::Debug, E> fmt::Debug for StateChangeConfig<T, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChangeConfig")
            .field("pending", &self.pending)
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .field("min_timeout", &self.min_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("not_found_checks", &self.not_found_checks)
            .field("continuous_target_occurrence", &self.continuous_target_occurrence)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("refresh", &"<refresh>")
            .finish()
    }
}

impl<T, S, E> StateChangeConfig<T, S, E>
where
    T: Send + 'static,
    S: PartialEq + fmt::Display + Send + 'static,
    E: Send + 'static,
{
    /// Poll with `refresh`, which reports `Ok(None)` when the object does not exist.
    pub fn new<F, Fut>(mut refresh: F) -> Self
    where
        F: FnMut(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<(T, S)>, WaitError<E>>> + Send + 'static,
    {
        Self {
            refresh: Box::new(move |ctx| Box::pin(refresh(ctx))),
            pending: Vec::new(),
            target: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: None,
            not_found_checks: 0,
            continuous_target_occurrence: 1,
            jitter: None,
            sleeper: Arc::new(TokioSleeper),
            last_error_from: None,
        }
    }

    /// States meaning "still in progress".
    pub fn pending<I: IntoIterator<Item = S>>(mut self, states: I) -> Self {
        self.pending = states.into_iter().collect();
        self
    }

    /// States meaning "done". Leave empty to wait for the object to disappear.
    pub fn target<I: IntoIterator<Item = S>>(mut self, states: I) -> Self {
        self.target = states.into_iter().collect();
        self
    }

    /// Overall budget, including the initial delay.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait this long before the first probe.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Smallest delay between probes when no fixed poll interval is set. Jitter never takes a
    /// sleep below it.
    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Probe at a fixed interval instead of backing off.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Consecutive absences tolerated while waiting for a non-empty target. Zero means 20.
    pub fn not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Consecutive target observations required for success. Values below one mean one.
    pub fn continuous_target_occurrence(mut self, occurrences: usize) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    /// Override the jitter applied to inter-probe delays.
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<Z>(mut self, sleeper: Z) -> Self
    where
        Z: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Derive a cause from the last observed object when the wait times out or hits an
    /// unexpected state, e.g. from a status message it carries.
    pub fn last_error_from<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Option<E> + Send + Sync + 'static,
    {
        self.last_error_from = Some(Box::new(hook));
        self
    }

    /// Poll until the object settles.
    ///
    /// Returns the object observed in a target state, or `None` when waiting for absence.
    pub async fn wait_for_state(&mut self, ctx: &Context) -> Result<Option<T>, WaitError<E>> {
        let not_found_checks =
            if self.not_found_checks == 0 { DEFAULT_NOT_FOUND_CHECKS } else { self.not_found_checks };
        let needed = self.continuous_target_occurrence.max(1);
        let target_names = names(&self.target);

        if self.pending.iter().any(|s| self.target.contains(s)) {
            tracing::warn!(
                pending = ?names(&self.pending),
                target = ?target_names,
                "pending and target states overlap"
            );
        }
        tracing::debug!(
            timeout = ?self.timeout,
            pending = ?names(&self.pending),
            target = ?target_names,
            "waiting for state"
        );

        let mut lp = BackoffLoop::begin(self.timeout, self.backoff_options());
        if !self.delay.is_zero() {
            lp.pause(ctx, self.delay).await;
        }

        let mut occurrences = 0usize;
        let mut not_found_tick = 0usize;
        let mut last_value: Option<T> = None;
        let mut last_state: Option<String> = None;
        let mut probe_deadline: Option<WaitError<E>> = None;

        loop {
            lp.set_increment_delay(occurrences == 0);
            if !lp.advance(ctx).await {
                break;
            }

            let observed = (self.refresh)(ctx.with_timeout(lp.remaining())).await;
            let (value, state) = match observed {
                Err(err @ WaitError::Context(_)) if err.is_deadline_exceeded() => {
                    tracing::trace!(attempt = lp.attempt(), "probe ran out of time");
                    probe_deadline = Some(err);
                    break;
                }
                Err(WaitError::Context(err)) if ctx.err().is_some() => {
                    let cause = ctx.cause().unwrap_or(err);
                    tracing::debug!(%cause, "state wait cancelled during probe");
                    return Err(WaitError::Context(cause));
                }
                Err(err) => return Err(err),
                Ok(None) => {
                    last_value = None;
                    last_state = None;
                    if self.target.is_empty() {
                        occurrences += 1;
                        tracing::trace!(attempt = lp.attempt(), occurrences, "object absent");
                        if occurrences >= needed {
                            tracing::debug!(attempts = lp.attempt(), "object is gone");
                            return Ok(None);
                        }
                        continue;
                    }
                    not_found_tick += 1;
                    tracing::trace!(attempt = lp.attempt(), not_found_tick, "object not found yet");
                    if not_found_tick > not_found_checks {
                        tracing::warn!(retries = not_found_tick, "object never appeared");
                        return Err(WaitError::NotFound(NotFoundError::new(not_found_tick)));
                    }
                    continue;
                }
                Ok(Some(observation)) => observation,
            };

            not_found_tick = 0;
            tracing::trace!(attempt = lp.attempt(), state = %state, "observed state");
            if self.target.contains(&state) {
                occurrences += 1;
                if occurrences >= needed {
                    tracing::debug!(attempts = lp.attempt(), state = %state, "reached target state");
                    return Ok(Some(value));
                }
            } else if self.pending.contains(&state) {
                occurrences = 0;
            } else if !self.pending.is_empty() {
                let mut err =
                    WaitError::UnexpectedState(UnexpectedStateError::new(state.to_string(), target_names));
                self.attach_last_error(&mut err, Some(&value));
                tracing::warn!(state = %state, "unexpected state");
                return Err(err);
            }
            last_state = Some(state.to_string());
            last_value = Some(value);
        }

        if lp.remaining().is_zero() {
            let mut err = WaitError::Timeout(TimeoutError::new(self.timeout, last_state, target_names));
            self.attach_last_error(&mut err, last_value.as_ref());
            tracing::warn!(timeout = ?self.timeout, attempts = lp.attempt(), "timed out waiting for state");
            return Err(err);
        }
        if let Some(cause) = ctx.cause() {
            tracing::debug!(%cause, "state wait cancelled");
            return Err(WaitError::Context(cause));
        }
        Err(probe_deadline
            .unwrap_or_else(|| WaitError::Timeout(TimeoutError::new(self.timeout, last_state, target_names))))
    }

    fn attach_last_error(&self, err: &mut WaitError<E>, value: Option<&T>) {
        if let (Some(hook), Some(value)) = (&self.last_error_from, value) {
            if let Some(cause) = hook(value) {
                err.set_last_error(cause);
            }
        }
    }

    fn backoff_options(&self) -> BackoffOptions {
        let (backoff, jitter, floor) = match self.poll_interval {
            Some(interval) => (Backoff::constant(interval), Jitter::None, Duration::ZERO),
            None => (
                growing_backoff(self.min_timeout.max(DEFAULT_MIN_POLL_DELAY)),
                Jitter::default(),
                self.min_timeout,
            ),
        };
        BackoffOptions::default()
            .backoff(backoff)
            .with_jitter(self.jitter.unwrap_or(jitter))
            .with_min_delay(floor)
            .with_shared_sleeper(Arc::clone(&self.sleeper))
    }
}

/// Doubling delays whose first sleep is `first`, capped at [`MAX_POLL_DELAY`].
fn growing_backoff(first: Duration) -> Backoff {
    let cap = MAX_POLL_DELAY.max(first);
    Backoff::exponential(first / 2)
        .with_multiplier(2.0)
        .and_then(|b| b.with_max(cap))
        .unwrap_or_else(|_| Backoff::constant(first))
}

fn names<S: fmt::Display>(states: &[S]) -> Vec<String> {
    states.iter().map(ToString::to_string).collect()
}
