//! Jittered backoff loop bounded by a deadline.
//!
//! A [`BackoffLoop`] is the iteration primitive under both the operation retrier and the
//! state-change poller. It is created per wait call, driven by exactly one caller, and
//! discarded when the call returns.
//!
//! Semantics:
//! - The first [`BackoffLoop::advance`] never sleeps.
//! - Every later call sleeps `max(jitter(backoff.delay(step)), min_delay)`, truncated to the remaining budget and
//!   cut short by context cancellation, then increments the attempt counter.
//! - `advance` returns `false` once the context reports an error or the loop's own deadline is
//!   reached; [`BackoffLoop::remaining`] returning zero tells the two apart.
//!
//! Example
//! ```rust
//! use statewait::{BackoffLoop, BackoffOptions, Context};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ctx = Context::background();
//! let mut lp = BackoffLoop::begin(Duration::from_secs(1), BackoffOptions::default());
//! let mut probes = 0;
//! while lp.advance(&ctx).await {
//!     probes += 1;
//!     if probes == 3 {
//!         break;
//!     }
//! }
//! assert_eq!(lp.attempt(), 3);
//! # });
//! ```

use crate::backoff::{Backoff, BackoffError};
use crate::{Context, Jitter, Sleeper, TokioSleeper};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Delay strategy, jitter, and sleeper used by one loop.
#[derive(Debug, Clone)]
pub struct BackoffOptions {
    backoff: Backoff,
    jitter: Jitter,
    min_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl BackoffOptions {
    /// Exponential growth from `min_delay` by `multiplier`, default jitter, tokio sleeps.
    pub fn exponential(min_delay: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        let backoff = Backoff::exponential(min_delay).with_multiplier(multiplier)?;
        Ok(Self::default().backoff(backoff))
    }

    /// Replace the delay strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Never sleep less than `min_delay` between attempts, whatever the jitter drew.
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub(crate) fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The configured delay strategy.
    pub fn delay_strategy(&self) -> &Backoff {
        &self.backoff
    }

    /// The configured jitter strategy.
    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Floor applied after jitter.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            jitter: Jitter::default(),
            min_delay: Duration::ZERO,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Mutable iteration state of one retry or wait call.
#[derive(Debug)]
pub struct BackoffLoop {
    options: BackoffOptions,
    attempt: u32,
    step: u32,
    increment: bool,
    deadline: Option<Instant>,
}

impl BackoffLoop {
    /// Start a loop whose budget ends `timeout` from now.
    ///
    /// A timeout too large to represent leaves the loop without a deadline.
    pub fn begin(timeout: Duration, options: BackoffOptions) -> Self {
        Self {
            options,
            attempt: 0,
            step: 0,
            increment: true,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Number of completed `advance` calls.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The loop's own deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. Zero means the budget is spent; `Duration::MAX` when the
    /// loop has no deadline.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Whether the next sleep grows the backoff exponent. Holding it steady is useful while a
    /// poller accumulates consecutive confirmations of a target state.
    pub fn set_increment_delay(&mut self, increment: bool) {
        self.increment = increment;
    }

    /// Zero the attempt counter and exponent; the next `advance` does not sleep.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.step = 0;
    }

    /// Sleep as needed, then report whether another attempt may run.
    pub async fn advance(&mut self, ctx: &Context) -> bool {
        if self.attempt > 0 {
            let delay = self.next_delay();
            tracing::trace!(attempt = self.attempt, ?delay, "waiting before next attempt");
            self.pause(ctx, delay).await;
        }
        self.attempt = self.attempt.saturating_add(1);
        ctx.err().is_none() && !self.remaining().is_zero()
    }

    /// Sleep for `delay`, truncated to the remaining budget and interrupted by `ctx`.
    pub async fn pause(&self, ctx: &Context, delay: Duration) {
        let delay = delay.min(self.remaining());
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.options.sleeper.sleep(delay) => {}
            _ = ctx.done() => {}
        }
    }

    fn next_delay(&mut self) -> Duration {
        if self.step == 0 || self.increment {
            self.step = self.step.saturating_add(1);
        }
        let nominal = self.options.backoff.delay(self.step);
        self.options.jitter.apply(nominal).max(self.options.min_delay)
    }
}
