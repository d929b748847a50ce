//! Backoff strategies for wait loops.
//!
//! Provides zero, constant, and exponential strategies. Attempt semantics: attempt index `0`
//! represents the first probe (no delay); delays before later probes start at `attempt = 1`.
//! The exponential strategy multiplies by a float factor, so slow growth such as `1.3x` is
//! expressible.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use statewait::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_multiplier(2.0)
//!     .unwrap()
//!     .with_max(Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO); // first probe
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(2), Duration::from_millis(400));
//! assert_eq!(backoff.delay(5), Duration::from_secs(1)); // capped
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Smallest delay of the default exponential strategy.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(10);

/// Growth factor of the default exponential strategy.
pub const DEFAULT_MULTIPLIER: f64 = 1.3;

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for exponential backoff")]
    MaxRequiresExponential,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= min ({min:?})")]
    MaxLessThanMin { min: Duration, max: Duration },
    #[error("multiplier must be finite and >= 1 (got {0})")]
    InvalidMultiplier(f64),
}

/// Trait implemented by all backoff strategies.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, PartialEq)]
struct ConstantBackoff {
    delay: Duration,
}

impl BackoffStrategy for ConstantBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay.min(MAX_BACKOFF)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ExponentialBackoff {
    min: Duration,
    multiplier: f64,
    max: Option<Duration>,
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.min.as_secs_f64() * self.multiplier.powi(exponent);
        let exp_delay = if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            MAX_BACKOFF
        };
        let capped = self.max.map(|m| exp_delay.min(m)).unwrap_or(exp_delay);
        capped.min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant(ConstantBackoff),
    Exponential(ExponentialBackoff),
}

impl BackoffStrategy for BackoffKind {
    fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffKind::Constant(c) => c.delay(attempt),
            BackoffKind::Exponential(e) => e.delay(attempt),
        }
    }
}

/// Backoff strategy wrapper delegating to concrete strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// No delay between probes. Used for replay and deterministic runs.
    pub fn zero() -> Self {
        Self::constant(Duration::ZERO)
    }

    /// The same delay before every probe after the first.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant(ConstantBackoff { delay }) }
    }

    /// Exponential growth from `min` using [`DEFAULT_MULTIPLIER`].
    pub fn exponential(min: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential(ExponentialBackoff {
                min,
                multiplier: DEFAULT_MULTIPLIER,
                max: None,
            }),
        }
    }

    /// Set the growth factor of an exponential backoff. Must be finite and `>= 1`.
    ///
    /// On a constant backoff this converts it to exponential growth from its delay.
    pub fn with_multiplier(self, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        let kind = match self.kind {
            BackoffKind::Exponential(e) => {
                BackoffKind::Exponential(ExponentialBackoff { multiplier, ..e })
            }
            BackoffKind::Constant(c) => {
                BackoffKind::Exponential(ExponentialBackoff { min: c.delay, multiplier, max: None })
            }
        };
        Ok(Self { kind })
    }

    /// Cap an exponential backoff. Errors on constant backoff, a zero cap, or `max < min`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential(ExponentialBackoff { max: existing, min, .. }) => {
                if max < *min {
                    return Err(BackoffError::MaxLessThanMin { min: *min, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant(_) => Err(BackoffError::MaxRequiresExponential),
        }
    }

    /// Calculate the delay for a given attempt number (0 = first probe, no delay).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.kind.delay(attempt)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_MIN_DELAY)
    }
}

impl BackoffStrategy for Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.kind.delay(attempt)
    }
}
