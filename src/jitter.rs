//! Jitter strategies to prevent synchronized polling
//!
//! Many waiters started together (for example, resources created in parallel) would otherwise
//! probe the remote API in lockstep. Jitter here only ever shortens a delay: a fraction drawn
//! uniformly from `[0, max_fraction]` of the nominal delay is subtracted from it.
//!
//! When to use which strategy:
//! - `None`: deterministic delays for tests or replayed runs.
//! - `proportional(0.4)` (the default): sleeps land in `[0.6x, 1.0x]` of the nominal delay.
//! - `equal()`: sleeps land in `[0.5x, 1.0x]`.
//! - `full()`: sleeps land anywhere in `[0, 1.0x]`.
//!
//! Notes:
//! - RNG: uses `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//!   `apply_with_rng`.
//! - Precision: nanosecond conversions saturate to `u64::MAX` to avoid panics on very large
//!   durations.
//!
//! Example:
//! ```rust
//! use statewait::Jitter;
//! use std::time::Duration;
//!
//! let jitter = Jitter::default();
//! let slept = jitter.apply(Duration::from_millis(100));
//! assert!(slept >= Duration::from_millis(60) && slept <= Duration::from_millis(100));
//! ```

use rand::{rng, Rng};
use std::time::Duration;

/// Fraction subtracted at most by the default jitter.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.4;

/// Jitter strategy for randomizing backoff delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay
    None,
    /// Subtract a uniform fraction in `[0, max_fraction]` of the delay
    Proportional {
        /// Upper bound of the subtracted fraction, within `[0, 1]`.
        max_fraction: f64,
    },
}

impl Jitter {
    /// Subtract up to `max_fraction` of each delay. `max_fraction` must lie in `[0, 1]`.
    pub fn proportional(max_fraction: f64) -> Result<Self, &'static str> {
        if !(0.0..=1.0).contains(&max_fraction) {
            return Err("jitter fraction must be within [0, 1]");
        }
        Ok(Jitter::Proportional { max_fraction })
    }

    /// Equal jitter: random between delay/2 and delay
    pub fn equal() -> Self {
        Jitter::Proportional { max_fraction: 0.5 }
    }

    /// Full jitter: random between 0 and delay
    pub fn full() -> Self {
        Jitter::Proportional { max_fraction: 1.0 }
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_internal(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        self.apply_internal(delay, rng)
    }

    fn as_nanos_saturated(duration: Duration) -> u64 {
        duration.as_nanos().try_into().unwrap_or(u64::MAX)
    }

    fn apply_internal<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match *self {
            Jitter::None => delay,
            Jitter::Proportional { max_fraction } => {
                let nanos = Self::as_nanos_saturated(delay);
                if nanos == 0 || max_fraction.is_nan() || max_fraction <= 0.0 {
                    return Duration::from_nanos(nanos);
                }
                let fraction = rng.random_range(0.0..=max_fraction.min(1.0));
                let cut = ((nanos as f64) * fraction) as u64;
                Duration::from_nanos(nanos.saturating_sub(cut))
            }
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Proportional { max_fraction: DEFAULT_JITTER_FRACTION }
    }
}
