//! Shared wait budget
//!
//! A [`Deadline`] fixes one point in time so several consecutive waits (create, then tag, then
//! wait for available) draw from a single budget instead of each getting a fresh timeout.
//!
//! Example
//! ```rust
//! use statewait::Deadline;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let deadline = Deadline::new(Duration::from_secs(40 * 60));
//! // first wait: `waiter.timeout(deadline.remaining())`
//! // second wait: `retrier.run(&ctx, deadline.remaining())`
//! assert!(deadline.remaining() <= Duration::from_secs(40 * 60));
//! # });
//! ```

use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time shared by several waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Expire `timeout` from now. A timeout too large to represent never expires.
    pub fn new(timeout: Duration) -> Self {
        Self { at: Instant::now().checked_add(timeout) }
    }

    /// The instant this deadline expires at.
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// Budget left, zero once expired.
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_shrinks_with_time() {
        let deadline = Deadline::new(Duration::from_secs(10));
        assert_eq!(deadline.remaining(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(6));
        assert!(!deadline.is_expired());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn copies_share_the_same_instant() {
        let deadline = Deadline::new(Duration::from_secs(3));
        let copy = deadline;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(copy.remaining(), deadline.remaining());
        assert_eq!(copy.instant(), deadline.instant());
    }

    #[test]
    fn huge_timeout_never_expires() {
        let deadline = Deadline::new(Duration::MAX);
        assert!(deadline.instant().is_none());
        assert_eq!(deadline.remaining(), Duration::MAX);
    }
}
