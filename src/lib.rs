#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # statewait
//!
//! Retry and state-change polling for eventually consistent APIs: keep probing a remote object
//! until it reaches a target state, disappears, or the budget runs out, and report the outcome
//! as a precisely classified error.
//!
//! ## Features
//!
//! - **Backoff loop** with jittered exponential delays, bounded by a deadline and interruptible
//!   by cancellation
//! - **Operation retrier** driven by predicates (`until_found_n`, `until_not_found`, `retry_when`)
//! - **State-change poller** with pending/target states, not-found tolerance, and continuous
//!   target occurrence
//! - **Error taxonomy** (`NotFound`, `UnexpectedState`, `Timeout`) for lifecycle decisions
//! - **Injectable sleepers** for deterministic tests and replayed runs
//! - **tower adapters** turning services into probes
//!
//! ## Quick Start
//!
//! ```rust
//! use statewait::{Context, StateChangeConfig, WaitError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut waiter = StateChangeConfig::new(|_ctx| async {
//!         // Describe the remote object here
//!         Ok::<_, WaitError<std::io::Error>>(Some(("vol-1234", "available")))
//!     })
//!     .pending(["creating"])
//!     .target(["available"])
//!     .timeout(Duration::from_secs(60));
//!
//!     match waiter.wait_for_state(&Context::background()).await {
//!         Ok(volume) => println!("ready: {:?}", volume),
//!         Err(err) if err.is_not_found() => println!("gone, dropping from state"),
//!         Err(err) => eprintln!("wait failed: {}", err),
//!     }
//! }
//! ```

pub mod backoff;
pub mod backoff_loop;
pub mod context;
pub mod deadline;
pub mod error;
pub mod jitter;
pub mod operation;
pub mod prelude;
pub mod results;
pub mod service;
pub mod sleeper;
pub mod state;

// Re-exports
pub use backoff::{Backoff, BackoffError, BackoffStrategy};
pub use backoff_loop::{BackoffLoop, BackoffOptions};
pub use context::{Context, ContextError};
pub use deadline::Deadline;
pub use error::{NotFoundError, TimeoutError, UnexpectedStateError, WaitError};
pub use jitter::Jitter;
pub use operation::{retry_context, Operation, RetryError, Retrier, UntilNotFound, Verdict};
pub use results::{
    assert_first_value_result, assert_maybe_single_value_result, assert_single_value_result,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use state::StateChangeConfig;
