//! Convenient re-exports for common statewait types.
pub use crate::{
    backoff::{Backoff, BackoffError, BackoffStrategy, MAX_BACKOFF},
    backoff_loop::{BackoffLoop, BackoffOptions},
    context::{Context, ContextError},
    deadline::Deadline,
    error::{NotFoundError, TimeoutError, UnexpectedStateError, WaitError},
    jitter::Jitter,
    operation::{retry_context, Operation, RetryError, Retrier, UntilNotFound, Verdict},
    results::{assert_maybe_single_value_result, assert_single_value_result},
    service::{action_service, refresh_service},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper},
    state::{StateChangeConfig, DEFAULT_NOT_FOUND_CHECKS, DEFAULT_TIMEOUT},
};
