//! Assertions over lookup results
//!
//! List-style APIs answer "find X" with a collection. These helpers turn that collection into
//! the single object a refresh function or action wants, classifying an empty result as
//! not-found so the retrier and poller treat it as absence.

use crate::{NotFoundError, WaitError};

/// Exactly one value: empty is not-found, more than one is [`WaitError::TooManyResults`].
pub fn assert_single_value_result<T, E>(values: Vec<T>) -> Result<T, WaitError<E>> {
    let count = values.len();
    let mut values = values.into_iter();
    match (values.next(), count) {
        (None, _) => Err(WaitError::NotFound(NotFoundError::empty_result())),
        (Some(value), 1) => Ok(value),
        (Some(_), count) => Err(WaitError::TooManyResults { count }),
    }
}

/// At most one value: empty is `None`, more than one is [`WaitError::TooManyResults`].
pub fn assert_maybe_single_value_result<T, E>(values: Vec<T>) -> Result<Option<T>, WaitError<E>> {
    if values.is_empty() {
        return Ok(None);
    }
    assert_single_value_result(values).map(Some)
}

/// The first value of a non-empty result; empty is not-found.
pub fn assert_first_value_result<T, E>(values: Vec<T>) -> Result<T, WaitError<E>> {
    values.into_iter().next().ok_or_else(|| WaitError::NotFound(NotFoundError::empty_result()))
}
