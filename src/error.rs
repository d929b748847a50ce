//! Error taxonomy for retries and state waits
//!
//! Every terminal outcome of a wait is a [`WaitError`] value, never a panic, so lifecycle code can
//! branch on it: a [`NotFoundError`] usually means "already gone, drop it from tracked state",
//! an [`UnexpectedStateError`] is a hard failure naming the offending state, and a
//! [`TimeoutError`] names the expected states and the budget that ran out.
//!
//! Errors produced by probes themselves travel as [`WaitError::Inner`] and are surfaced unchanged.
//!
//! Cause chains: `NotFound`, `UnexpectedState` and `Timeout` carry an optional `last_error`,
//! exposed through [`std::error::Error::source`] and walked by [`WaitError::is_not_found`].
//! [`WaitError::timed_out`] is deliberately narrower: only a timeout *without* a last error
//! counts, which callers read as "ran out of time, no hard failure seen".

use crate::ContextError;
use std::fmt;
use std::time::Duration;

/// Unified error type for retries and state waits
#[derive(Debug, Clone)]
pub enum WaitError<E> {
    /// The object stayed absent longer than tolerated, or the probe reported it missing.
    NotFound(NotFoundError<E>),
    /// The object reported a state that is neither pending nor target.
    UnexpectedState(UnexpectedStateError<E>),
    /// The budget elapsed before a terminal condition was observed.
    Timeout(TimeoutError<E>),
    /// A lookup expected at most one match but found several.
    TooManyResults { count: usize },
    /// The object was still present when waiting for it to disappear timed out.
    FoundResource,
    /// The caller's context was cancelled or its deadline passed.
    Context(ContextError),
    /// The probe or action failed.
    Inner(E),
}

/// The probed object is missing.
#[derive(Debug, Clone)]
pub struct NotFoundError<E> {
    pub last_error: Option<Box<WaitError<E>>>,
    pub message: Option<String>,
    /// Consecutive absent observations, when raised by the poller.
    pub retries: usize,
}

/// The probed object reported a state outside the pending and target sets.
#[derive(Debug, Clone)]
pub struct UnexpectedStateError<E> {
    pub last_error: Option<Box<WaitError<E>>>,
    pub state: String,
    pub expected_states: Vec<String>,
}

/// The wait budget ran out.
#[derive(Debug, Clone)]
pub struct TimeoutError<E> {
    pub last_error: Option<Box<WaitError<E>>>,
    pub last_state: Option<String>,
    pub timeout: Duration,
    pub expected_states: Vec<String>,
}

impl<E> NotFoundError<E> {
    /// Raised after `retries` consecutive absent observations.
    pub fn new(retries: usize) -> Self {
        Self { last_error: None, message: None, retries }
    }

    /// A lookup that returned no results.
    pub fn empty_result() -> Self {
        Self::with_message("empty result")
    }

    /// A probe-reported absence with a description.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self { last_error: None, message: Some(message.into()), retries: 0 }
    }

    /// Attach the error that revealed the absence.
    pub fn caused_by(mut self, err: WaitError<E>) -> Self {
        self.last_error = Some(Box::new(err));
        self
    }
}

impl<E> UnexpectedStateError<E> {
    pub fn new(state: impl Into<String>, expected_states: Vec<String>) -> Self {
        Self { last_error: None, state: state.into(), expected_states }
    }
}

impl<E> TimeoutError<E> {
    pub fn new(timeout: Duration, last_state: Option<String>, expected_states: Vec<String>) -> Self {
        Self { last_error: None, last_state, timeout, expected_states }
    }
}

impl<E: fmt::Display> fmt::Display for NotFoundError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) if !message.is_empty() => write!(f, "{}", message),
            _ if self.retries > 0 => write!(f, "couldn't find resource ({} retries)", self.retries),
            _ => write!(f, "couldn't find resource"),
        }
    }
}

impl<E: fmt::Display> fmt::Display for UnexpectedStateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected state '{}', wanted target '{}'",
            self.state,
            self.expected_states.join(", ")
        )?;
        if let Some(last) = &self.last_error {
            write!(f, ". last error: {}", last)?;
        }
        Ok(())
    }
}

impl<E: fmt::Display> fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expected_states.is_empty() {
            write!(f, "timeout while waiting for resource to be gone")?;
        } else {
            write!(
                f,
                "timeout while waiting for state to become '{}'",
                self.expected_states.join(", ")
            )?;
        }
        let mut extra = Vec::new();
        if let Some(state) = self.last_state.as_deref().filter(|s| !s.is_empty()) {
            extra.push(format!("last state: '{}'", state));
        }
        if !self.timeout.is_zero() {
            extra.push(format!("timeout: {:?}", self.timeout));
        }
        if !extra.is_empty() {
            write!(f, " ({})", extra.join(", "))?;
        }
        if let Some(last) = &self.last_error {
            write!(f, ": {}", last)?;
        }
        Ok(())
    }
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(e) => write!(f, "{}", e),
            Self::UnexpectedState(e) => write!(f, "{}", e),
            Self::Timeout(e) => write!(f, "{}", e),
            Self::TooManyResults { count } => {
                write!(f, "too many results: wanted 1, got {}", count)
            }
            Self::FoundResource => write!(f, "found resource"),
            Self::Context(e) => write!(f, "{}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

fn last_source<E>(last: &Option<Box<WaitError<E>>>) -> Option<&(dyn std::error::Error + 'static)>
where
    E: std::error::Error + 'static,
{
    last.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
}

impl<E: std::error::Error + 'static> std::error::Error for NotFoundError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        last_source(&self.last_error)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for UnexpectedStateError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        last_source(&self.last_error)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        last_source(&self.last_error)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for WaitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotFound(e) => last_source(&e.last_error),
            Self::UnexpectedState(e) => last_source(&e.last_error),
            Self::Timeout(e) => last_source(&e.last_error),
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<NotFoundError<E>> for WaitError<E> {
    fn from(err: NotFoundError<E>) -> Self {
        Self::NotFound(err)
    }
}

impl<E> From<UnexpectedStateError<E>> for WaitError<E> {
    fn from(err: UnexpectedStateError<E>) -> Self {
        Self::UnexpectedState(err)
    }
}

impl<E> From<TimeoutError<E>> for WaitError<E> {
    fn from(err: TimeoutError<E>) -> Self {
        Self::Timeout(err)
    }
}

impl<E> From<ContextError> for WaitError<E> {
    fn from(err: ContextError) -> Self {
        Self::Context(err)
    }
}

impl<E> WaitError<E> {
    /// True if this error, or any `last_error` in its chain, is a not-found error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::UnexpectedState(e) => e.last_error.as_deref().is_some_and(Self::is_not_found),
            Self::Timeout(e) => e.last_error.as_deref().is_some_and(Self::is_not_found),
            _ => false,
        }
    }

    /// True only for a top-level timeout that carries no underlying error.
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::Timeout(e) if e.last_error.is_none())
    }

    /// True for any top-level timeout, with or without an underlying error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, Self::UnexpectedState(_))
    }

    pub fn is_too_many_results(&self) -> bool {
        matches!(self, Self::TooManyResults { .. })
    }

    pub fn is_found_resource(&self) -> bool {
        matches!(self, Self::FoundResource)
    }

    /// True if the caller's context was explicitly cancelled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Context(e) if e.is_canceled())
    }

    /// True if a context deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Context(e) if e.is_deadline_exceeded())
    }

    pub fn as_not_found(&self) -> Option<&NotFoundError<E>> {
        match self {
            Self::NotFound(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_unexpected_state(&self) -> Option<&UnexpectedStateError<E>> {
        match self {
            Self::UnexpectedState(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_timeout(&self) -> Option<&TimeoutError<E>> {
        match self {
            Self::Timeout(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the probe error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Get the probe error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// The chained cause of a not-found, unexpected-state, or timeout error.
    pub fn last_error(&self) -> Option<&WaitError<E>> {
        match self {
            Self::NotFound(e) => e.last_error.as_deref(),
            Self::UnexpectedState(e) => e.last_error.as_deref(),
            Self::Timeout(e) => e.last_error.as_deref(),
            _ => None,
        }
    }

    /// Convert the probe error type, including every `last_error` in the chain.
    pub fn map_inner<E2>(self, mut f: impl FnMut(E) -> E2) -> WaitError<E2> {
        self.map_inner_dyn(&mut f)
    }

    fn map_inner_dyn<E2>(self, f: &mut dyn FnMut(E) -> E2) -> WaitError<E2> {
        fn chain<E, E2>(
            last: Option<Box<WaitError<E>>>,
            f: &mut dyn FnMut(E) -> E2,
        ) -> Option<Box<WaitError<E2>>> {
            last.map(|e| Box::new(e.map_inner_dyn(f)))
        }
        match self {
            Self::NotFound(e) => WaitError::NotFound(NotFoundError {
                last_error: chain(e.last_error, f),
                message: e.message,
                retries: e.retries,
            }),
            Self::UnexpectedState(e) => WaitError::UnexpectedState(UnexpectedStateError {
                last_error: chain(e.last_error, f),
                state: e.state,
                expected_states: e.expected_states,
            }),
            Self::Timeout(e) => WaitError::Timeout(TimeoutError {
                last_error: chain(e.last_error, f),
                last_state: e.last_state,
                timeout: e.timeout,
                expected_states: e.expected_states,
            }),
            Self::TooManyResults { count } => WaitError::TooManyResults { count },
            Self::FoundResource => WaitError::FoundResource,
            Self::Context(e) => WaitError::Context(e),
            Self::Inner(e) => WaitError::Inner(f(e)),
        }
    }

    /// Attach `err` as the cause of a timeout or unexpected-state error that has none.
    ///
    /// Typically fed from a status message on the last observed object. Other variants, and
    /// errors that already carry a cause, are left untouched.
    pub fn set_last_error(&mut self, err: E) {
        let slot = match self {
            Self::Timeout(e) => &mut e.last_error,
            Self::UnexpectedState(e) => &mut e.last_error,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(Box::new(Self::Inner(err)));
        }
    }
}
