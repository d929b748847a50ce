//! Adapters from `tower` services to probes
//!
//! API clients are often already `tower::Service`s. These adapters let such a service act as
//! the refresh function of a [`StateChangeConfig`](crate::StateChangeConfig) or the action of an
//! [`Operation`](crate::Operation): every probe clones the service, drives it to readiness, and
//! calls it once with the probe's [`Context`]. Service errors surface as [`WaitError::Inner`].
//!
//! Example
//! ```rust
//! use statewait::service::refresh_service;
//! use statewait::{Context, StateChangeConfig};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let describe = tower::service_fn(|_ctx: Context| async {
//!     Ok::<_, std::io::Error>(Some(("vol-1", "available")))
//! });
//! let mut waiter = StateChangeConfig::new(refresh_service(describe))
//!     .target(["available"])
//!     .timeout(Duration::from_secs(1));
//! assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), Some("vol-1"));
//! # });
//! ```

use crate::{Context, WaitError};
use futures::future::BoxFuture;
use tower::ServiceExt;
use tower_service::Service;

/// Refresh function backed by a service answering `Some((object, state))` or `None` if absent.
pub fn refresh_service<Svc, T, S, E>(
    svc: Svc,
) -> impl FnMut(Context) -> BoxFuture<'static, Result<Option<(T, S)>, WaitError<E>>> + Send + 'static
where
    Svc: Service<Context, Response = Option<(T, S)>, Error = E> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    T: Send + 'static,
    S: Send + 'static,
    E: Send + 'static,
{
    move |ctx| {
        let svc = svc.clone();
        Box::pin(async move { svc.oneshot(ctx).await.map_err(WaitError::Inner) })
    }
}

/// Action backed by a service.
pub fn action_service<Svc, T, E>(
    svc: Svc,
) -> impl FnMut(Context) -> BoxFuture<'static, Result<T, WaitError<E>>> + Send + 'static
where
    Svc: Service<Context, Response = T, Error = E> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    move |ctx| {
        let svc = svc.clone();
        Box::pin(async move { svc.oneshot(ctx).await.map_err(WaitError::Inner) })
    }
}
