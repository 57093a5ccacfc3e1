//! Middleware for the handler stack.
//!
//! Every middleware is a tower [`Layer`] whose services speak
//! `(Request, Options)`. The functions of this module wrap them into
//! [`Middleware`] values ready to be pushed on a
//! [`HandlerStack`](crate::HandlerStack).
//!
//! # Available Middleware
//!
//! - [`http_errors`] - Turns 4xx/5xx responses into [`Error::Http`](crate::Error::Http)
//! - [`redirect`] - Follows redirects according to `allow_redirects`
//! - [`cookies`] - Applies the call's cookie store
//! - [`prepare_body`] - Sets `Content-Type`, `Content-Length` and `Expect`
//! - [`retry`] - Resends requests while a decider says so
//! - [`history`] - Records transactions in a [`History`]
//! - [`log`] - Logs settled calls with a [`MessageFormatter`]
//! - [`map_request`], [`map_response`], [`tap`] - Ad-hoc hooks
//!
//! Any other tower layer speaking `(Request, Options)` can be adapted with
//! [`Middleware::from_layer`], e.g. [`ConcurrencyLimitLayer`].
//!
//! # Example
//!
//! ```ignore
//! use sheaf::{HandlerStack, History, middleware};
//! use sheaf::middleware::RetryPolicy;
//!
//! let history = History::new();
//! let mut stack = HandlerStack::create(transport.handler());
//! stack.push_named("retry", middleware::retry(RetryPolicy::new(3).into_decider()))?;
//! stack.push(middleware::history(&history));
//! ```

mod cookies;
mod history;
mod http_errors;
mod log;
mod map;
mod prepare_body;
mod redirect;
mod retry;

use std::time::Duration;

pub use cookies::{Cookies, CookiesLayer};
pub use history::{HistoryLayer, Recorded};
pub use http_errors::{DEFAULT_SUMMARY_LENGTH, HttpErrors, HttpErrorsLayer};
pub use log::{Log, LogLayer, LogLevel};
pub use map::{MapRequest, MapRequestLayer, MapResponse, MapResponseLayer, Tap, TapLayer};
pub use prepare_body::{PrepareBody, PrepareBodyLayer};
pub use redirect::{
    REDIRECT_HISTORY_HEADER, REDIRECT_STATUS_HISTORY_HEADER, Redirect, RedirectLayer,
};
pub use retry::{Attempt, Decider, Delay, Retry, RetryLayer, RetryPolicy, exponential_delay};

// Re-export tower types for convenience
pub use tower::Layer;
pub use tower::limit::ConcurrencyLimitLayer;

use crate::{Error, History, Middleware, MessageFormatter, Options, Request, Response, Result};

/// Raise [`Error::Http`] for 4xx and 5xx responses when `http_errors` is set.
#[must_use]
pub fn http_errors() -> Middleware {
    Middleware::from_layer(HttpErrorsLayer::new())
}

/// Like [`http_errors`], quoting at most `length` body characters.
#[must_use]
pub fn http_errors_with_summary(length: usize) -> Middleware {
    Middleware::from_layer(HttpErrorsLayer::new().with_summary_length(length))
}

/// Follow redirects according to the call's `allow_redirects` option.
#[must_use]
pub fn redirect() -> Middleware {
    Middleware::from_layer(RedirectLayer::new())
}

/// Add and extract cookies when the call carries a cookie store.
#[must_use]
pub fn cookies() -> Middleware {
    Middleware::from_layer(CookiesLayer::new())
}

/// Prepare the framing headers of request bodies.
#[must_use]
pub fn prepare_body() -> Middleware {
    Middleware::from_layer(PrepareBodyLayer::new())
}

/// Retry calls while `decider` returns `true`, with exponential backoff.
pub fn retry<D>(decider: D) -> Middleware
where
    D: Fn(&Attempt<'_>) -> bool + Send + Sync + 'static,
{
    Middleware::from_layer(RetryLayer::new(decider))
}

/// Retry calls while `decider` returns `true`, pausing for `delay`.
pub fn retry_with_delay<D, F>(decider: D, delay: F) -> Middleware
where
    D: Fn(&Attempt<'_>) -> bool + Send + Sync + 'static,
    F: Fn(u32, Option<&Response>, Option<&Error>) -> Duration + Send + Sync + 'static,
{
    Middleware::from_layer(RetryLayer::new(decider).with_delay(delay))
}

/// Record every call in `history`.
#[must_use]
pub fn history(history: &History) -> Middleware {
    Middleware::from_layer(HistoryLayer::new(history))
}

/// Log every settled call.
#[must_use]
pub fn log(formatter: MessageFormatter, level: LogLevel) -> Middleware {
    Middleware::from_layer(LogLayer::new(formatter, level))
}

/// Rewrite requests before they are sent.
pub fn map_request<F>(f: F) -> Middleware
where
    F: Fn(Request) -> Request + Send + Sync + 'static,
{
    Middleware::from_layer(MapRequestLayer::new(f))
}

/// Rewrite successful responses.
pub fn map_response<F>(f: F) -> Middleware
where
    F: Fn(Response) -> Response + Send + Sync + 'static,
{
    Middleware::from_layer(MapResponseLayer::new(f))
}

/// Observe calls before they are forwarded and after they settle.
///
/// Use [`TapLayer`] with [`Middleware::from_layer`] to register only one of
/// the callbacks.
pub fn tap<B, A>(before: B, after: A) -> Middleware
where
    B: Fn(&Request, &Options) + Send + Sync + 'static,
    A: Fn(&Request, &Options, &Result<Response>) + Send + Sync + 'static,
{
    Middleware::from_layer(TapLayer::new().before(before).after(after))
}
