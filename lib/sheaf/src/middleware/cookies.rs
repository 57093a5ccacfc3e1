//! Cookie middleware.
//!
//! When the call's options carry a [`CookieStore`](crate::CookieStore), the
//! matching cookies are added to the request and the response's
//! `Set-Cookie` headers are stored once it arrives. Without a store, or with
//! [`CookiesOption::Disabled`](crate::CookiesOption::Disabled), calls pass
//! through untouched.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::{Error, Options, Request, Response, ResponseFuture, Result};

/// Layer that applies the call's cookie store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiesLayer;

impl CookiesLayer {
    /// Create a new cookie layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for CookiesLayer {
    type Service = Cookies<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cookies { inner }
    }
}

/// Service that applies the call's cookie store.
#[derive(Debug, Clone)]
pub struct Cookies<S> {
    inner: S,
}

impl<S> Service<(Request, Options)> for Cookies<S>
where
    S: Service<(Request, Options), Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, (request, options): (Request, Options)) -> Self::Future {
        let Some(store) = options.cookie_store().map(Arc::clone) else {
            return Box::pin(self.inner.call((request, options)));
        };

        let request = store.with_cookie_header(request);
        let sent = request.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.oneshot((request, options)).await?;
            store.extract_cookies(&sent, &response);
            Ok(response)
        })
    }
}
