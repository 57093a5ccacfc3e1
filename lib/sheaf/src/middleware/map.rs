//! Mapping and tapping middleware.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::{Error, Options, Request, Response, ResponseFuture, Result};

type RequestFn = Arc<dyn Fn(Request) -> Request + Send + Sync>;
type ResponseFn = Arc<dyn Fn(Response) -> Response + Send + Sync>;
type BeforeFn = Arc<dyn Fn(&Request, &Options) + Send + Sync>;
type AfterFn = Arc<dyn Fn(&Request, &Options, &Result<Response>) + Send + Sync>;

/// Layer that rewrites requests before they are sent.
#[derive(Clone)]
pub struct MapRequestLayer {
    f: RequestFn,
}

impl MapRequestLayer {
    /// Create a layer applying `f` to every request.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl<S> Layer<S> for MapRequestLayer {
    type Service = MapRequest<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MapRequest {
            inner,
            f: Arc::clone(&self.f),
        }
    }
}

/// Service that rewrites requests before they are sent.
#[derive(Clone)]
pub struct MapRequest<S> {
    inner: S,
    f: RequestFn,
}

impl<S> Service<(Request, Options)> for MapRequest<S>
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
        let request = (self.f)(request);
        Box::pin(self.inner.call((request, options)))
    }
}

/// Layer that rewrites successful responses.
#[derive(Clone)]
pub struct MapResponseLayer {
    f: ResponseFn,
}

impl MapResponseLayer {
    /// Create a layer applying `f` to every successful response.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Response) -> Response + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl<S> Layer<S> for MapResponseLayer {
    type Service = MapResponse<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MapResponse {
            inner,
            f: Arc::clone(&self.f),
        }
    }
}

/// Service that rewrites successful responses.
#[derive(Clone)]
pub struct MapResponse<S> {
    inner: S,
    f: ResponseFn,
}

impl<S> Service<(Request, Options)> for MapResponse<S>
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

    fn call(&mut self, call: (Request, Options)) -> Self::Future {
        let f = Arc::clone(&self.f);
        let inner = self.inner.clone();
        Box::pin(async move { inner.oneshot(call).await.map(|response| f(response)) })
    }
}

/// Layer that observes calls without changing them.
#[derive(Clone, Default)]
pub struct TapLayer {
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
}

impl TapLayer {
    /// Create a layer with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the request and options before forwarding them.
    #[must_use]
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &Options) + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    /// Called with the request, options and outcome once the call settles.
    #[must_use]
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &Options, &Result<Response>) + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }
}

impl<S> Layer<S> for TapLayer {
    type Service = Tap<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Tap {
            inner,
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

/// Service that observes calls without changing them.
#[derive(Clone)]
pub struct Tap<S> {
    inner: S,
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
}

impl<S> Service<(Request, Options)> for Tap<S>
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
        if let Some(before) = &self.before {
            before(&request, &options);
        }
        let Some(after) = self.after.clone() else {
            return Box::pin(self.inner.call((request, options)));
        };

        let inner = self.inner.clone();
        Box::pin(async move {
            let outcome = inner.oneshot((request.clone(), options.clone())).await;
            after(&request, &options, &outcome);
            outcome
        })
    }
}

macro_rules! opaque_debug {
    ($($name:ident),*) => {
        $(
            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.debug_struct(stringify!($name)).finish_non_exhaustive()
                }
            }
        )*
    };
}

opaque_debug!(MapRequestLayer, MapResponseLayer, TapLayer);
