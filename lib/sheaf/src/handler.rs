//! Handlers and middleware.
//!
//! A [`Handler`] sends a request with its options and returns a
//! [`ResponseFuture`]. A [`Middleware`] turns one handler into another.
//! Both are cheap to clone and can be shared across tasks.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower::{Layer, ServiceExt};
use tower_service::Service;

use crate::{Error, Options, Request, Response, ResponseFuture, Result};

type HandlerFn = dyn Fn(Request, Options) -> ResponseFuture + Send + Sync;
type MiddlewareFn = dyn Fn(Handler) -> Handler + Send + Sync;

/// Type-erased service speaking `(Request, Options)`.
pub type BoxedService = BoxCloneService<(Request, Options), Response, Error>;

/// Last path segment of a type name, without generics.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::")
        .find(|segment| !segment.starts_with('{'))
        .unwrap_or(base)
}

/// A callable `(Request, Options) -> ResponseFuture`.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
    label: Arc<str>,
}

impl Handler {
    /// Create a handler from an async function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Options) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self::labeled(short_type_name::<F>(), f)
    }

    /// Create a handler with a diagnostic label.
    pub fn labeled<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(Request, Options) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |request, options| Box::pin(f(request, options))),
            label: Arc::from(label.into()),
        }
    }

    /// Create a handler from a tower service.
    ///
    /// The service is shared behind a mutex; each call clones it and drives
    /// it to readiness before sending.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<(Request, Options), Response = Response, Error = Error>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        let label = short_type_name::<S>();
        let shared = Arc::new(Mutex::new(BoxCloneService::new(service)));
        Self {
            inner: Arc::new(move |request, options| {
                // Lock, clone the service, and release the lock immediately
                let service: BoxedService = shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                Box::pin(service.oneshot((request, options)))
            }),
            label: Arc::from(label),
        }
    }

    /// Send a request.
    #[must_use]
    pub fn call(&self, request: Request, options: Options) -> ResponseFuture {
        (self.inner)(request, options)
    }

    /// Diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Copy with a different label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Arc::from(label.into());
        self
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.label).finish()
    }
}

impl Service<(Request, Options)> for Handler {
    type Response = Response;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (request, options): (Request, Options)) -> Self::Future {
        Handler::call(self, request, options)
    }
}

/// A function wrapping a [`Handler`] into another one.
#[derive(Clone)]
pub struct Middleware {
    inner: Arc<MiddlewareFn>,
    label: Arc<str>,
}

impl Middleware {
    /// Create a middleware from a function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self::labeled(short_type_name::<F>(), f)
    }

    /// Create a middleware with a diagnostic label.
    pub fn labeled<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(f),
            label: Arc::from(label.into()),
        }
    }

    /// Adapt a tower layer whose services speak `(Request, Options)`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use sheaf::{HandlerStack, Middleware};
    /// use tower::limit::ConcurrencyLimitLayer;
    ///
    /// stack.push(Middleware::from_layer(ConcurrencyLimitLayer::new(8)));
    /// ```
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<(Request, Options), Response = Response, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<(Request, Options)>>::Future: Send + 'static,
    {
        let label = short_type_name::<L>();
        Self::labeled(label, move |next| {
            Handler::from_service(layer.layer(next)).with_label(label)
        })
    }

    /// Wrap a handler.
    #[must_use]
    pub fn wrap(&self, handler: Handler) -> Handler {
        (self.inner)(handler)
    }

    /// Diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if both values are the same middleware instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use tower::limit::ConcurrencyLimitLayer;

    use super::*;
    use crate::Method;

    fn request() -> Request {
        Request::new(
            Method::Get,
            url::Url::parse("http://example.com").expect("valid URL"),
        )
    }

    fn ok_handler() -> Handler {
        Handler::labeled("ok", |_request, _options| async {
            Ok(Response::new(200, "ok"))
        })
    }

    #[tokio::test]
    async fn handler_call() {
        let response = ok_handler()
            .call(request(), Options::default())
            .await
            .expect("response");
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn middleware_wraps_handler() {
        let tag = Middleware::labeled("tag", |next: Handler| {
            Handler::new(move |request: Request, options| {
                next.call(request.with_header("X-Tag", "1"), options)
            })
        });
        let echo = Handler::new(|request: Request, _options| async move {
            Ok(Response::new(200, request.header("X-Tag").unwrap_or("").to_string()))
        });

        let response = tag
            .wrap(echo)
            .call(request(), Options::default())
            .await
            .expect("response");
        assert_eq!(response.body().as_ref(), b"1");
        assert_eq!(tag.label(), "tag");
    }

    #[tokio::test]
    async fn handler_as_tower_service() {
        let response = ok_handler()
            .oneshot((request(), Options::default()))
            .await
            .expect("response");
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn tower_layer_as_middleware() {
        let limit = Middleware::from_layer(ConcurrencyLimitLayer::new(1));
        assert_eq!(limit.label(), "ConcurrencyLimitLayer");

        let handler = limit.wrap(ok_handler());
        let (a, b) = tokio::join!(
            handler.call(request(), Options::default()),
            handler.call(request(), Options::default())
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[test]
    fn middleware_identity() {
        let a = Middleware::new(|h| h);
        let b = a.clone();
        let c = Middleware::new(|h| h);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name::<Handler>(), "Handler");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
