//! Body preparation middleware.
//!
//! Before a request with a body is sent, this middleware:
//! - guesses a `Content-Type` from the body's file name
//! - sets `Content-Length`, or `Transfer-Encoding: chunked` when the size is unknown
//! - adds `Expect: 100-Continue` according to the `expect` option

use std::task::{Context, Poll};

use http::Version;
use tower::{Layer, Service};

use crate::{Error, Expect, Options, Request, Response, ResponseFuture, Result, mime_from_file_name};

/// Layer that prepares request bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareBodyLayer;

impl PrepareBodyLayer {
    /// Create a new body preparation layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PrepareBodyLayer {
    type Service = PrepareBody<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrepareBody { inner }
    }
}

/// Service that prepares request bodies.
#[derive(Debug, Clone)]
pub struct PrepareBody<S> {
    inner: S,
}

impl<S> Service<(Request, Options)> for PrepareBody<S>
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
        let request = prepare(request, &options);
        Box::pin(self.inner.call((request, options)))
    }
}

/// Add the framing headers a body needs.
fn prepare(request: Request, options: &Options) -> Request {
    if request.body().is_empty() {
        return request;
    }

    let mut request = request;
    if !request.headers().contains("Content-Type") {
        if let Some(mime) = request.body().file_name().and_then(mime_from_file_name) {
            request = request.with_header("Content-Type", mime);
        }
    }

    if !request.headers().contains("Content-Length")
        && !request.headers().contains("Transfer-Encoding")
    {
        request = match request.body().size() {
            Some(size) => request.with_header("Content-Length", size.to_string()),
            None => request.with_header("Transfer-Encoding", "chunked"),
        };
    }

    let chunked = request
        .headers()
        .get_all("Transfer-Encoding")
        .iter()
        .any(|value| value.to_ascii_lowercase().contains("chunked"));
    if chunked {
        request = request.without_header("Content-Length");
    }

    if needs_expect(&request, options.expect_policy()) {
        request = request.with_header("Expect", "100-Continue");
    }
    request
}

fn needs_expect(request: &Request, policy: Expect) -> bool {
    if request.headers().contains("Expect") || request.version() < Version::HTTP_11 {
        return false;
    }
    let body = request.body();
    match policy {
        Expect::Disabled => false,
        Expect::Always => true,
        Expect::Threshold(threshold) => {
            body.size().is_none_or(|size| size >= threshold) || !body.is_seekable()
        }
    }
}
