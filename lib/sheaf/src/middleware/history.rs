//! History middleware.
//!
//! Records every call in a [`History`] when it is dispatched, then stores the
//! response or error in the same slot once it settles. The order of the
//! history is therefore the dispatch order, whatever order calls finish in.

use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::{Error, History, Options, Request, Response, ResponseFuture, Result};

/// Layer that records calls in a [`History`].
#[derive(Debug, Clone)]
pub struct HistoryLayer {
    history: History,
}

impl HistoryLayer {
    /// Create a layer recording into `history`.
    #[must_use]
    pub fn new(history: &History) -> Self {
        Self {
            history: history.clone(),
        }
    }
}

impl<S> Layer<S> for HistoryLayer {
    type Service = Recorded<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recorded {
            inner,
            history: self.history.clone(),
        }
    }
}

/// Service that records calls in a [`History`].
#[derive(Debug, Clone)]
pub struct Recorded<S> {
    inner: S,
    history: History,
}

impl<S> Service<(Request, Options)> for Recorded<S>
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
        let index = self.history.record(request.clone(), options.clone());
        let history = self.history.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let outcome = inner.oneshot((request, options)).await;
            history.settle(index, &outcome);
            outcome
        })
    }
}
