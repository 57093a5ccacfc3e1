//! Queue-driven terminal handler for tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Error, Handler, HandlerStack, Options, Request, Response, ResponseFuture, Result};

type MockFn = dyn Fn(&Request, &Options) -> Result<Response> + Send + Sync;

/// One queued outcome of a [`MockHandler`].
#[derive(Clone)]
pub enum MockResponse {
    /// Answer with this response.
    Response(Response),
    /// Fail with this error.
    Error(Error),
    /// Compute the outcome from the request.
    Fn(Arc<MockFn>),
}

impl MockResponse {
    /// Queue a closure computing the outcome from the request and options.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Request, &Options) -> Result<Response> + Send + Sync + 'static,
    {
        Self::Fn(Arc::new(f))
    }

    fn resolve(self, request: &Request, options: &Options) -> Result<Response> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Error(err) => Err(err),
            Self::Fn(f) => f(request, options),
        }
    }
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Fn(_) => f.write_str("Fn"),
        }
    }
}

impl From<Response> for MockResponse {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Error> for MockResponse {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<MockResponse>,
    last_request: Option<Request>,
    last_options: Option<Options>,
}

/// A terminal handler answering from a queue.
///
/// Every call pops the next queued outcome. The `delay` option is honoured.
/// Calling with an empty queue fails with [`Error::InvalidRequest`].
///
/// # Example
///
/// ```ignore
/// use sheaf::{HandlerStack, MockHandler, Response};
///
/// let mock = MockHandler::new([Response::new(200, "ok")]);
/// let stack = HandlerStack::create(mock.handler());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHandler {
    state: Arc<Mutex<State>>,
}

impl MockHandler {
    /// Create a handler with queued outcomes.
    pub fn new<I, R>(queue: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<MockResponse>,
    {
        let mock = Self::default();
        mock.lock().queue.extend(queue.into_iter().map(Into::into));
        mock
    }

    /// Create the default stack around a new mock.
    pub fn create_with_middleware<I, R>(queue: I) -> (Self, HandlerStack)
    where
        I: IntoIterator<Item = R>,
        R: Into<MockResponse>,
    {
        let mock = Self::new(queue);
        let stack = HandlerStack::create(mock.handler());
        (mock, stack)
    }

    /// Queue another outcome.
    pub fn append(&self, outcome: impl Into<MockResponse>) {
        self.lock().queue.push_back(outcome.into());
    }

    /// Number of outcomes left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns `true` if the queue is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Last request received.
    #[must_use]
    pub fn last_request(&self) -> Option<Request> {
        self.lock().last_request.clone()
    }

    /// Options of the last request received.
    #[must_use]
    pub fn last_options(&self) -> Option<Options> {
        self.lock().last_options.clone()
    }

    /// Wrap the mock into a [`Handler`].
    #[must_use]
    pub fn handler(&self) -> Handler {
        let mock = self.clone();
        Handler::labeled("MockHandler", move |request, options| mock.call(request, options))
    }

    fn call(&self, request: Request, options: Options) -> ResponseFuture {
        let next = {
            let mut state = self.lock();
            let next = state.queue.pop_front();
            if next.is_some() {
                state.last_request = Some(request.clone());
                state.last_options = Some(options.clone());
            }
            next
        };

        Box::pin(async move {
            let outcome = next.ok_or_else(|| Error::invalid_request("mock queue is empty"))?;
            if let Some(delay) = options.delay {
                tokio::time::sleep(delay).await;
            }
            outcome.resolve(&request, &options)
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::{check, let_assert};

    use super::*;
    use crate::Method;

    fn request(path: &str) -> Request {
        let url = url::Url::parse("http://example.com")
            .and_then(|base| base.join(path))
            .expect("valid URL");
        Request::new(Method::Get, url)
    }

    #[tokio::test]
    async fn answers_in_queue_order() {
        let mock = MockHandler::new([Response::new(200, "a"), Response::new(201, "b")]);
        mock.append(Error::connection("refused"));
        check!(mock.len() == 3);

        let handler = mock.handler();
        let_assert!(Ok(first) = handler.call(request("/1"), Options::default()).await);
        let_assert!(Ok(second) = handler.call(request("/2"), Options::default()).await);
        let_assert!(Err(err) = handler.call(request("/3"), Options::default()).await);
        check!(first.status() == 200);
        check!(second.status() == 201);
        check!(err.is_connection());
        check!(mock.is_empty());
        check!(mock.last_request().map(|r| r.url().path().to_string()) == Some("/3".to_string()));
    }

    #[tokio::test]
    async fn closures_see_the_request() {
        let mock = MockHandler::new([MockResponse::from_fn(|request, _options| {
            Ok(Response::new(200, request.url().path().to_string()))
        })]);
        let_assert!(Ok(response) = mock.handler().call(request("/echo"), Options::default()).await);
        check!(response.body().as_ref() == b"/echo");
    }

    #[tokio::test]
    async fn empty_queue_fails() {
        let mock = MockHandler::default();
        let_assert!(Err(Error::InvalidRequest(message)) = mock.handler().call(request("/"), Options::default()).await);
        check!(message == "mock queue is empty");
        check!(mock.last_request().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn honours_delay() {
        let mock = MockHandler::new([Response::new(200, "")]);
        let options = Options::default().with_delay(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        let_assert!(Ok(_) = mock.handler().call(request("/"), options).await);
        check!(start.elapsed() >= Duration::from_secs(5));
        check!(mock.last_options().and_then(|o| o.delay) == Some(Duration::from_secs(5)));
    }
}
