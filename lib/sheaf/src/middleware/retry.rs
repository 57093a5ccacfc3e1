//! Retry middleware.
//!
//! After each attempt settles, a decider is asked whether to resend the same
//! request with the same options. Between attempts the middleware sleeps on
//! the tokio timer for the duration returned by the delay function.
//!
//! Only replayable bodies can be resent; a streamed body is consumed by the
//! first attempt.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service, ServiceExt};
use tracing::info;

use crate::{Error, Options, Request, Response, ResponseFuture, Result};

/// Outcome of one attempt, handed to the decider.
#[derive(Debug, Clone, Copy)]
pub struct Attempt<'a> {
    /// Retries already performed, starting at 0.
    pub retries: u32,
    /// Request that was sent.
    pub request: &'a Request,
    /// Options it was sent with.
    pub options: &'a Options,
    /// Response, when the attempt succeeded.
    pub response: Option<&'a Response>,
    /// Error, when the attempt failed.
    pub error: Option<&'a Error>,
}

/// Decides whether an attempt should be retried.
pub type Decider = Arc<dyn Fn(&Attempt<'_>) -> bool + Send + Sync>;

/// Computes the pause before the next attempt from the retry count.
pub type Delay = Arc<dyn Fn(u32, Option<&Response>, Option<&Error>) -> Duration + Send + Sync>;

/// Exponential backoff: nothing before the first retry, then 1s, 2s, 4s, ...
#[must_use]
pub fn exponential_delay(retries: u32) -> Duration {
    match retries {
        0 => Duration::ZERO,
        n => Duration::from_secs(1_u64 << (n - 1).min(63)),
    }
}

/// Layer that retries calls according to a decider.
#[derive(Clone)]
pub struct RetryLayer {
    decider: Decider,
    delay: Delay,
}

impl RetryLayer {
    /// Create a retry layer with exponential backoff.
    pub fn new<D>(decider: D) -> Self
    where
        D: Fn(&Attempt<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            decider: Arc::new(decider),
            delay: Arc::new(|retries, _, _| exponential_delay(retries)),
        }
    }

    /// Replace the delay function.
    #[must_use]
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32, Option<&Response>, Option<&Error>) -> Duration + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }
}

impl std::fmt::Debug for RetryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            decider: Arc::clone(&self.decider),
            delay: Arc::clone(&self.delay),
        }
    }
}

/// Service that retries calls according to a decider.
#[derive(Clone)]
pub struct Retry<S> {
    inner: S,
    decider: Decider,
    delay: Delay,
}

impl<S> Service<(Request, Options)> for Retry<S>
where
    S: Service<(Request, Options), Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, (request, options): (Request, Options)) -> Self::Future {
        let inner = self.inner.clone();
        let decider = Arc::clone(&self.decider);
        let delay = Arc::clone(&self.delay);

        Box::pin(async move {
            let mut retries = 0;
            loop {
                let outcome = inner
                    .clone()
                    .oneshot((request.clone(), options.clone()))
                    .await;

                let attempt = Attempt {
                    retries,
                    request: &request,
                    options: &options,
                    response: outcome.as_ref().ok(),
                    error: outcome.as_ref().err(),
                };
                if !decider(&attempt) {
                    return outcome;
                }

                retries += 1;
                let pause = delay(retries, outcome.as_ref().ok(), outcome.as_ref().err());
                // Saturating conversion to u64 (truncates after ~584 million years)
                let delay_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX);
                match &outcome {
                    Ok(response) => {
                        info!(retries, delay_ms, status = response.status(), url = %request.url(), "retrying request");
                    }
                    Err(err) => {
                        info!(retries, delay_ms, error = %err, url = %request.url(), "retrying request");
                    }
                }
                tokio::time::sleep(pause).await;
            }
        })
    }
}

/// A ready-made decider.
///
/// Retries, up to `max_retries` times:
/// - Connection errors and timeouts
/// - 5xx server errors
/// - 429 Too Many Requests
///
/// # Example
///
/// ```ignore
/// use sheaf::middleware::{self, RetryPolicy};
///
/// stack.push_named("retry", middleware::retry(RetryPolicy::new(3).into_decider()))?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Create a new retry policy with the given maximum number of retries.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Returns `true` if the response should be retried.
    fn should_retry_response(response: &Response) -> bool {
        let status = response.status();
        // Retry on 5xx server errors and 429 Too Many Requests
        status >= 500 || status == 429
    }

    /// Returns `true` if the error should be retried.
    fn should_retry_error(error: &Error) -> bool {
        if let Some(response) = error.response() {
            return Self::should_retry_response(response);
        }
        error.is_connection() || error.is_timeout()
    }

    /// Decide for one attempt.
    #[must_use]
    pub fn should_retry(&self, attempt: &Attempt<'_>) -> bool {
        if attempt.retries >= self.max_retries {
            return false;
        }
        match (attempt.response, attempt.error) {
            (Some(response), _) => Self::should_retry_response(response),
            (None, Some(error)) => Self::should_retry_error(error),
            (None, None) => false,
        }
    }

    /// Turn the policy into a decider closure.
    #[must_use]
    pub fn into_decider(self) -> impl Fn(&Attempt<'_>) -> bool + Send + Sync + 'static {
        move |attempt| self.should_retry(attempt)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{HttpErrorKind, Method};

    fn request() -> Request {
        Request::new(
            Method::Get,
            url::Url::parse("http://example.com").expect("valid URL"),
        )
    }

    fn attempt<'a>(
        retries: u32,
        request: &'a Request,
        options: &'a Options,
        response: Option<&'a Response>,
        error: Option<&'a Error>,
    ) -> Attempt<'a> {
        Attempt {
            retries,
            request,
            options,
            response,
            error,
        }
    }

    #[test]
    fn exponential_delay_sequence() {
        let delays: Vec<u64> = (0..5).map(|n| exponential_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8]);
    }

    #[test]
    fn should_retry_5xx_and_429_responses() {
        assert!(RetryPolicy::should_retry_response(&Response::new(500, Bytes::new())));
        assert!(RetryPolicy::should_retry_response(&Response::new(503, Bytes::new())));
        assert!(RetryPolicy::should_retry_response(&Response::new(429, Bytes::new())));
    }

    #[test]
    fn should_not_retry_other_responses() {
        assert!(!RetryPolicy::should_retry_response(&Response::new(200, Bytes::new())));
        assert!(!RetryPolicy::should_retry_response(&Response::new(404, Bytes::new())));
    }

    #[test]
    fn should_retry_transport_errors() {
        assert!(RetryPolicy::should_retry_error(&Error::connection("refused")));
        assert!(RetryPolicy::should_retry_error(&Error::timeout()));
        assert!(!RetryPolicy::should_retry_error(&Error::Cancelled));
    }

    #[test]
    fn should_retry_server_status_errors() {
        let err = Error::http(
            HttpErrorKind::Server,
            "boom",
            request(),
            Response::new(502, Bytes::new()),
        );
        assert!(RetryPolicy::should_retry_error(&err));
    }

    #[test]
    fn policy_stops_at_max() {
        let policy = RetryPolicy::new(2);
        let request = request();
        let options = Options::default();
        let response = Response::new(500, Bytes::new());

        assert!(policy.should_retry(&attempt(0, &request, &options, Some(&response), None)));
        assert!(policy.should_retry(&attempt(1, &request, &options, Some(&response), None)));
        assert!(!policy.should_retry(&attempt(2, &request, &options, Some(&response), None)));
    }
}
