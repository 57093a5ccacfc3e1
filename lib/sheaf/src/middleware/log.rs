//! Request/response logging middleware.
//!
//! Each settled call emits one `tracing` event whose message is rendered by a
//! [`MessageFormatter`]. Successful calls log at the configured level, failed
//! calls always log at `warn`.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service, ServiceExt};
use tracing::{Instrument, Level, debug, info, span, trace, warn};

use crate::{Error, MessageFormatter, Options, Request, Response, ResponseFuture, Result};

/// Layer that logs settled calls.
///
/// # Example
///
/// ```ignore
/// use sheaf::middleware::{self, LogLevel};
/// use sheaf::MessageFormatter;
///
/// stack.push_named("log", middleware::log(MessageFormatter::SHORT, LogLevel::Info))?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogLayer {
    formatter: MessageFormatter,
    level: LogLevel,
}

/// Level of the event emitted for successful calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at trace level.
    Trace,
    /// Log at debug level.
    Debug,
    /// Log at info level.
    #[default]
    Info,
}

impl LogLayer {
    /// Create a logging layer.
    #[must_use]
    pub const fn new(formatter: MessageFormatter, level: LogLevel) -> Self {
        Self { formatter, level }
    }
}

impl<S> Layer<S> for LogLayer {
    type Service = Log<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Log {
            inner,
            formatter: self.formatter.clone(),
            level: self.level,
        }
    }
}

/// Service that logs settled calls.
#[derive(Debug, Clone)]
pub struct Log<S> {
    inner: S,
    formatter: MessageFormatter,
    level: LogLevel,
}

impl<S> Service<(Request, Options)> for Log<S>
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
        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", %method, %url);

        let inner = self.inner.clone();
        let formatter = self.formatter.clone();
        let level = self.level;
        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.oneshot((request.clone(), options)).await;

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let message = formatter.format(&request, Some(response), None);
                        let status = response.status();
                        match level {
                            LogLevel::Trace => trace!(status, elapsed_ms, "{message}"),
                            LogLevel::Debug => debug!(status, elapsed_ms, "{message}"),
                            LogLevel::Info => info!(status, elapsed_ms, "{message}"),
                        }
                    }
                    Err(err) => {
                        let message = formatter.format(&request, err.response(), Some(err));
                        warn!(error = %err, elapsed_ms, "{message}");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_layer_default() {
        let layer = LogLayer::default();
        assert_eq!(layer.level, LogLevel::Info);
        assert_eq!(layer.formatter, MessageFormatter::CLF);
    }

    #[test]
    fn log_layer_custom() {
        let layer = LogLayer::new(MessageFormatter::SHORT, LogLevel::Debug);
        assert_eq!(layer.level, LogLevel::Debug);
        assert_eq!(layer.formatter.template(), MessageFormatter::SHORT.template());
    }
}
