//! Network transport using hyper-util.

use std::io;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use http_body::Frame;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower_service::Service;
use tracing::{Instrument, debug, debug_span, warn};

use crate::{
    Body, Error, Handler, Headers, Options, Request, Response, ResponseFuture, Result,
    config::ClientConfig, connector::https_connector,
};

type HyperBody = UnsyncBoxBody<Bytes, io::Error>;

/// Terminal handler sending requests over the network.
///
/// Connections are pooled and shared by clones. TLS uses rustls with the
/// Mozilla root certificates.
///
/// Honoured options:
/// - `timeout`, falling back to [`ClientConfig::timeout`]
/// - `delay`, slept before sending
/// - `sink`, a file the response body is also written to
///
/// `proxy` is not supported; it is logged and ignored.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, HyperBody>,
    config: ClientConfig,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransport {
    /// Create a transport with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a transport with custom configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let connector = https_connector(&config);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .retry_canceled_requests(config.retry_on_connection_failure)
            .build(connector);

        Self { inner, config }
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wrap the transport into a [`Handler`].
    #[must_use]
    pub fn handler(&self) -> Handler {
        let transport = self.clone();
        Handler::labeled("HyperTransport", move |request, options| {
            transport.send(request, options)
        })
    }

    /// Send a request.
    #[must_use]
    pub fn send(&self, request: Request, options: Options) -> ResponseFuture {
        let transport = self.clone();
        let span = debug_span!("transport", method = %request.method(), url = %request.url());
        Box::pin(async move { transport.execute(request, options).await }.instrument(span))
    }

    async fn execute(&self, request: Request, options: Options) -> Result<Response> {
        if let Some(proxy) = &options.proxy {
            warn!(proxy = %proxy, "proxy option is not supported, ignoring");
        }
        if let Some(delay) = options.delay {
            tokio::time::sleep(delay).await;
        }

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let sent = request.clone();
        let timed_out = request.clone();
        let response = tokio::time::timeout(timeout, self.round_trip(request))
            .await
            .map_err(|_| Error::timeout_for(timed_out))?
            .map_err(|err| match err {
                TransportError::Hyper(err) => Self::map_hyper_error(&err, sent),
                TransportError::Body(message) => Error::connection_for(message, sent),
                TransportError::Other(err) => err,
            })?;

        if let Some(path) = &options.sink {
            tokio::fs::write(path, response.body()).await?;
        }

        // Saturating conversion to u64 (truncates after ~584 million years)
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        debug!(status = response.status(), timeout_ms, "response received");
        Ok(response)
    }

    async fn round_trip(&self, request: Request) -> std::result::Result<Response, TransportError> {
        let hyper_request = Self::build_hyper_request(request).map_err(TransportError::Other)?;

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(TransportError::Hyper)?;

        let status = response.status().as_u16();
        let version = response.version();
        let headers = Self::extract_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?
            .to_bytes();

        Ok(Response::from_parts(status, headers, body).with_version(version))
    }

    /// Build a hyper request from a sheaf request.
    fn build_hyper_request(request: Request) -> Result<http::Request<HyperBody>> {
        let (method, url, headers, body, version) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .version(version);

        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }

        builder
            .body(Self::hyper_body(&body)?)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn hyper_body(body: &Body) -> Result<HyperBody> {
        if let Some(bytes) = body.as_bytes() {
            if bytes.is_empty() {
                return Ok(Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync());
            }
            return Ok(Full::new(bytes.clone())
                .map_err(|never| match never {})
                .boxed_unsync());
        }

        let stream = body
            .take_stream()
            .ok_or_else(|| Error::invalid_request("request body stream was already consumed"))?;
        Ok(BodyExt::boxed_unsync(StreamBody::new(stream.map_ok(Frame::data))))
    }

    /// Copy response headers, keeping repeated ones.
    fn extract_headers(headers: &http::HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    fn map_hyper_error(err: &hyper_util::client::legacy::Error, request: Request) -> Error {
        let causes = source_chain(err);
        let msg = if causes.is_empty() {
            err.to_string()
        } else {
            format!("{err}: {causes}")
        };

        if err.is_connect() {
            return Error::connection_for(msg, request);
        }

        let lower = msg.to_ascii_lowercase();
        if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
            return Error::tls_for(msg, request);
        }

        Error::connection_for(msg, request)
    }

}

enum TransportError {
    Hyper(hyper_util::client::legacy::Error),
    Body(String),
    Other(Error),
}

fn source_chain(err: &dyn std::error::Error) -> String {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes.join(": ")
}

impl Service<(Request, Options)> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (request, options): (Request, Options)) -> Self::Future {
        self.send(request, options)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::Method;

    fn request(body: impl Into<Body>) -> Request {
        Request::builder(
            Method::Post,
            url::Url::parse("http://example.com/upload").expect("valid URL"),
        )
        .header("X-Test", "1")
        .body(body)
        .build()
    }

    #[test]
    fn builds_hyper_request() {
        let hyper_request =
            HyperTransport::build_hyper_request(request("data")).expect("hyper request");
        assert_eq!(hyper_request.method(), http::Method::POST);
        assert_eq!(hyper_request.uri(), "http://example.com/upload");
        assert_eq!(hyper_request.headers()["x-test"], "1");
        assert_eq!(hyper_request.version(), http::Version::HTTP_11);
    }

    #[test]
    fn consumed_stream_is_rejected() {
        let body = Body::from_stream(stream::iter(vec![Ok(Bytes::from("a"))]), None);
        let request = request(body);
        assert!(HyperTransport::build_hyper_request(request.clone()).is_ok());
        assert!(matches!(
            HyperTransport::build_hyper_request(request),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn keeps_repeated_headers() {
        let mut map = http::HeaderMap::new();
        map.append("set-cookie", http::HeaderValue::from_static("a=1"));
        map.append("set-cookie", http::HeaderValue::from_static("b=2"));
        let headers = HyperTransport::extract_headers(&map);
        assert_eq!(headers.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
    }
}
