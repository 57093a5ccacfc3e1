//! Error types for sheaf.
//!
//! Structural errors ([`Error::InvalidArgument`], [`Error::MiddlewareNotFound`],
//! [`Error::NoHandler`]) are returned synchronously by stack and pool APIs.
//! Everything else travels through a handler's future and, where it makes
//! sense, carries the request (and response) that triggered it.

use derive_more::{Display, Error, From};

use crate::{Request, Response};

/// Class of an HTTP status error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum HttpErrorKind {
    /// 4xx response.
    #[display("Client error")]
    Client,
    /// 5xx response.
    #[display("Server error")]
    Server,
}

/// Main error type for sheaf operations.
#[derive(Debug, Clone, Display, Error, From)]
pub enum Error {
    /// A 4xx or 5xx response, raised when `http_errors` is enabled.
    #[display("{message}")]
    #[from(skip)]
    Http {
        /// Client or server error.
        kind: HttpErrorKind,
        /// HTTP status code.
        status: u16,
        /// Human readable message, including a summary of the body.
        message: String,
        /// Request that produced the response.
        request: Box<Request>,
        /// Response that triggered the error.
        response: Box<Response>,
    },

    /// Network/connection errors.
    #[display("connection error: {message}")]
    #[from(skip)]
    Connection {
        /// Error message.
        message: String,
        /// Request being sent, if known.
        request: Option<Box<Request>>,
    },

    /// TLS/SSL errors.
    #[display("TLS error: {message}")]
    #[from(skip)]
    Tls {
        /// Error message.
        message: String,
        /// Request being sent, if known.
        request: Option<Box<Request>>,
    },

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout {
        /// Request that timed out, if known.
        request: Option<Box<Request>>,
    },

    /// The call was cancelled before it settled.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// Too many redirects.
    #[display("Will not follow more than {max} redirects")]
    #[from(skip)]
    TooManyRedirects {
        /// Number of redirects seen.
        count: usize,
        /// Maximum allowed redirects.
        max: usize,
        /// Request that would have exceeded the limit.
        request: Box<Request>,
    },

    /// Redirect to a URI whose scheme is not allowed.
    #[display("Redirect URL, {uri}, does not use one of the allowed redirect protocols: {protocols}")]
    #[from(skip)]
    BadRedirect {
        /// Resolved redirect target.
        uri: String,
        /// Allowed protocols, comma separated.
        protocols: String,
        /// Request that received the redirect.
        request: Box<Request>,
    },

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Invalid argument passed to a stack or pool API.
    #[display("invalid argument: {_0}")]
    #[from(skip)]
    InvalidArgument(#[error(not(source))] String),

    /// No stack entry with the requested name.
    #[display("Middleware not found: {_0}")]
    #[from(skip)]
    MiddlewareNotFound(#[error(not(source))] String),

    /// A stack was resolved before a handler was set.
    #[display("No handler has been specified")]
    #[from(skip)]
    NoHandler,

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from(skip)]
    JsonSerialization(#[error(not(source))] String),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Form or query string serialization error.
    #[display("form serialization error: {_0}")]
    #[from(skip)]
    FormSerialization(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// I/O error, e.g. while writing a sink.
    #[display("I/O error: {_0}")]
    #[from(skip)]
    Io(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonSerialization(err.to_string())
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(err: serde_html_form::ser::Error) -> Self {
        Self::FormSerialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl Error {
    /// Create an HTTP status error.
    #[must_use]
    pub fn http(
        kind: HttpErrorKind,
        message: impl Into<String>,
        request: Request,
        response: Response,
    ) -> Self {
        Self::Http {
            kind,
            status: response.status(),
            message: message.into(),
            request: Box::new(request),
            response: Box::new(response),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            request: None,
        }
    }

    /// Create a connection error carrying the request being sent.
    #[must_use]
    pub fn connection_for(message: impl Into<String>, request: Request) -> Self {
        Self::Connection {
            message: message.into(),
            request: Some(Box::new(request)),
        }
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
            request: None,
        }
    }

    /// Create a TLS error carrying the request being sent.
    #[must_use]
    pub fn tls_for(message: impl Into<String>, request: Request) -> Self {
        Self::Tls {
            message: message.into(),
            request: Some(Box::new(request)),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::Timeout { request: None }
    }

    /// Create a timeout error carrying the request that timed out.
    #[must_use]
    pub fn timeout_for(request: Request) -> Self {
        Self::Timeout {
            request: Some(Box::new(request)),
        }
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if the call was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Http {
                kind: HttpErrorKind::Client,
                ..
            }
        )
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Http {
                kind: HttpErrorKind::Server,
                ..
            }
        )
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    /// Request that triggered the error, if known.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        match self {
            Self::Http { request, .. }
            | Self::TooManyRedirects { request, .. }
            | Self::BadRedirect { request, .. } => Some(&**request),
            Self::Connection { request, .. }
            | Self::Tls { request, .. }
            | Self::Timeout { request } => request.as_deref(),
            _ => None,
        }
    }

    /// Response that triggered the error, if any.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Http { response, .. } => Some(&**response),
            _ => None,
        }
    }

    /// Returns the response body if this is an HTTP error.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        self.response().map(Response::body)
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if this is not an HTTP error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// #[derive(Debug, Deserialize)]
    /// struct ApiError {
    ///     code: String,
    ///     message: String,
    /// }
    ///
    /// if let Err(err) = client.get("/users/123").await {
    ///     if let Some(Ok(api_error)) = err.decode_body::<ApiError>() {
    ///         println!("API error: {} - {}", api_error.code, api_error.message);
    ///     }
    /// }
    /// ```
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}

#[cfg(test)]
mod tests {
    use crate::Method;

    use super::*;

    fn request() -> Request {
        Request::new(
            Method::Get,
            url::Url::parse("http://foo.com").expect("valid URL"),
        )
    }

    fn http_error(status: u16, body: &'static str) -> Error {
        let kind = if status >= 500 {
            HttpErrorKind::Server
        } else {
            HttpErrorKind::Client
        };
        Error::http(kind, "boom", request(), Response::new(status, body))
    }

    #[test]
    fn error_display() {
        assert_eq!(http_error(404, "").to_string(), "boom");
        assert_eq!(Error::timeout().to_string(), "request timeout");
        assert_eq!(
            Error::connection("failed to connect").to_string(),
            "connection error: failed to connect"
        );
        assert_eq!(
            Error::json_deserialization("user.address.city", "missing field `city`").to_string(),
            "JSON deserialization error at 'user.address.city': missing field `city`"
        );
        assert_eq!(
            Error::NoHandler.to_string(),
            "No handler has been specified"
        );
    }

    #[test]
    fn too_many_redirects_mentions_max() {
        let err = Error::TooManyRedirects {
            count: 4,
            max: 3,
            request: Box::new(request()),
        };
        assert_eq!(err.to_string(), "Will not follow more than 3 redirects");
        assert!(err.request().is_some());
    }

    #[test]
    fn error_status() {
        let err = http_error(404, "");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(err.is_not_found());

        let err = http_error(500, "");
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = Error::timeout();
        assert_eq!(err.status(), None);
        assert!(!err.is_client_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn error_predicates() {
        assert!(Error::timeout().is_timeout());
        assert!(Error::connection("failed").is_connection());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::timeout().is_connection());
    }

    #[test]
    fn error_carries_request_and_response() {
        let err = http_error(400, "bad");
        assert_eq!(
            err.request().map(|r| r.url().as_str()),
            Some("http://foo.com/")
        );
        assert_eq!(err.response().map(Response::status), Some(400));

        let err = Error::connection_for("refused", request());
        assert!(err.request().is_some());
        assert!(err.response().is_none());

        let err = Error::timeout_for(request());
        assert!(err.is_timeout());
        assert_eq!(err.request().map(|r| r.url().as_str()), Some("http://foo.com/"));

        let err = Error::tls_for("bad certificate", request());
        assert_eq!(err.to_string(), "TLS error: bad certificate");
        assert!(err.request().is_some());
        assert!(Error::timeout().request().is_none());
    }

    #[test]
    fn error_decode_body() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let err = http_error(404, r#"{"error": "not found"}"#);
        let decoded = err
            .decode_body::<ApiError>()
            .expect("should have body")
            .expect("should decode");
        assert_eq!(
            decoded,
            ApiError {
                error: "not found".to_string()
            }
        );

        assert!(Error::timeout().decode_body::<ApiError>().is_none());
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "I/O error: disk full");
    }
}
