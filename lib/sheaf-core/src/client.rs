//! HTTP client traits and the handler future type.
//!
//! - [`ResponseFuture`] - what every handler returns
//! - [`HttpClient`] - send a request with per-call options
//! - [`HttpClientExt`] - convenience methods on top of [`HttpClient`]

use std::future::Future;
use std::pin::Pin;

use url::Url;

use crate::{Method, Options, Request, Response, Result};

/// Pending outcome of sending a request.
///
/// Fulfilled with a [`Response`], rejected with an [`crate::Error`].
/// Dropping it cancels the call.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Core HTTP client trait.
pub trait HttpClient: Send + Sync {
    /// Send a request with per-call options.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    /// - Redirect or HTTP status policies
    fn send(
        &self,
        request: Request,
        options: Options,
    ) -> impl Future<Output = Result<Response>> + Send;

    /// Turn a possibly relative URI into an absolute URL.
    ///
    /// The default only accepts absolute URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI cannot be parsed.
    fn resolve_url(&self, uri: &str) -> Result<Url> {
        Ok(Url::parse(uri)?)
    }
}

/// Extension trait for [`HttpClient`] with convenience methods.
pub trait HttpClientExt: HttpClient {
    /// Execute a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn get(&self, uri: &str) -> impl Future<Output = Result<Response>> + Send {
        let url = self.resolve_url(uri);
        async move {
            let request = Request::new(Method::Get, url?);
            self.send(request, Options::default()).await
        }
    }

    /// Execute a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn post_json<T: serde::Serialize + Send + Sync>(
        &self,
        uri: &str,
        body: &T,
    ) -> impl Future<Output = Result<Response>> + Send {
        let url = self.resolve_url(uri);
        async move {
            let request = Request::builder(Method::Post, url?).json(body)?.build();
            self.send(request, Options::default()).await
        }
    }

    /// Execute a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn put_json<T: serde::Serialize + Send + Sync>(
        &self,
        uri: &str,
        body: &T,
    ) -> impl Future<Output = Result<Response>> + Send {
        let url = self.resolve_url(uri);
        async move {
            let request = Request::builder(Method::Put, url?).json(body)?.build();
            self.send(request, Options::default()).await
        }
    }

    /// Execute a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn delete(&self, uri: &str) -> impl Future<Output = Result<Response>> + Send {
        let url = self.resolve_url(uri);
        async move {
            let request = Request::new(Method::Delete, url?);
            self.send(request, Options::default()).await
        }
    }
}

// Blanket implementation for all HttpClient implementors
impl<T: HttpClient> HttpClientExt for T {}
