//! Asynchronous HTTP client built around a composable handler stack.
//!
//! A request travels through a [`HandlerStack`]: an ordered list of
//! [`Middleware`] wrapped around a terminal [`Handler`] that performs the
//! transfer. Per-call [`Options`] travel next to the request and drive the
//! built-in middleware.
//!
//! # Example
//!
//! ```ignore
//! use sheaf::prelude::*;
//! use sheaf::middleware::{self, RetryPolicy};
//!
//! let mut stack = HandlerStack::create(HyperTransport::new().handler());
//! stack.push_named("retry", middleware::retry(RetryPolicy::new(3).into_decider()))?;
//!
//! let client = Client::builder()
//!     .handler(stack)
//!     .base_uri("https://api.example.com/")
//!     .build()?;
//! let response = client.get("users/42").await?;
//! ```
//!
//! Many requests can be sent with bounded concurrency through a [`Pool`].

mod client;
mod config;
mod connector;
mod cookie_jar;
mod formatter;
mod handler;
mod history;
pub mod middleware;
mod mock;
mod pool;
pub mod prelude;
mod stack;
mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use cookie_jar::{CookieJar, SetCookie};
pub use formatter::MessageFormatter;
pub use handler::{BoxedService, Handler, Middleware};
pub use history::{History, Transaction};
pub use mock::{MockHandler, MockResponse};
pub use pool::{CancelHandle, DEFAULT_POOL_SIZE, Pool, PoolConfig, PoolItem};
pub use stack::HandlerStack;
pub use transport::HyperTransport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use sheaf_core::{
    AllowRedirects, Auth, Body, BodyStream, ContentType, CookieStore, CookiesOption,
    DEFAULT_EXPECT_THRESHOLD, Error, Expect, Headers, HttpClient, HttpClientExt, HttpErrorKind,
    Method, Multipart, OnRedirect, Options, Part, RedirectOptions, Request, RequestBuilder,
    Response, ResponseFuture, Result, StatusCode, Version, from_json, mime_from_file_name,
    to_form, to_json, to_query_string,
};

pub use url;
