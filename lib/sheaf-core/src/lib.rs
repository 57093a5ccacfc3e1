//! Core types and contracts for the sheaf HTTP client.
//!
//! This crate provides the value types every handler and middleware speaks:
//! - [`Method`] - HTTP method enum
//! - [`Headers`] - case-insensitive, ordered header multi-map
//! - [`Body`] - empty, buffered, or streamed request body
//! - [`Multipart`] and [`Part`] - `multipart/form-data` bodies
//! - [`Request`] and [`RequestBuilder`] - immutable HTTP request
//! - [`Response`] - HTTP response with a buffered body
//! - [`Options`] - per-call options passed next to the request
//! - [`CookieStore`] - cookie storage contract
//! - [`Error`] and [`Result`] - Error handling
//! - [`HttpClient`] and [`ResponseFuture`] - client contract
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)

mod body;
mod client;
mod cookie;
mod error;
mod headers;
mod method;
mod multipart;
mod options;
pub mod prelude;
mod request;
mod response;

pub use body::{
    Body, BodyStream, ContentType, from_json, mime_from_file_name, to_form, to_json,
    to_query_string,
};
pub use client::{HttpClient, HttpClientExt, ResponseFuture};
pub use cookie::CookieStore;
pub use error::{Error, HttpErrorKind, Result};
pub use headers::Headers;
pub use method::Method;
pub use multipart::{Multipart, Part};
pub use options::{
    AllowRedirects, Auth, CookiesOption, DEFAULT_EXPECT_THRESHOLD, Expect, OnRedirect, Options,
    RedirectOptions,
};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for status codes and versions
pub use http::{StatusCode, Version};
