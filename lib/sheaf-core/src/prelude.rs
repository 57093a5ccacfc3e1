//! Prelude module for convenient imports.
//!
//! ```ignore
//! use sheaf_core::prelude::*;
//! ```

pub use crate::{
    AllowRedirects, Auth, Body, Error, Expect, Headers, HttpClient, HttpClientExt, Method, Options,
    RedirectOptions, Request, RequestBuilder, Response, ResponseFuture, Result,
};
