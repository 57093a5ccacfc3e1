//! Prelude module for convenient imports.
//!
//! ```ignore
//! use sheaf::prelude::*;
//! ```

pub use crate::{
    Auth, Body, Client, Error, Expect, Handler, HandlerStack, Headers, History, HttpClient,
    HttpClientExt, HyperTransport, Method, Middleware, Multipart, Options, Part, Pool, PoolConfig,
    PoolItem, RedirectOptions, Request, Response, ResponseFuture, Result, middleware,
};
