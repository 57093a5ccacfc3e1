//! Cookie store contract.

use crate::{Request, Response};

/// Storage for cookies shared between calls.
///
/// Implementations must tolerate concurrent use: a store is shared by every
/// in-flight request of a client or pool.
pub trait CookieStore: Send + Sync {
    /// Returns `request` with a `Cookie` header for the matching cookies.
    ///
    /// The request is returned untouched when nothing matches.
    fn with_cookie_header(&self, request: Request) -> Request;

    /// Store the cookies set by `response` to `request`.
    fn extract_cookies(&self, request: &Request, response: &Response);
}
